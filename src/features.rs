//! Keystroke pairing and timing-vector extraction
//!
//! Turns one attempt's raw key edges into `[dwell_1..dwell_k] ++ [flight_1..flight_{k-1}]`.
//! Rejection is binary: `None` carries no reason. Callers that need to tell the
//! user *why* use [`crate::diagnostics::diagnose_attempt`].

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::config::{EngineConfig, DEFAULT_MAX_PAUSE_SEC};
use crate::types::{KeyChar, KeyEdge, KeyEvent, Keystroke, TimingVector};

/// Extract a timing vector with the default 2.0 s pause limit
pub fn extract_features(events: &[KeyEvent]) -> Option<TimingVector> {
    FeatureExtractor::default().extract(events)
}

/// Feature extractor for a single typed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureExtractor {
    max_pause_sec: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAUSE_SEC)
    }
}

impl FeatureExtractor {
    /// Create an extractor that rejects any flight longer than `max_pause_sec`
    pub fn new(max_pause_sec: f64) -> Self {
        Self { max_pause_sec }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_pause_sec)
    }

    pub fn max_pause_sec(&self) -> f64 {
        self.max_pause_sec
    }

    /// Extract the timing vector, or `None` if the attempt is unusable
    ///
    /// The input may be in any order; events are stable-sorted by timestamp
    /// before pairing.
    pub fn extract(&self, events: &[KeyEvent]) -> Option<TimingVector> {
        if contains_correction(events) {
            debug!("attempt rejected: correction or unresolved key present");
            return None;
        }

        let keystrokes = pair_keystrokes(events);
        if keystrokes.is_empty() {
            debug!("attempt rejected: no complete keystrokes");
            return None;
        }

        let mut values: Vec<f64> = Vec::with_capacity(2 * keystrokes.len() - 1);
        values.extend(keystrokes.iter().map(Keystroke::dwell));

        for pair in keystrokes.windows(2) {
            let flight = pair[0].flight_to(&pair[1]);
            // Negative flight is rollover and stays in the vector
            if flight > self.max_pause_sec {
                debug!(flight, limit = self.max_pause_sec, "attempt rejected: pause too long");
                return None;
            }
            values.push(flight);
        }

        Some(TimingVector::new(values))
    }
}

/// Whether any event is a correction sentinel or an unresolved key
pub fn contains_correction(events: &[KeyEvent]) -> bool {
    events
        .iter()
        .any(|e| matches!(e.key, KeyChar::Correction | KeyChar::Unresolved))
}

/// Pair down/up edges into keystrokes, ordered by press time
///
/// Each `up` is matched with the earliest pending `down` of the same character.
/// Dangling ups and downs are dropped. Sentinel keys never pair.
pub fn pair_keystrokes(events: &[KeyEvent]) -> Vec<Keystroke> {
    let mut sorted: Vec<&KeyEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut pending: HashMap<char, VecDeque<f64>> = HashMap::new();
    let mut keystrokes = Vec::new();

    for event in sorted {
        let Some(key) = event.key.as_char() else {
            continue;
        };
        match event.edge {
            KeyEdge::Down => pending.entry(key).or_default().push_back(event.timestamp),
            KeyEdge::Up => {
                if let Some(down) = pending.get_mut(&key).and_then(VecDeque::pop_front) {
                    keystrokes.push(Keystroke {
                        key,
                        down,
                        up: event.timestamp,
                    });
                }
            }
        }
    }

    keystrokes.sort_by(|a, b| a.down.total_cmp(&b.down));
    keystrokes
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Evenly typed phrase with fixed dwell and flight
    pub(crate) fn typed(phrase: &str, dwell: f64, flight: f64) -> Vec<KeyEvent> {
        let mut events = Vec::new();
        let mut t = 100.0;
        for c in phrase.chars() {
            events.push(KeyEvent::down(c, t));
            events.push(KeyEvent::up(c, t + dwell));
            t += dwell + flight;
        }
        events
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_basic_extraction() {
        let vector = extract_features(&typed("abc", 0.1, 0.15)).unwrap();
        assert_close(vector.as_slice(), &[0.1, 0.1, 0.1, 0.15, 0.15]);
    }

    #[test]
    fn test_single_keystroke() {
        let vector = extract_features(&typed("x", 0.08, 0.0)).unwrap();
        assert_close(vector.as_slice(), &[0.08]);
    }

    #[test]
    fn test_correction_rejects_whole_attempt() {
        let mut events = typed("hello", 0.1, 0.15);
        events.insert(3, KeyEvent::correction(100.4));
        assert!(extract_features(&events).is_none());
    }

    #[test]
    fn test_unresolved_key_rejects() {
        let mut events = typed("hello", 0.1, 0.15);
        events.push(KeyEvent::new(KeyChar::Unresolved, KeyEdge::Up, 200.0));
        assert!(extract_features(&events).is_none());
    }

    #[test]
    fn test_no_complete_pairs_rejected() {
        assert!(extract_features(&[]).is_none());

        // Downs without ups, and an up that precedes its down
        let events = vec![
            KeyEvent::down('a', 1.0),
            KeyEvent::up('b', 1.1),
            KeyEvent::down('b', 1.2),
        ];
        assert!(extract_features(&events).is_none());
    }

    #[test]
    fn test_rollover_pairs_per_character() {
        // 'a' pressed, 'b' pressed before 'a' released
        let events = vec![
            KeyEvent::down('a', 0.00),
            KeyEvent::down('b', 0.08),
            KeyEvent::up('a', 0.12),
            KeyEvent::up('b', 0.20),
        ];
        let vector = extract_features(&events).unwrap();
        assert_close(vector.as_slice(), &[0.12, 0.12, -0.04]);
    }

    #[test]
    fn test_repeated_character_pairs_fifo() {
        // "oo" with overlap: second down arrives before first up
        let events = vec![
            KeyEvent::down('o', 0.0),
            KeyEvent::down('o', 0.05),
            KeyEvent::up('o', 0.10),
            KeyEvent::up('o', 0.20),
        ];
        let keystrokes = pair_keystrokes(&events);
        assert_eq!(
            keystrokes,
            vec![
                Keystroke { key: 'o', down: 0.0, up: 0.10 },
                Keystroke { key: 'o', down: 0.05, up: 0.20 },
            ]
        );
    }

    #[test]
    fn test_dangling_edges_ignored() {
        let mut events = typed("ab", 0.1, 0.15);
        events.push(KeyEvent::up('z', 100.05));
        events.push(KeyEvent::down('q', 100.3));
        let vector = extract_features(&events).unwrap();
        assert_close(vector.as_slice(), &[0.1, 0.1, 0.15]);
    }

    #[test]
    fn test_long_pause_rejects() {
        let vector = extract_features(&typed("abc", 0.1, 2.5));
        assert!(vector.is_none());

        // Exactly at the limit is still accepted
        let events = vec![
            KeyEvent::down('a', 0.0),
            KeyEvent::up('a', 0.5),
            KeyEvent::down('b', 2.5),
            KeyEvent::up('b', 2.6),
        ];
        assert!(extract_features(&events).is_some());
    }

    #[test]
    fn test_custom_pause_limit() {
        let extractor = FeatureExtractor::new(0.5);
        assert!(extractor.extract(&typed("abc", 0.1, 0.6)).is_none());
        assert!(extractor.extract(&typed("abc", 0.1, 0.4)).is_some());
    }

    #[test]
    fn test_scrambled_input_order() {
        let events = typed("keystroke", 0.09, 0.13);
        let mut scrambled = events.clone();
        scrambled.reverse();
        scrambled.swap(0, 7);
        assert_eq!(extract_features(&events), extract_features(&scrambled));
    }

    #[test]
    fn test_same_timestamp_edges_keep_arrival_order() {
        let tail = [KeyEvent::down('b', 1.1), KeyEvent::up('b', 1.2)];

        // down arrives first: zero-dwell keystroke
        let mut events = vec![KeyEvent::down('a', 1.0), KeyEvent::up('a', 1.0)];
        events.extend(tail);
        let vector = extract_features(&events).unwrap();
        assert_close(vector.as_slice(), &[0.0, 0.1, 0.1]);

        // up arrives first: it dangles and the later down never completes
        let mut events = vec![KeyEvent::up('a', 1.0), KeyEvent::down('a', 1.0)];
        events.extend(tail);
        let keystrokes = pair_keystrokes(&events);
        assert_eq!(keystrokes.len(), 1);
        assert_eq!(keystrokes[0].key, 'b');
        let vector = extract_features(&events).unwrap();
        assert_close(vector.as_slice(), &[0.1]);
    }

    proptest! {
        #[test]
        fn prop_extraction_is_order_independent(
            dwells in prop::collection::vec(0.01f64..0.4, 1..20),
            flights in prop::collection::vec(-0.05f64..1.5, 20),
            seed in any::<u64>()
        ) {
            let mut events = Vec::new();
            let mut t = 10.0;
            for (i, dwell) in dwells.iter().enumerate() {
                let key = char::from(b'a' + (i % 26) as u8);
                events.push(KeyEvent::down(key, t));
                events.push(KeyEvent::up(key, t + dwell));
                t += dwell + flights[i].max(0.001);
            }

            let mut shuffled = events.clone();
            let len = shuffled.len();
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }

            let expected = extract_features(&events);
            prop_assert!(expected.is_some());
            prop_assert_eq!(expected.as_ref().map(TimingVector::len), Some(2 * dwells.len() - 1));
            prop_assert_eq!(expected, extract_features(&shuffled));
        }

        #[test]
        fn prop_any_correction_rejects(position in 0usize..10, t in 0.0f64..10.0) {
            let mut events = typed("abcdefghij", 0.1, 0.1);
            events.insert(position, KeyEvent::correction(100.0 + t));
            prop_assert!(extract_features(&events).is_none());
        }
    }
}
