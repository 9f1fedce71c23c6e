//! User-facing rejection reasons
//!
//! The extractor only answers "vector or rejected". Front-ends that want to tell
//! the typist what went wrong re-derive the cause here from the same raw input.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::{contains_correction, pair_keystrokes, FeatureExtractor};
use crate::types::{KeyChar, KeyEvent, TimingVector};

/// Why an attempt could not be used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectionReason {
    /// Backspace or another correction was pressed
    CorrectionUsed,
    /// The capture layer delivered a key it could not resolve
    UnresolvedKey,
    /// No key press ever completed
    NoCompleteKeystrokes,
    /// The typist stopped between two keys
    PauseTooLong { gap_sec: f64 },
    /// Fewer keystrokes paired than the passphrase has (overlapping presses)
    TooFewKeystrokes { expected: usize, actual: usize },
    /// More keystrokes than the passphrase has
    TooManyKeystrokes { expected: usize, actual: usize },
    /// Typed text does not match the passphrase
    Typo(TypoKind),
}

impl RejectionReason {
    /// Short hint suitable for display next to the input field
    pub fn hint(&self) -> String {
        match self {
            RejectionReason::CorrectionUsed | RejectionReason::UnresolvedKey => {
                "Please type naturally without using Backspace.".to_string()
            }
            RejectionReason::NoCompleteKeystrokes => "No keystrokes captured.".to_string(),
            RejectionReason::PauseTooLong { .. } => {
                "Long pause detected. Type the phrase in one go.".to_string()
            }
            RejectionReason::TooFewKeystrokes { .. } => {
                "Too fast! Some keys overlapped. Try typing slightly slower.".to_string()
            }
            RejectionReason::TooManyKeystrokes { .. } => {
                "Typing inconsistent. Please try again.".to_string()
            }
            RejectionReason::Typo(kind) => kind.to_string(),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::CorrectionUsed => write!(f, "correction key used"),
            RejectionReason::UnresolvedKey => write!(f, "unresolved key in capture"),
            RejectionReason::NoCompleteKeystrokes => write!(f, "no complete keystrokes"),
            RejectionReason::PauseTooLong { gap_sec } => {
                write!(f, "pause of {gap_sec:.2}s between keys")
            }
            RejectionReason::TooFewKeystrokes { expected, actual } => {
                write!(f, "expected {expected} keystrokes, captured {actual}")
            }
            RejectionReason::TooManyKeystrokes { expected, actual } => {
                write!(f, "expected {expected} keystrokes, captured {actual}")
            }
            RejectionReason::Typo(kind) => write!(f, "{kind}"),
        }
    }
}

/// Mismatch between typed text and the passphrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TypoKind {
    LengthMismatch { expected: usize, actual: usize },
    WrongCharacter { position: usize, typed: char, expected: char },
}

impl fmt::Display for TypoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypoKind::LengthMismatch { expected, actual } => {
                write!(f, "Length mismatch: Expected {expected} chars, got {actual}.")
            }
            TypoKind::WrongCharacter { typed, expected, .. } => {
                write!(f, "Typo: Wrote '{typed}' instead of '{expected}'")
            }
        }
    }
}

/// First difference between `typed` and `passphrase`, if any
pub fn identify_typo(typed: &str, passphrase: &str) -> Option<TypoKind> {
    let expected_len = passphrase.chars().count();
    let actual_len = typed.chars().count();
    if expected_len != actual_len {
        return Some(TypoKind::LengthMismatch {
            expected: expected_len,
            actual: actual_len,
        });
    }

    typed
        .chars()
        .zip(passphrase.chars())
        .enumerate()
        .find(|(_, (a, b))| a != b)
        .map(|(position, (typed, expected))| TypoKind::WrongCharacter {
            position,
            typed,
            expected,
        })
}

/// Extract a vector of exactly `expected_dimension` values, or explain why not
pub fn diagnose_attempt(
    events: &[KeyEvent],
    expected_dimension: usize,
    extractor: &FeatureExtractor,
) -> Result<TimingVector, RejectionReason> {
    if let Some(vector) = extractor.extract(events) {
        if vector.len() == expected_dimension {
            return Ok(vector);
        }
        let expected = (expected_dimension + 1) / 2;
        let actual = vector.keystroke_count();
        return Err(if actual < expected {
            RejectionReason::TooFewKeystrokes { expected, actual }
        } else {
            RejectionReason::TooManyKeystrokes { expected, actual }
        });
    }

    if contains_correction(events) {
        let unresolved = events.iter().any(|e| e.key == KeyChar::Unresolved);
        let correction = events.iter().any(|e| e.key == KeyChar::Correction);
        return Err(if unresolved && !correction {
            RejectionReason::UnresolvedKey
        } else {
            RejectionReason::CorrectionUsed
        });
    }

    let keystrokes = pair_keystrokes(events);
    let gap_sec = keystrokes
        .windows(2)
        .map(|pair| pair[0].flight_to(&pair[1]))
        .find(|flight| *flight > extractor.max_pause_sec());
    match gap_sec {
        Some(gap_sec) => Err(RejectionReason::PauseTooLong { gap_sec }),
        None => Err(RejectionReason::NoCompleteKeystrokes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::typed;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identify_typo() {
        assert_eq!(identify_typo("hello", "hello"), None);
        assert_eq!(
            identify_typo("helo", "hello"),
            Some(TypoKind::LengthMismatch {
                expected: 5,
                actual: 4
            })
        );
        assert_eq!(
            identify_typo("hallo", "hello"),
            Some(TypoKind::WrongCharacter {
                position: 1,
                typed: 'a',
                expected: 'e'
            })
        );
    }

    #[test]
    fn test_typo_messages() {
        let kind = identify_typo("hallo", "hello").unwrap();
        assert_eq!(kind.to_string(), "Typo: Wrote 'a' instead of 'e'");
    }

    #[test]
    fn test_valid_attempt_passes() {
        let extractor = FeatureExtractor::default();
        let vector = diagnose_attempt(&typed("hello", 0.1, 0.15), 9, &extractor).unwrap();
        assert_eq!(vector.len(), 9);
    }

    #[test]
    fn test_correction_diagnosed() {
        let mut events = typed("hello", 0.1, 0.15);
        events.push(KeyEvent::correction(100.2));
        let reason = diagnose_attempt(&events, 9, &FeatureExtractor::default()).unwrap_err();
        assert_eq!(reason, RejectionReason::CorrectionUsed);
    }

    #[test]
    fn test_unresolved_diagnosed() {
        let mut events = typed("hello", 0.1, 0.15);
        events.push(KeyEvent::down(KeyChar::Unresolved, 100.2));
        let reason = diagnose_attempt(&events, 9, &FeatureExtractor::default()).unwrap_err();
        assert_eq!(reason, RejectionReason::UnresolvedKey);
    }

    #[test]
    fn test_pause_diagnosed() {
        let reason =
            diagnose_attempt(&typed("hello", 0.1, 3.0), 9, &FeatureExtractor::default())
                .unwrap_err();
        match reason {
            RejectionReason::PauseTooLong { gap_sec } => assert!((gap_sec - 3.0).abs() < 1e-9),
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[test]
    fn test_length_diagnosed() {
        let extractor = FeatureExtractor::default();
        let reason = diagnose_attempt(&typed("hell", 0.1, 0.15), 9, &extractor).unwrap_err();
        assert_eq!(
            reason,
            RejectionReason::TooFewKeystrokes {
                expected: 5,
                actual: 4
            }
        );
        assert_eq!(
            reason.hint(),
            "Too fast! Some keys overlapped. Try typing slightly slower."
        );

        let reason = diagnose_attempt(&typed("helloo", 0.1, 0.15), 9, &extractor).unwrap_err();
        assert!(matches!(reason, RejectionReason::TooManyKeystrokes { .. }));
    }

    #[test]
    fn test_empty_diagnosed() {
        let reason = diagnose_attempt(&[], 9, &FeatureExtractor::default()).unwrap_err();
        assert_eq!(reason, RejectionReason::NoCompleteKeystrokes);
    }
}
