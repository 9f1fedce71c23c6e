//! Core data types for keystroke dynamics
//!
//! These types flow through the rhythm pipeline: raw key edges from the capture
//! layer, paired keystrokes, the fixed-length timing vector, the per-user model
//! and the verification decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key edge reported by the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEdge {
    Down,
    Up,
}

/// Key identity attached to a raw event
///
/// Corrections are passed as a distinct sentinel rather than a normal character
/// so the extractor can reject the attempt outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyChar {
    /// A printable character from the passphrase
    Char(char),
    /// Backspace or any other correction action
    Correction,
    /// The capture layer could not resolve the key
    Unresolved,
}

impl KeyChar {
    /// The printable character, if any
    pub fn as_char(&self) -> Option<char> {
        match self {
            KeyChar::Char(c) => Some(*c),
            _ => None,
        }
    }
}

impl From<char> for KeyChar {
    fn from(c: char) -> Self {
        KeyChar::Char(c)
    }
}

/// A single raw key edge: `(character, edge, timestamp in seconds)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: KeyChar,
    pub edge: KeyEdge,
    /// Monotonic timestamp in seconds
    pub timestamp: f64,
}

impl KeyEvent {
    pub fn new(key: impl Into<KeyChar>, edge: KeyEdge, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            edge,
            timestamp,
        }
    }

    pub fn down(key: impl Into<KeyChar>, timestamp: f64) -> Self {
        Self::new(key, KeyEdge::Down, timestamp)
    }

    pub fn up(key: impl Into<KeyChar>, timestamp: f64) -> Self {
        Self::new(key, KeyEdge::Up, timestamp)
    }

    /// A correction (backspace) press
    pub fn correction(timestamp: f64) -> Self {
        Self::new(KeyChar::Correction, KeyEdge::Down, timestamp)
    }
}

/// One captured attempt: the text as typed plus its raw key edges
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attempt {
    /// Text in the input field when the attempt was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub events: Vec<KeyEvent>,
}

impl Attempt {
    pub fn new(text: impl Into<String>, events: Vec<KeyEvent>) -> Self {
        Self {
            text: Some(text.into()),
            events,
        }
    }

    /// Attempt with events only; the text check is skipped
    pub fn from_events(events: Vec<KeyEvent>) -> Self {
        Self { text: None, events }
    }
}

/// A completed press/release pair for one character instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keystroke {
    pub key: char,
    pub down: f64,
    pub up: f64,
}

impl Keystroke {
    /// Hold duration. Only negative if the event stream itself is inconsistent.
    pub fn dwell(&self) -> f64 {
        self.up - self.down
    }

    /// Gap between releasing this key and pressing `next`; negative under rollover
    pub fn flight_to(&self, next: &Keystroke) -> f64 {
        next.down - self.up
    }
}

/// Dwell times followed by flight times, length `2k - 1` for `k` keystrokes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingVector(pub Vec<f64>);

impl TimingVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of keystrokes this vector was derived from
    pub fn keystroke_count(&self) -> usize {
        (self.0.len() + 1) / 2
    }

    /// The dwell segment (first `k` values)
    pub fn dwells(&self) -> &[f64] {
        &self.0[..self.keystroke_count()]
    }

    /// The flight segment (last `k - 1` values)
    pub fn flights(&self) -> &[f64] {
        &self.0[self.keystroke_count()..]
    }
}

impl From<Vec<f64>> for TimingVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl AsRef<[f64]> for TimingVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Per-user typing model
///
/// Written and read as one record. `dimension` is carried alongside the arrays so
/// a storage backend never loses shape information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Vector dimensionality (`2k - 1`)
    pub dimension: usize,
    /// Mean of the retained enrollment samples
    pub center: Vec<f64>,
    /// Per-dimension standard deviation, variance-floored
    pub scale: Vec<f64>,
    /// Acceptance threshold on the scaled Manhattan distance
    pub threshold: f64,
}

impl Model {
    pub fn new(center: Vec<f64>, scale: Vec<f64>, threshold: f64) -> Self {
        Self {
            dimension: center.len(),
            center,
            scale,
            threshold,
        }
    }

    /// Check that the model can be scored against
    ///
    /// Shape must match `dimension`, every scale must be finite and positive,
    /// and so must the threshold. A zero scale or threshold would make the
    /// distance or score undefined.
    pub fn is_consistent(&self) -> bool {
        self.center.len() == self.dimension
            && self.scale.len() == self.dimension
            && self.center.iter().all(|c| c.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
            && self.threshold.is_finite()
            && self.threshold > 0.0
    }

    /// Same model with a replaced center; scale and threshold are kept
    pub fn with_center(&self, center: Vec<f64>) -> Self {
        Self {
            dimension: self.dimension,
            center,
            scale: self.scale.clone(),
            threshold: self.threshold,
        }
    }
}

/// Outcome of a single verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthDecision {
    pub accepted: bool,
    /// Scaled Manhattan distance, >= 0
    pub distance: f64,
    /// Confidence score in [0, 100]
    pub score: f64,
}

/// Registered user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }
}
