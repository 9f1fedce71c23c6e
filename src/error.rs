//! Error types for Synheart Rhythm

use thiserror::Error;

use crate::diagnostics::RejectionReason;

/// Errors that can occur while enrolling, verifying or persisting models
#[derive(Debug, Error)]
pub enum RhythmError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timing vector has {actual} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Cannot train a model from zero samples")]
    EmptyTrainingSet,

    #[error("Sample {index} has {actual} dimensions, expected {expected}")]
    InconsistentSampleLength {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Insufficient samples: need {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("No model enrolled for user: {0}")]
    ModelNotFound(String),

    #[error("Attempt rejected: {0}")]
    AttemptRejected(RejectionReason),

    #[error("Enrollment already complete")]
    EnrollmentComplete,

    #[error("Storage error: {0}")]
    StorageError(String),
}
