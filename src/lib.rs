//! Synheart Rhythm - On-device keystroke-dynamics engine
//!
//! Rhythm authenticates a typist by *how* they type a passphrase. Raw key edges
//! go through a deterministic pipeline: event pairing → timing vector →
//! robust enrollment model → scaled-Manhattan verification → adaptive update.
//!
//! ## Modules
//!
//! - **Core**: [`features`], [`trainer`], [`authenticator`]. Pure, stateless,
//!   safe to call from any thread.
//! - **Flows**: [`pipeline`] wires the core to a [`store::ModelStore`] for
//!   enrollment and verification.
//! - **Collaborators**: [`diagnostics`] for user-facing rejection reasons,
//!   [`store`] for persistence, [`ffi`] for native front-ends.

pub mod authenticator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod store;
pub mod trainer;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use authenticator::{adapt_model, authenticate};
pub use config::EngineConfig;
pub use diagnostics::{diagnose_attempt, identify_typo, RejectionReason};
pub use error::RhythmError;
pub use features::{extract_features, FeatureExtractor};
pub use pipeline::{EnrollmentSession, EnrollmentStep, RhythmProcessor, VerificationOutcome};
pub use store::{InMemoryModelStore, JsonFileModelStore, ModelStore};
pub use trainer::{train_model, ModelTrainer};
pub use types::{Attempt, AuthDecision, KeyChar, KeyEdge, KeyEvent, Model, TimingVector};

/// Rhythm version
pub const RHYTHM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-rhythm";
