//! Enrollment and verification flows
//!
//! Glues the pure operations to a [`ModelStore`]:
//!
//! - Enrollment: attempt → text check → extract → length check → accumulate
//!   `required_samples` vectors → train → save.
//! - Verification: attempt → text check → extract → authenticate → adaptive
//!   update on high-confidence accepts → save.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::authenticator::{adapt, authenticate};
use crate::config::EngineConfig;
use crate::diagnostics::{diagnose_attempt, identify_typo, RejectionReason};
use crate::error::RhythmError;
use crate::features::FeatureExtractor;
use crate::store::ModelStore;
use crate::trainer::ModelTrainer;
use crate::types::{Attempt, AuthDecision, Model, TimingVector, UserRecord};

/// Result of submitting one enrollment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum EnrollmentStep {
    /// Sample accepted; more are needed
    Recorded { count: usize, required: usize },
    /// Final sample accepted and the model trained
    Complete { model: Model },
}

/// Accumulates enrollment samples for one user
#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    config: EngineConfig,
    extractor: FeatureExtractor,
    samples: Vec<TimingVector>,
}

impl EnrollmentSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            extractor: FeatureExtractor::from_config(&config),
            config,
            samples: Vec::new(),
        }
    }

    /// `(accepted samples, required samples)`
    pub fn progress(&self) -> (usize, usize) {
        (self.samples.len(), self.config.required_samples)
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.config.required_samples
    }

    pub fn samples(&self) -> &[TimingVector] {
        &self.samples
    }

    /// Discard all samples collected so far
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Check and record a captured attempt
    ///
    /// # Errors
    /// `AttemptRejected` with the reason when the text or timing is unusable,
    /// `EnrollmentComplete` once enough samples were accepted.
    pub fn submit(&mut self, attempt: &Attempt) -> Result<EnrollmentStep, RhythmError> {
        if self.is_complete() {
            return Err(RhythmError::EnrollmentComplete);
        }
        let expected = self.config.expected_dimension();
        let vector = check_attempt(&self.config, &self.extractor, attempt, expected)?;
        self.push(vector)
    }

    /// Record an already-extracted vector
    pub fn add_sample(&mut self, vector: TimingVector) -> Result<EnrollmentStep, RhythmError> {
        if self.is_complete() {
            return Err(RhythmError::EnrollmentComplete);
        }
        let expected = self.config.expected_dimension();
        if vector.len() != expected {
            return Err(RhythmError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        self.push(vector)
    }

    fn push(&mut self, vector: TimingVector) -> Result<EnrollmentStep, RhythmError> {
        self.samples.push(vector);
        let (count, required) = self.progress();
        debug!(count, required, "enrollment sample recorded");

        if count >= required {
            let model = self.train()?;
            return Ok(EnrollmentStep::Complete { model });
        }
        Ok(EnrollmentStep::Recorded { count, required })
    }

    /// Train from the collected samples
    ///
    /// # Errors
    /// `InsufficientSamples` before `required_samples` were accepted.
    pub fn train(&self) -> Result<Model, RhythmError> {
        let (actual, required) = self.progress();
        if actual < required {
            return Err(RhythmError::InsufficientSamples { required, actual });
        }
        ModelTrainer::from_config(&self.config).train(&self.samples)
    }
}

/// Result of one verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub decision: AuthDecision,
    /// Whether the model center was moved toward this attempt
    pub adapted: bool,
    /// The model after any adaptive update
    pub model: Model,
}

/// Authenticate a vector and apply the adaptive-update policy
///
/// The center moves only for accepted attempts scoring above
/// `adapt_min_score`, so borderline attempts never drag the model.
pub fn verify_vector(
    config: &EngineConfig,
    vector: &TimingVector,
    model: &Model,
) -> Result<VerificationOutcome, RhythmError> {
    let decision = authenticate(vector, model)?;
    if decision.accepted && decision.score > config.adapt_min_score {
        let adapted = adapt(model, vector, config.adapt_rate)?;
        info!(score = decision.score, "adaptive update applied");
        return Ok(VerificationOutcome {
            decision,
            adapted: true,
            model: adapted,
        });
    }
    Ok(VerificationOutcome {
        decision,
        adapted: false,
        model: model.clone(),
    })
}

fn check_attempt(
    config: &EngineConfig,
    extractor: &FeatureExtractor,
    attempt: &Attempt,
    expected_dimension: usize,
) -> Result<TimingVector, RhythmError> {
    if let Some(text) = &attempt.text {
        if let Some(typo) = identify_typo(text, &config.passphrase) {
            debug!(%typo, "attempt text does not match passphrase");
            return Err(RhythmError::AttemptRejected(RejectionReason::Typo(typo)));
        }
    }
    diagnose_attempt(&attempt.events, expected_dimension, extractor)
        .map_err(RhythmError::AttemptRejected)
}

/// Stateful processor bound to a model store
pub struct RhythmProcessor<S: ModelStore> {
    config: EngineConfig,
    extractor: FeatureExtractor,
    store: S,
}

impl<S: ModelStore> RhythmProcessor<S> {
    /// Create a processor; the configuration is validated first
    pub fn new(config: EngineConfig, store: S) -> Result<Self, RhythmError> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::from_config(&config),
            config,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Register (or look up) a user and report whether a model exists
    pub fn login(&mut self, username: &str) -> Result<(UserRecord, bool), RhythmError> {
        let user = self.store.register_user(username)?;
        let enrolled = self.store.load_model(user.id)?.is_some();
        Ok((user, enrolled))
    }

    /// Start collecting enrollment samples under this processor's config
    pub fn begin_enrollment(&self) -> EnrollmentSession {
        EnrollmentSession::new(self.config.clone())
    }

    /// Train from a finished session and save the model for `username`
    pub fn complete_enrollment(
        &mut self,
        username: &str,
        session: &EnrollmentSession,
    ) -> Result<(UserRecord, Model), RhythmError> {
        let model = session.train()?;
        let user = self.store.register_user(username)?;
        self.store.save_model(user.id, &model)?;
        info!(user_id = %user.id, dimension = model.dimension, "enrollment saved");
        Ok((user, model))
    }

    /// Enroll from a batch of attempts, skipping unusable ones
    ///
    /// Returns the saved model and the rejected attempts with their index.
    pub fn enroll(
        &mut self,
        username: &str,
        attempts: &[Attempt],
    ) -> Result<(Model, Vec<(usize, RejectionReason)>), RhythmError> {
        let mut session = self.begin_enrollment();
        let mut rejected = Vec::new();

        for (index, attempt) in attempts.iter().enumerate() {
            if session.is_complete() {
                break;
            }
            match session.submit(attempt) {
                Ok(_) => {}
                Err(RhythmError::AttemptRejected(reason)) => {
                    debug!(index, %reason, "enrollment attempt rejected");
                    rejected.push((index, reason));
                }
                Err(e) => return Err(e),
            }
        }

        let (_, model) = self.complete_enrollment(username, &session)?;
        Ok((model, rejected))
    }

    /// Verify an attempt for an enrolled user, persisting any adaptive update
    pub fn verify(
        &mut self,
        username: &str,
        attempt: &Attempt,
    ) -> Result<VerificationOutcome, RhythmError> {
        let user = self
            .store
            .find_user(username)?
            .ok_or_else(|| RhythmError::UnknownUser(username.to_string()))?;
        let model = self
            .store
            .load_model(user.id)?
            .ok_or_else(|| RhythmError::ModelNotFound(username.to_string()))?;

        let vector = check_attempt(&self.config, &self.extractor, attempt, model.dimension)?;
        let outcome = verify_vector(&self.config, &vector, &model)?;

        if outcome.adapted {
            self.store.update_center(user.id, &outcome.model.center)?;
        }
        Ok(outcome)
    }
}
