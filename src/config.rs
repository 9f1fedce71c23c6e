//! Engine configuration
//!
//! Passphrase, enrollment size and the statistical tunables of the model. All
//! values have defaults matching the reference deployment, so an empty JSON
//! object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RhythmError;

/// Default enrollment passphrase
pub const DEFAULT_PASSPHRASE: &str = "The quick brown fox jumps over the lazy dog";

/// Default number of accepted enrollment samples
pub const DEFAULT_REQUIRED_SAMPLES: usize = 10;

/// Longest inter-key pause (seconds) before an attempt is discarded
pub const DEFAULT_MAX_PAUSE_SEC: f64 = 2.0;

/// Percentile of distance-to-median above which enrollment samples are trimmed
pub const DEFAULT_TRIM_PERCENTILE: f64 = 80.0;

/// Trimming is undone if it would leave fewer samples than this
pub const DEFAULT_MIN_CLEAN_SAMPLES: usize = 5;

/// Minimum scale as a fraction of the per-dimension mean
pub const DEFAULT_VARIANCE_FLOOR_RATIO: f64 = 0.10;

/// Threshold = mean + this many standard deviations of self-distances
pub const DEFAULT_THRESHOLD_SIGMAS: f64 = 6.0;

/// EMA rate used by adaptive updates
pub const DEFAULT_ADAPT_RATE: f64 = 0.1;

/// Accepted attempts must score strictly above this to update the model
pub const DEFAULT_ADAPT_MIN_SCORE: f64 = 85.0;

/// Configuration for enrollment and verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Text the user types during enrollment and verification
    pub passphrase: String,
    /// Accepted samples required before a model is trained
    pub required_samples: usize,
    /// Maximum flight time (seconds) tolerated inside one attempt
    pub max_pause_sec: f64,
    /// Outlier trim cutoff (percentile of distance to the median sample)
    pub trim_percentile: f64,
    /// Floor on retained samples after trimming
    pub min_clean_samples: usize,
    /// Scale floor as a fraction of the mean
    pub variance_floor_ratio: f64,
    /// Standard deviations added to the mean self-distance
    pub threshold_sigmas: f64,
    /// Adaptive update rate
    pub adapt_rate: f64,
    /// Minimum score for an adaptive update
    pub adapt_min_score: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            required_samples: DEFAULT_REQUIRED_SAMPLES,
            max_pause_sec: DEFAULT_MAX_PAUSE_SEC,
            trim_percentile: DEFAULT_TRIM_PERCENTILE,
            min_clean_samples: DEFAULT_MIN_CLEAN_SAMPLES,
            variance_floor_ratio: DEFAULT_VARIANCE_FLOOR_RATIO,
            threshold_sigmas: DEFAULT_THRESHOLD_SIGMAS,
            adapt_rate: DEFAULT_ADAPT_RATE,
            adapt_min_score: DEFAULT_ADAPT_MIN_SCORE,
        }
    }
}

impl EngineConfig {
    /// Default configuration with a different passphrase
    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            ..Self::default()
        }
    }

    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, RhythmError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, RhythmError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, RhythmError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of characters in the passphrase
    pub fn passphrase_len(&self) -> usize {
        self.passphrase.chars().count()
    }

    /// Timing vector length for this passphrase: `k` dwells + `k - 1` flights
    pub fn expected_dimension(&self) -> usize {
        (2 * self.passphrase_len()).saturating_sub(1)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), RhythmError> {
        if self.passphrase.is_empty() {
            return Err(RhythmError::InvalidConfig(
                "passphrase must not be empty".to_string(),
            ));
        }
        if self.required_samples == 0 {
            return Err(RhythmError::InvalidConfig(
                "required_samples must be at least 1".to_string(),
            ));
        }
        if !(self.max_pause_sec > 0.0) {
            return Err(RhythmError::InvalidConfig(format!(
                "max_pause_sec must be positive, got {}",
                self.max_pause_sec
            )));
        }
        if !(self.trim_percentile > 0.0 && self.trim_percentile <= 100.0) {
            return Err(RhythmError::InvalidConfig(format!(
                "trim_percentile must be in (0, 100], got {}",
                self.trim_percentile
            )));
        }
        if !(self.variance_floor_ratio >= 0.0) {
            return Err(RhythmError::InvalidConfig(format!(
                "variance_floor_ratio must be non-negative, got {}",
                self.variance_floor_ratio
            )));
        }
        if !(self.threshold_sigmas >= 0.0) {
            return Err(RhythmError::InvalidConfig(format!(
                "threshold_sigmas must be non-negative, got {}",
                self.threshold_sigmas
            )));
        }
        if !(self.adapt_rate > 0.0 && self.adapt_rate <= 1.0) {
            return Err(RhythmError::InvalidConfig(format!(
                "adapt_rate must be in (0, 1], got {}",
                self.adapt_rate
            )));
        }
        if !(0.0..=100.0).contains(&self.adapt_min_score) {
            return Err(RhythmError::InvalidConfig(format!(
                "adapt_min_score must be in [0, 100], got {}",
                self.adapt_min_score
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_dimension() {
        let config = EngineConfig::default();
        // 43 characters -> 43 dwells + 42 flights
        assert_eq!(config.passphrase_len(), 43);
        assert_eq!(config.expected_dimension(), 85);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            EngineConfig::from_json(r#"{"passphrase": "hunter2", "required_samples": 12}"#)
                .unwrap();
        assert_eq!(config.passphrase, "hunter2");
        assert_eq!(config.required_samples, 12);
        assert_eq!(config.expected_dimension(), 13);
        assert_eq!(config.max_pause_sec, DEFAULT_MAX_PAUSE_SEC);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_json(r#"{"passphrase": ""}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"required_samples": 0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"max_pause_sec": 0.0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"trim_percentile": 120.0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"adapt_rate": 1.5}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"adapt_min_score": -1.0}"#).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhythm.json");
        let config = EngineConfig::with_passphrase("open sesame");
        fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
