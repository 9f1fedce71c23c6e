//! Enrollment model training
//!
//! Builds a per-user model from repeated enrollment vectors:
//! median center → distance-to-median trim → mean/std on retained samples →
//! variance floor → threshold calibration from self-distances.

use tracing::{debug, info, warn};

use crate::authenticator::scaled_manhattan;
use crate::config::{
    EngineConfig, DEFAULT_MIN_CLEAN_SAMPLES, DEFAULT_THRESHOLD_SIGMAS, DEFAULT_TRIM_PERCENTILE,
    DEFAULT_VARIANCE_FLOOR_RATIO,
};
use crate::error::RhythmError;
use crate::types::{Model, TimingVector};

/// Absolute scale floor in seconds, below any realistic capture resolution.
/// Keeps dimensions with a zero or negative mean (rollover flights) finite.
pub const MIN_SCALE_SEC: f64 = 1e-4;

/// Train a model with the default tunables
pub fn train_model(samples: &[TimingVector]) -> Result<Model, RhythmError> {
    ModelTrainer::default().train(samples)
}

/// Robust model trainer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelTrainer {
    pub trim_percentile: f64,
    pub min_clean_samples: usize,
    pub variance_floor_ratio: f64,
    pub threshold_sigmas: f64,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self {
            trim_percentile: DEFAULT_TRIM_PERCENTILE,
            min_clean_samples: DEFAULT_MIN_CLEAN_SAMPLES,
            variance_floor_ratio: DEFAULT_VARIANCE_FLOOR_RATIO,
            threshold_sigmas: DEFAULT_THRESHOLD_SIGMAS,
        }
    }
}

impl ModelTrainer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            trim_percentile: config.trim_percentile,
            min_clean_samples: config.min_clean_samples,
            variance_floor_ratio: config.variance_floor_ratio,
            threshold_sigmas: config.threshold_sigmas,
        }
    }

    /// Train a model from equal-length enrollment vectors
    ///
    /// # Errors
    /// `EmptyTrainingSet` for no samples, `InconsistentSampleLength` when any
    /// sample's length differs from the first. Valid input never fails.
    pub fn train(&self, samples: &[TimingVector]) -> Result<Model, RhythmError> {
        let dimension = check_shape(samples)?;
        let rows: Vec<&[f64]> = samples.iter().map(TimingVector::as_slice).collect();

        let clean = self.trim_outliers(&rows);

        let center = column_means(&clean, dimension);
        let scale: Vec<f64> = column_std_devs(&clean, &center)
            .into_iter()
            .zip(&center)
            .map(|(std, mean)| {
                std.max(self.variance_floor_ratio * mean.abs())
                    .max(MIN_SCALE_SEC)
            })
            .collect();

        let self_distances: Vec<f64> = clean
            .iter()
            .map(|row| scaled_manhattan(row, &center, &scale))
            .collect();
        let mu = mean(&self_distances);
        let sigma = std_dev(&self_distances, mu);
        let calculated = mu + self.threshold_sigmas * sigma;
        let threshold = calculated.max(dimension as f64);

        info!(
            samples = samples.len(),
            retained = clean.len(),
            dimension,
            calculated_threshold = calculated,
            threshold,
            "trained typing model"
        );

        Ok(Model::new(center, scale, threshold))
    }

    /// Drop samples farther from the median than the trim percentile
    ///
    /// Single pass. Falls back to the full set if fewer than
    /// `min_clean_samples` would remain.
    fn trim_outliers<'a>(&self, rows: &[&'a [f64]]) -> Vec<&'a [f64]> {
        let dimension = rows.first().map_or(0, |r| r.len());
        let median = column_medians(rows, dimension);
        let distances: Vec<f64> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&median)
                    .map(|(x, m)| (x - m).abs())
                    .sum::<f64>()
            })
            .collect();
        let cutoff = percentile(&distances, self.trim_percentile);

        let clean: Vec<&[f64]> = rows
            .iter()
            .zip(&distances)
            .filter(|(_, d)| **d <= cutoff)
            .map(|(row, _)| *row)
            .collect();

        if clean.len() < self.min_clean_samples {
            warn!(
                retained = clean.len(),
                minimum = self.min_clean_samples,
                "outlier trim left too few samples, using full set"
            );
            return rows.to_vec();
        }

        debug!(
            trimmed = rows.len() - clean.len(),
            cutoff, "trimmed enrollment outliers"
        );
        clean
    }
}

fn check_shape(samples: &[TimingVector]) -> Result<usize, RhythmError> {
    let first = samples.first().ok_or(RhythmError::EmptyTrainingSet)?;
    let expected = first.len();
    if expected == 0 {
        return Err(RhythmError::InconsistentSampleLength {
            index: 0,
            expected: 1,
            actual: 0,
        });
    }
    for (index, sample) in samples.iter().enumerate() {
        if sample.len() != expected {
            return Err(RhythmError::InconsistentSampleLength {
                index,
                expected,
                actual: sample.len(),
            });
        }
    }
    Ok(expected)
}

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed mean
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median (mean of the two middle values for even lengths)
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn column(rows: &[&[f64]], i: usize) -> Vec<f64> {
    rows.iter().map(|row| row[i]).collect()
}

fn column_medians(rows: &[&[f64]], dimension: usize) -> Vec<f64> {
    (0..dimension).map(|i| median(&column(rows, i))).collect()
}

fn column_means(rows: &[&[f64]], dimension: usize) -> Vec<f64> {
    (0..dimension).map(|i| mean(&column(rows, i))).collect()
}

fn column_std_devs(rows: &[&[f64]], means: &[f64]) -> Vec<f64> {
    means
        .iter()
        .enumerate()
        .map(|(i, m)| std_dev(&column(rows, i), *m))
        .collect()
}
