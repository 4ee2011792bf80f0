//! Training module
//!
//! This module provides:
//! - Hyperparameters of a single run and their validation
//! - The loss and accuracy definitions shared by training and evaluation
//! - The epoch-driven trainer with per-epoch validation
//! - The checkpoint store that persists a trained model for later evaluation

pub mod checkpoint;
pub mod metrics;
pub mod trainer;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ExperimentError, Result};

pub use checkpoint::{ArtifactHandle, CheckpointStore, ModelDescriptor, RestoredModel};
pub use trainer::{TrainedModel, Trainer, TrainerConfig, TrainerPhase};

/// Sigmoid cross-entropy is multiplied by this before the gradient step
pub const LOSS_SCALE: f64 = 100.0;

pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_NUM_FILTERS: usize = 16;
pub const DEFAULT_FILTER_SIZE: usize = 3;
pub const DEFAULT_BATCH_SIZE: usize = 128;
pub const DEFAULT_EPOCHS: usize = 12;

/// Hyperparameters of one run. Fixed once the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    pub learning_rate: f64,
    pub num_filters: usize,
    pub filter_size: usize,
    pub batch_size: usize,
    pub epochs: usize,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            num_filters: DEFAULT_NUM_FILTERS,
            filter_size: DEFAULT_FILTER_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
        }
    }
}

impl HyperParameters {
    pub fn with_learning_rate(self, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..self
        }
    }

    pub fn with_filter_size(self, filter_size: usize) -> Self {
        Self {
            filter_size,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ExperimentError::InvalidInput(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [
            ("num_filters", self.num_filters),
            ("filter_size", self.filter_size),
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
        ] {
            if value == 0 {
                return Err(ExperimentError::InvalidInput(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Validation error per completed epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearningCurve(Vec<f64>);

impl LearningCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, validation_error: f64) {
        self.0.push(validation_error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for LearningCurve {
    fn from(errors: Vec<f64>) -> Self {
        Self(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters() {
        let hp = HyperParameters::default();
        assert_eq!(hp.learning_rate, 1e-3);
        assert_eq!(hp.num_filters, 16);
        assert_eq!(hp.filter_size, 3);
        assert_eq!(hp.batch_size, 128);
        assert_eq!(hp.epochs, 12);
        hp.validate().unwrap();
    }

    #[test]
    fn test_hyperparameters_reject_invalid_values() {
        let base = HyperParameters::default();
        assert!(base.with_learning_rate(0.0).validate().is_err());
        assert!(base.with_learning_rate(f64::NAN).validate().is_err());
        assert!(base.with_filter_size(0).validate().is_err());
        // even kernels are padded unevenly, not rejected
        base.with_filter_size(2).validate().unwrap();
        assert!(HyperParameters { epochs: 0, ..base }.validate().is_err());
        assert!(HyperParameters { batch_size: 0, ..base }.validate().is_err());
    }

    #[test]
    fn test_learning_curve_serializes_as_array() {
        let curve = LearningCurve::from(vec![0.5, 0.25]);
        assert_eq!(serde_json::to_string(&curve).unwrap(), "[0.5,0.25]");
        assert_eq!(curve.last(), Some(0.25));
    }
}
