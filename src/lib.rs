//! # convnet_sweep
//!
//! Train a small convolutional classifier, validate it every epoch, persist it,
//! restore it in isolation for test-time evaluation, and sweep learning rate
//! and filter size to compare learning curves. Built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: In-memory splits, one-hot labels, batch partitioning, MNIST and synthetic sources
//! - `model`: The two-stage convolutional classifier
//! - `training`: Hyperparameters, loss and accuracy, the trainer, and the checkpoint store
//! - `inference`: Evaluation of restored models
//! - `experiments`: Sweep plans, result records and the orchestrator
//! - `utils`: Errors, logging and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convnet_sweep::backend::{default_device, TrainingBackend};
//! use convnet_sweep::dataset::SyntheticSource;
//! use convnet_sweep::experiments::{ExperimentConfig, SweepOrchestrator};
//!
//! let source = SyntheticSource::new(200, 28, 28, 10);
//! let orchestrator = SweepOrchestrator::new(source, ExperimentConfig::default());
//! let report = orchestrator.run::<TrainingBackend>(&default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod experiments;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{DataSource, DataSplits, DatasetSplit, MnistSource, SyntheticSource};
pub use experiments::{ExperimentConfig, ResultRecord, SweepOrchestrator, SweepPlan};
pub use inference::Evaluator;
pub use model::{Classifier, ClassifierConfig};
pub use training::{CheckpointStore, HyperParameters, LearningCurve, Trainer};
pub use utils::error::{ExperimentError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
