//! Epoch-driven trainer
//!
//! The trainer owns the model and a plain SGD optimizer for one run. Each
//! epoch walks the deterministic batch partition of the training split, takes
//! one gradient step per batch, then measures the error on the full
//! validation split. Nothing is checkpointed mid-run; the trained model is
//! handed back once every epoch has completed.

use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer, Sgd, SgdConfig},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use super::metrics::{correct_predictions, sigmoid_cross_entropy, validation_error};
use super::{HyperParameters, LearningCurve};
use crate::dataset::batcher::{partition, split_tensors};
use crate::dataset::{DataSplits, DatasetSplit};
use crate::model::{Classifier, ClassifierConfig};
use crate::utils::error::{ExperimentError, Result};
use crate::utils::logging::TrainingLogger;

/// Where a run currently is. `Epoch(i)` means epoch `i` has been trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Initialized,
    Epoch(usize),
    Completed,
}

/// Settings that affect how a run is executed but not what it computes
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Examples per forward pass during validation
    pub eval_batch_size: usize,
    /// Draw a progress bar over the batches of each epoch
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            eval_batch_size: 1000,
            show_progress: false,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct TrainedModel<B: AutodiffBackend> {
    pub model: Classifier<B>,
    pub architecture: ClassifierConfig,
    pub hyperparameters: HyperParameters,
    pub learning_curve: LearningCurve,
    /// Mean scaled training loss per epoch
    pub train_losses: Vec<f64>,
}

/// Trainer for one run of the classifier
pub struct Trainer<B: AutodiffBackend> {
    model: Classifier<B>,
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, Classifier<B>, B>,
    architecture: ClassifierConfig,
    hyperparameters: HyperParameters,
    config: TrainerConfig,
    phase: TrainerPhase,
    learning_curve: LearningCurve,
    train_losses: Vec<f64>,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Build the model for `train`'s image shape and class count
    pub fn new(
        hyperparameters: HyperParameters,
        train: &DatasetSplit,
        config: TrainerConfig,
        device: B::Device,
    ) -> Result<Self> {
        hyperparameters.validate()?;

        let architecture = ClassifierConfig::for_input(train.image_shape(), train.num_classes())
            .with_num_filters(hyperparameters.num_filters)
            .with_filter_size(hyperparameters.filter_size);
        let model = architecture.init::<B>(&device)?;

        debug!(
            "Classifier for {} inputs, {} classes, {} flattened features",
            architecture.input_shape(),
            architecture.num_classes,
            architecture.flattened_features()
        );

        Ok(Self {
            model,
            optimizer: SgdConfig::new().init(),
            architecture,
            hyperparameters,
            config,
            phase: TrainerPhase::Initialized,
            learning_curve: LearningCurve::new(),
            train_losses: Vec::new(),
            device,
        })
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn model(&self) -> &Classifier<B> {
        &self.model
    }

    pub fn architecture(&self) -> &ClassifierConfig {
        &self.architecture
    }

    pub fn learning_curve(&self) -> &LearningCurve {
        &self.learning_curve
    }

    fn check_split(&self, split: &DatasetSplit, name: &str) -> Result<()> {
        if split.image_shape() != self.architecture.input_shape() {
            return Err(ExperimentError::ShapeMismatch(format!(
                "{} images are {} but the model expects {}",
                name,
                split.image_shape(),
                self.architecture.input_shape()
            )));
        }
        if split.num_classes() != self.architecture.num_classes {
            return Err(ExperimentError::ShapeMismatch(format!(
                "{} split has {} classes but the model predicts {}",
                name,
                split.num_classes(),
                self.architecture.num_classes
            )));
        }
        Ok(())
    }

    /// One gradient step per batch of `train`. Returns the mean scaled loss.
    pub fn train_epoch(&mut self, train: &DatasetSplit) -> Result<f64> {
        let epoch = match self.phase {
            TrainerPhase::Initialized => 0,
            TrainerPhase::Epoch(i) => i + 1,
            TrainerPhase::Completed => {
                return Err(ExperimentError::InvalidInput(
                    "trainer has already completed its run".to_string(),
                ))
            }
        };
        self.check_split(train, "training")?;

        let batches = partition(train.len(), self.hyperparameters.batch_size);
        if batches.is_empty() {
            warn!(
                "{} training examples do not fill a batch of {}; epoch {} makes no updates",
                train.len(),
                self.hyperparameters.batch_size,
                epoch
            );
        }

        let progress = self.progress_bar(batches.len());
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;

        for (batch_idx, range) in batches.iter().enumerate() {
            let batch = split_tensors::<B>(train, range.clone(), &self.device);

            let logits = self.model.forward(batch.images);
            let loss = sigmoid_cross_entropy(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                progress.abandon();
                return Err(ExperimentError::ComputationFailure(format!(
                    "loss became {} at epoch {} batch {}",
                    loss_value, epoch, batch_idx
                )));
            }
            loss_sum += loss_value;
            correct += correct_predictions(logits, batch.targets);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(
                self.hyperparameters.learning_rate,
                self.model.clone(),
                grads,
            );

            debug!("epoch {} batch {} loss {:.4}", epoch, batch_idx, loss_value);
            progress.inc(1);
        }
        progress.finish_and_clear();

        let seen = batches.len() * self.hyperparameters.batch_size;
        if seen > 0 {
            debug!(
                "epoch {} training accuracy {:.4}",
                epoch,
                correct as f64 / seen as f64
            );
        }

        self.phase = TrainerPhase::Epoch(epoch);
        Ok(loss_sum / batches.len().max(1) as f64)
    }

    /// Error of the current model on the whole of `valid`.
    ///
    /// Runs on the inner backend, so no gradients are tracked.
    pub fn validate(&self, valid: &DatasetSplit) -> Result<f64> {
        self.check_split(valid, "validation")?;
        let model = self.model.valid();
        validation_error::<B::InnerBackend>(&model, valid, self.config.eval_batch_size, &self.device)
    }

    /// Train for every epoch, validating after each, and hand back the model
    pub fn fit(mut self, splits: &DataSplits) -> Result<TrainedModel<B>> {
        splits.ensure_consistent()?;
        let mut logger = TrainingLogger::new(self.hyperparameters.epochs);

        for epoch in 0..self.hyperparameters.epochs {
            logger.start_epoch(epoch);
            let train_loss = self.train_epoch(&splits.train)?;
            let error = self.validate(&splits.valid)?;

            self.train_losses.push(train_loss);
            self.learning_curve.push(error);
            logger.end_epoch(train_loss, error);
        }

        self.phase = TrainerPhase::Completed;
        logger.log_complete(self.learning_curve.last());

        Ok(TrainedModel {
            model: self.model,
            architecture: self.architecture,
            hyperparameters: self.hyperparameters,
            learning_curve: self.learning_curve,
            train_losses: self.train_losses,
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
