//! Model checkpointing
//!
//! A trained model is persisted as a directory under the models directory:
//!
//! ```text
//! <models_dir>/<name>/descriptor.json   architecture, input signature, hyperparameters
//! <models_dir>/<name>/weights.bin       full-precision parameter record
//! ```
//!
//! The descriptor holds everything needed to rebuild the forward computation,
//! so a model can be restored from its name alone, on any backend, without
//! any state from the process that trained it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module},
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::trainer::TrainedModel;
use super::HyperParameters;
use crate::dataset::ImageShape;
use crate::model::{Classifier, ClassifierConfig};
use crate::utils::error::{ExperimentError, Result};

const DESCRIPTOR_FILE: &str = "descriptor.json";
const WEIGHTS_STEM: &str = "weights";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// How predictions are scored after restoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// mean(argmax(logits) == argmax(labels))
    ArgmaxAccuracy,
}

/// Everything needed to rebuild and score a persisted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub run_id: u64,
    pub campaign: String,
    pub created_at: String,
    pub architecture: ClassifierConfig,
    pub hyperparameters: HyperParameters,
    pub input: ImageShape,
    pub num_classes: usize,
    pub metric: Metric,
    pub num_parameters: usize,
    /// Validation error after the last epoch
    pub final_validation_error: Option<f64>,
}

/// Reference to a persisted model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    name: String,
    dir: PathBuf,
}

impl ArtifactHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(DESCRIPTOR_FILE)
    }

    /// Path of the weight record (the recorder adds the `.bin` extension)
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_STEM).with_extension("bin")
    }

    fn weights_stem(&self) -> PathBuf {
        self.dir.join(WEIGHTS_STEM)
    }
}

/// A model rebuilt from disk
#[derive(Debug)]
pub struct RestoredModel<B: Backend> {
    pub descriptor: ModelDescriptor,
    pub model: Classifier<B>,
}

/// Base name of an artifact: campaign, run id, index within the campaign and
/// a timestamp.
pub fn artifact_name(campaign: &str, run_id: u64, index: usize) -> String {
    format!(
        "{}_run{}_{}_{}",
        campaign,
        run_id,
        index,
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Directory of persisted models
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    models_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Create a fresh directory for `base_name`, adding `_1`, `_2`, ... when
    /// the name is already taken.
    fn claim_dir(&self, base_name: &str) -> Result<ArtifactHandle> {
        fs::create_dir_all(&self.models_dir)?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base_name.to_string()
            } else {
                format!("{}_{}", base_name, attempt)
            };
            let dir = self.models_dir.join(&name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    if attempt > 0 {
                        warn!("Artifact name {} taken, using {}", base_name, name);
                    }
                    return Ok(ArtifactHandle { name, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ExperimentError::InvalidInput(format!(
            "no free artifact name for {} after {} attempts",
            base_name, MAX_NAME_ATTEMPTS
        )))
    }

    /// Persist a trained model under a unique name derived from `base_name`
    pub fn save<B: AutodiffBackend>(
        &self,
        trained: &TrainedModel<B>,
        run_id: u64,
        campaign: &str,
        base_name: &str,
    ) -> Result<ArtifactHandle> {
        let handle = self.claim_dir(base_name)?;
        let written = Self::write_artifact(&handle, trained, run_id, campaign);
        discard_on_error(&handle, written)?;

        info!("Model saved to {}", handle.dir.display());
        Ok(handle)
    }

    fn write_artifact<B: AutodiffBackend>(
        handle: &ArtifactHandle,
        trained: &TrainedModel<B>,
        run_id: u64,
        campaign: &str,
    ) -> Result<()> {
        let model = trained.model.valid();

        let descriptor = ModelDescriptor {
            name: handle.name.clone(),
            run_id,
            campaign: campaign.to_string(),
            created_at: Utc::now().to_rfc3339(),
            architecture: trained.architecture.clone(),
            hyperparameters: trained.hyperparameters,
            input: trained.architecture.input_shape(),
            num_classes: trained.architecture.num_classes,
            metric: Metric::ArgmaxAccuracy,
            num_parameters: model.num_params(),
            final_validation_error: trained.learning_curve.last(),
        };

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .save_file(handle.weights_stem(), &recorder)
            .map_err(|e| ExperimentError::Serialization(format!("Failed to save weights: {:?}", e)))?;

        let json = serde_json::to_string_pretty(&descriptor)?;
        fs::write(handle.descriptor_path(), json)?;
        Ok(())
    }

    /// Look up an artifact by name alone
    pub fn resolve(&self, name: &str) -> Result<ArtifactHandle> {
        let plain = Path::new(name)
            .file_name()
            .map(|f| f == name)
            .unwrap_or(false);
        if !plain {
            return Err(ExperimentError::ArtifactNotFound(name.to_string()));
        }

        let handle = ArtifactHandle {
            name: name.to_string(),
            dir: self.models_dir.join(name),
        };
        if !handle.descriptor_path().is_file() {
            return Err(ExperimentError::ArtifactNotFound(name.to_string()));
        }
        Ok(handle)
    }

    pub fn read_descriptor(&self, handle: &ArtifactHandle) -> Result<ModelDescriptor> {
        let path = handle.descriptor_path();
        let json = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExperimentError::ArtifactNotFound(handle.name.clone()),
            _ => ExperimentError::Io(e),
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Rebuild the model behind `handle` on `device`
    pub fn load<B: Backend>(
        &self,
        handle: &ArtifactHandle,
        device: &B::Device,
    ) -> Result<RestoredModel<B>> {
        let descriptor = self.read_descriptor(handle)?;
        if !handle.weights_path().is_file() {
            return Err(ExperimentError::ArtifactNotFound(format!(
                "{} (missing weights)",
                handle.name
            )));
        }

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = descriptor
            .architecture
            .init::<B>(device)?
            .load_file(handle.weights_stem(), &recorder, device)
            .map_err(|e| ExperimentError::Serialization(format!("Failed to load weights: {:?}", e)))?;

        info!("Model restored from {}", handle.dir.display());
        Ok(RestoredModel { descriptor, model })
    }

    /// Descriptors of every artifact in the store, sorted by name
    pub fn list(&self) -> Result<Vec<ModelDescriptor>> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }

        let mut descriptors = Vec::new();
        for entry in fs::read_dir(&self.models_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.resolve(name) {
                Ok(handle) => descriptors.push(self.read_descriptor(&handle)?),
                Err(ExperimentError::ArtifactNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }
}

/// Remove a claimed artifact directory when writing into it failed, so the
/// name is free again and no half-written model is left behind.
fn discard_on_error<T>(handle: &ArtifactHandle, result: Result<T>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(&handle.dir) {
            warn!("Failed to remove partial artifact {}: {}", handle.dir.display(), e);
        }
    }
    result
}
