//! Experiment configuration
//!
//! Settings come from an optional TOML file, are then overridden by command
//! line flags, and are validated before anything runs:
//!
//! ```toml
//! run_id = 0
//!
//! [hyperparameters]
//! learning_rate = 0.001
//! num_filters = 16
//! filter_size = 3
//! batch_size = 128
//! epochs = 12
//!
//! [sweep]
//! learning_rates = [0.1, 0.01, 0.001, 0.0001]
//! filter_sizes = [1, 3, 5, 7]
//!
//! [data]
//! input_path = "./"
//! source = "mnist"
//!
//! [output]
//! output_path = "./"
//! write_baseline = true
//! charts = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::mnist::DEFAULT_VALIDATION_SIZE;
use crate::dataset::SyntheticSource;
use crate::training::{HyperParameters, TrainerConfig};
use crate::utils::error::{ExperimentError, Result};

/// Learning rates tried by the learning-rate campaign
pub const DEFAULT_LEARNING_RATES: [f64; 4] = [0.1, 0.01, 0.001, 0.0001];

/// Filter sizes tried by the filter-size campaign
pub const DEFAULT_FILTER_SIZES: [usize; 4] = [1, 3, 5, 7];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Identifies this sweep; names the baseline result file and every artifact
    pub run_id: u64,
    pub hyperparameters: HyperParameters,
    pub sweep: SweepConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub learning_rates: Vec<f64>,
    pub filter_sizes: Vec<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            learning_rates: DEFAULT_LEARNING_RATES.to_vec(),
            filter_sizes: DEFAULT_FILTER_SIZES.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mnist,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding (or receiving) the MNIST files
    pub input_path: PathBuf,
    pub source: SourceKind,
    /// Training images held out for validation
    pub validation_size: usize,
    /// Examples per forward pass during validation and test evaluation
    pub eval_batch_size: usize,
    /// Used when `source = "synthetic"`
    pub synthetic: SyntheticSource,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("./"),
            source: SourceKind::Mnist,
            validation_size: DEFAULT_VALIDATION_SIZE,
            eval_batch_size: 1000,
            synthetic: SyntheticSource::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_path: PathBuf,
    /// Defaults to `<output_path>/models`
    pub models_dir: Option<PathBuf>,
    /// Write the full baseline record; `false` leaves an empty baseline file
    pub write_baseline: bool,
    /// Render an SVG of the learning curves after each campaign
    pub charts: bool,
    /// Progress bar over the batches of each epoch
    pub show_progress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("./"),
            models_dir: None,
            write_baseline: true,
            charts: true,
            show_progress: false,
        }
    }
}

/// Values given on the command line. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_path: Option<PathBuf>,
    pub input_path: Option<PathBuf>,
    pub learning_rate: Option<f64>,
    pub num_filters: Option<usize>,
    pub batch_size: Option<usize>,
    pub epochs: Option<usize>,
    pub run_id: Option<u64>,
    pub filter_size: Option<usize>,
    pub synthetic: bool,
}

impl ExperimentConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ExperimentError::PathNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ExperimentError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        let hp = &mut self.hyperparameters;
        if let Some(v) = overrides.learning_rate {
            hp.learning_rate = v;
        }
        if let Some(v) = overrides.num_filters {
            hp.num_filters = v;
        }
        if let Some(v) = overrides.batch_size {
            hp.batch_size = v;
        }
        if let Some(v) = overrides.epochs {
            hp.epochs = v;
        }
        if let Some(v) = overrides.filter_size {
            hp.filter_size = v;
        }
        if let Some(v) = overrides.run_id {
            self.run_id = v;
        }
        if let Some(ref v) = overrides.output_path {
            self.output.output_path = v.clone();
        }
        if let Some(ref v) = overrides.input_path {
            self.data.input_path = v.clone();
        }
        if overrides.synthetic {
            self.data.source = SourceKind::Synthetic;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.hyperparameters
            .validate()
            .map_err(|e| ExperimentError::Config(format!("[hyperparameters] {}", e)))?;

        for &lr in &self.sweep.learning_rates {
            self.hyperparameters
                .with_learning_rate(lr)
                .validate()
                .map_err(|e| ExperimentError::Config(format!("[sweep] learning_rates: {}", e)))?;
        }
        for &fs in &self.sweep.filter_sizes {
            self.hyperparameters
                .with_filter_size(fs)
                .validate()
                .map_err(|e| ExperimentError::Config(format!("[sweep] filter_sizes: {}", e)))?;
        }
        if self.data.eval_batch_size == 0 {
            return Err(ExperimentError::Config(
                "[data] eval_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn models_dir(&self) -> PathBuf {
        self.output
            .models_dir
            .clone()
            .unwrap_or_else(|| self.output.output_path.join("models"))
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            eval_batch_size: self.data.eval_batch_size,
            show_progress: self.output.show_progress,
        }
    }
}
