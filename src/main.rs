//! convnet_sweep CLI
//!
//! Runs the baseline, learning-rate and filter-size campaigns and writes one
//! result file per run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use convnet_sweep::backend::{backend_name, default_device, TrainingBackend};
use convnet_sweep::dataset::{DataSource, MnistSource};
use convnet_sweep::experiments::config::{ExperimentConfig, Overrides, SourceKind};
use convnet_sweep::experiments::{SweepOrchestrator, SweepReport};
use convnet_sweep::training::CheckpointStore;
use convnet_sweep::utils::format_duration;
use convnet_sweep::utils::logging::{init_logging, LogConfig};

/// Train, checkpoint and evaluate a CNN, sweeping learning rate and filter size
#[derive(Parser, Debug)]
#[command(name = "convnet_sweep")]
#[command(version)]
#[command(about = "Convolutional classifier experiment sweeps with Burn", long_about = None)]
struct Cli {
    /// Where the result directories and models are written [default: ./]
    #[arg(long = "output_path", value_name = "DIR")]
    output_path: Option<PathBuf>,

    /// Directory holding the MNIST files [default: ./]
    #[arg(long = "input_path", value_name = "DIR")]
    input_path: Option<PathBuf>,

    /// Baseline learning rate [default: 0.001]
    #[arg(long = "learning_rate")]
    learning_rate: Option<f64>,

    /// Filters per convolution [default: 16]
    #[arg(long = "num_filters")]
    num_filters: Option<usize>,

    /// Examples per gradient step [default: 128]
    #[arg(long = "batch_size")]
    batch_size: Option<usize>,

    /// Training epochs per run [default: 12]
    #[arg(long = "epochs")]
    epochs: Option<usize>,

    /// Sweep identifier [default: 0]
    #[arg(long = "run_id")]
    run_id: Option<u64>,

    /// Convolution kernel side [default: 3]
    #[arg(long = "filter_size")]
    filter_size: Option<usize>,

    /// Experiment configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the seeded synthetic dataset instead of MNIST
    #[arg(long)]
    synthetic: bool,

    /// List persisted models and exit
    #[arg(long = "list_models")]
    list_models: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v and -q
    #[arg(long = "log_level", value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            output_path: self.output_path.clone(),
            input_path: self.input_path.clone(),
            learning_rate: self.learning_rate,
            num_filters: self.num_filters,
            batch_size: self.batch_size,
            epochs: self.epochs,
            run_id: self.run_id,
            filter_size: self.filter_size,
            synthetic: self.synthetic,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet, cli.log_level.as_deref());
    let _ = init_logging(&log_config);

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config.apply_overrides(&cli.overrides());
    config.validate().context("Invalid configuration")?;

    if cli.list_models {
        return list_models(&config);
    }

    print_banner();
    print_configuration(&config);

    std::fs::create_dir_all(&config.output.output_path)
        .context("Failed to create output directory")?;
    let config_path = config.output.output_path.join("experiment_config.toml");
    config.save(&config_path)?;
    info!("Configuration saved to: {}", config_path.display());

    let start = std::time::Instant::now();
    let report = match config.data.source {
        SourceKind::Mnist => {
            let source = MnistSource::new(&config.data.input_path)
                .with_validation_size(config.data.validation_size);
            run_sweep(source, config)?
        }
        SourceKind::Synthetic => {
            let source = config.data.synthetic.clone();
            run_sweep(source, config)?
        }
    };

    println!();
    println!("{}", "Sweep Complete!".green().bold());
    println!("  Runs:     {}", report.result_files.len());
    println!("  Charts:   {}", report.charts.len());
    println!("  Elapsed:  {}", format_duration(start.elapsed().as_secs_f64()));
    for path in &report.result_files {
        println!("  {}", path.display());
    }

    Ok(())
}

fn run_sweep<S: DataSource>(source: S, config: ExperimentConfig) -> Result<SweepReport> {
    let orchestrator = SweepOrchestrator::new(source, config);
    let report = orchestrator
        .run::<TrainingBackend>(&default_device())
        .context("Sweep aborted")?;
    Ok(report)
}

fn list_models(config: &ExperimentConfig) -> Result<()> {
    let store = CheckpointStore::new(config.models_dir());
    let descriptors = store.list()?;

    if descriptors.is_empty() {
        println!("No models in {}", store.models_dir().display());
        return Ok(());
    }

    println!("{}", format!("Models in {}", store.models_dir().display()).cyan().bold());
    for d in descriptors {
        let error = d
            .final_validation_error
            .map(|e| format!("{:.4}", e))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} | run {} | lr={} filters={} filter_size={} | {} params | val error {}",
            d.name.bold(),
            d.run_id,
            d.hyperparameters.learning_rate,
            d.hyperparameters.num_filters,
            d.hyperparameters.filter_size,
            d.num_parameters,
            error
        );
    }
    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔════════════════════════════════════════════════════════╗
 ║   convnet_sweep                                        ║
 ║   CNN training, checkpointing and sweeps with Burn     ║
 ╚════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn print_configuration(config: &ExperimentConfig) {
    let hp = &config.hyperparameters;
    println!("{}", "Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Run id:         {}", config.run_id);
    println!("  Learning rate:  {}", hp.learning_rate);
    println!("  Filters:        {}", hp.num_filters);
    println!("  Filter size:    {}", hp.filter_size);
    println!("  Batch size:     {}", hp.batch_size);
    println!("  Epochs:         {}", hp.epochs);
    println!("  Sweep LRs:      {:?}", config.sweep.learning_rates);
    println!("  Sweep filters:  {:?}", config.sweep.filter_sizes);
    println!("  Input:          {}", config.data.input_path.display());
    println!("  Output:         {}", config.output.output_path.display());
    println!();
}
