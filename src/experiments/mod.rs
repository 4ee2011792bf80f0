//! Sweep orchestration
//!
//! A sweep is a fixed sequence of campaigns:
//!
//! 1. `results`: one run at the configured hyperparameters, written to
//!    `results_run_<run_id>.json`
//! 2. `results_learning_rates`: one run per learning rate in the grid
//! 3. `results_filters`: one run per filter size in the grid
//!
//! Sweep runs write `results_run_<i>.json` with `i` counting from 1. Every run
//! re-acquires its data, trains, persists, restores and evaluates on its own,
//! and its record goes straight to disk. Nothing carries over between runs
//! except the files already written.

pub mod config;

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::DataSource;
use crate::inference::Evaluator;
use crate::training::checkpoint::{artifact_name, ArtifactHandle, CheckpointStore};
use crate::training::{HyperParameters, LearningCurve, Trainer, TrainerConfig};
use crate::utils::charts::{generate_learning_curve_chart, CurveSeries};
use crate::utils::error::{ExperimentError, Result};

pub use config::ExperimentConfig;

const CHART_FILE: &str = "learning_curves.svg";

/// What a campaign varies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Baseline,
    LearningRate,
    FilterSize,
}

impl CampaignKind {
    fn series_label(&self, record: &ResultRecord) -> String {
        match self {
            CampaignKind::Baseline => format!("baseline (lr={})", record.lr),
            CampaignKind::LearningRate => format!("lr={}", record.lr),
            CampaignKind::FilterSize => format!("filter={}", record.filter_size),
        }
    }

    fn chart_title(&self) -> &'static str {
        match self {
            CampaignKind::Baseline => "Baseline validation error",
            CampaignKind::LearningRate => "Validation error by learning rate",
            CampaignKind::FilterSize => "Validation error by filter size",
        }
    }
}

/// One planned run of a campaign
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRun {
    /// `<k>` in `results_run_<k>.json`
    pub file_index: u64,
    pub hyperparameters: HyperParameters,
}

/// An ordered group of runs written to one output directory
#[derive(Debug, Clone)]
pub struct Campaign {
    pub name: String,
    pub kind: CampaignKind,
    pub runs: Vec<PlannedRun>,
    /// When false the result file is created empty
    pub write_records: bool,
}

impl Campaign {
    pub fn dir(&self, output_path: &Path) -> PathBuf {
        output_path.join(&self.name)
    }

    pub fn result_path(&self, output_path: &Path, file_index: u64) -> PathBuf {
        self.dir(output_path)
            .join(format!("results_run_{}.json", file_index))
    }
}

/// The full sequence of campaigns for one sweep
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub campaigns: Vec<Campaign>,
}

impl SweepPlan {
    /// Baseline, then the learning-rate grid, then the filter-size grid. Every
    /// grid run starts from `base` and changes only its own hyperparameter.
    pub fn standard(config: &ExperimentConfig) -> Self {
        let base = config.hyperparameters;

        let baseline = Campaign {
            name: "results".to_string(),
            kind: CampaignKind::Baseline,
            runs: vec![PlannedRun {
                file_index: config.run_id,
                hyperparameters: base,
            }],
            write_records: config.output.write_baseline,
        };

        let learning_rates = Campaign {
            name: "results_learning_rates".to_string(),
            kind: CampaignKind::LearningRate,
            runs: config
                .sweep
                .learning_rates
                .iter()
                .enumerate()
                .map(|(i, &lr)| PlannedRun {
                    file_index: i as u64 + 1,
                    hyperparameters: base.with_learning_rate(lr),
                })
                .collect(),
            write_records: true,
        };

        let filters = Campaign {
            name: "results_filters".to_string(),
            kind: CampaignKind::FilterSize,
            runs: config
                .sweep
                .filter_sizes
                .iter()
                .enumerate()
                .map(|(i, &fs)| PlannedRun {
                    file_index: i as u64 + 1,
                    hyperparameters: base.with_filter_size(fs),
                })
                .collect(),
            write_records: true,
        };

        Self {
            campaigns: vec![baseline, learning_rates, filters],
        }
    }

    pub fn total_runs(&self) -> usize {
        self.campaigns.iter().map(|c| c.runs.len()).sum()
    }
}

/// Outcome of one run, as written to its result file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub lr: f64,
    pub num_filters: usize,
    pub batch_size: usize,
    pub filter_size: usize,
    pub learning_curve: LearningCurve,
    pub test_error: f64,
}

impl ResultRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Identity of a run inside a sweep
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: u64,
    pub campaign: &'a str,
    pub index: u64,
}

/// Load fresh data, train, persist, restore and evaluate one configuration.
///
/// The model is dropped after it is saved; the test error comes from the
/// restored artifact on the non-autodiff backend.
pub fn run_configuration<B: AutodiffBackend, S: DataSource + ?Sized>(
    source: &S,
    hyperparameters: HyperParameters,
    store: &CheckpointStore,
    context: RunContext<'_>,
    trainer_config: &TrainerConfig,
    device: &B::Device,
) -> Result<(ResultRecord, ArtifactHandle)> {
    let splits = source.load()?;
    splits.ensure_consistent()?;
    info!(
        "{} train / {} validation / {} test examples from {}",
        splits.train.len(),
        splits.valid.len(),
        splits.test.len(),
        source.describe()
    );

    let trained = Trainer::<B>::new(
        hyperparameters,
        &splits.train,
        trainer_config.clone(),
        device.clone(),
    )?
    .fit(&splits)?;

    let handle = store.save(
        &trained,
        context.run_id,
        context.campaign,
        &artifact_name(context.campaign, context.run_id, context.index as usize),
    )?;
    let learning_curve = trained.learning_curve.clone();
    drop(trained);

    let evaluator = Evaluator::<B::InnerBackend>::new(store.clone(), device.clone())
        .with_chunk_size(trainer_config.eval_batch_size);
    let test_error = evaluator.evaluate(&handle, &splits.test)?;

    let record = ResultRecord {
        lr: hyperparameters.learning_rate,
        num_filters: hyperparameters.num_filters,
        batch_size: hyperparameters.batch_size,
        filter_size: hyperparameters.filter_size,
        learning_curve,
        test_error,
    };
    Ok((record, handle))
}

/// Files produced by a sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub result_files: Vec<PathBuf>,
    pub artifacts: Vec<String>,
    pub charts: Vec<PathBuf>,
}

/// Runs every campaign of a plan against one data source
pub struct SweepOrchestrator<S: DataSource> {
    source: S,
    config: ExperimentConfig,
    store: CheckpointStore,
}

impl<S: DataSource> SweepOrchestrator<S> {
    pub fn new(source: S, config: ExperimentConfig) -> Self {
        let store = CheckpointStore::new(config.models_dir());
        Self {
            source,
            config,
            store,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run the standard plan
    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<SweepReport> {
        self.config.validate()?;
        let plan = SweepPlan::standard(&self.config);
        info!(
            "Sweep {} over {}: {} runs in {} campaigns",
            self.config.run_id,
            self.source.describe(),
            plan.total_runs(),
            plan.campaigns.len()
        );

        let mut report = SweepReport::default();
        for campaign in &plan.campaigns {
            self.run_campaign::<B>(campaign, device, &mut report)?;
        }
        Ok(report)
    }

    /// Run every configuration of `campaign` in order, writing each record
    /// before starting the next run.
    pub fn run_campaign<B: AutodiffBackend>(
        &self,
        campaign: &Campaign,
        device: &B::Device,
        report: &mut SweepReport,
    ) -> Result<()> {
        let output_path = &self.config.output.output_path;
        fs::create_dir_all(campaign.dir(output_path))?;
        println!("{}", format!("Campaign {}", campaign.name).cyan().bold());

        let trainer_config = self.config.trainer_config();
        for run in &campaign.runs {
            let hp = run.hyperparameters;
            info!(
                "[{}] run {}: lr={} filters={} filter_size={} batch_size={} epochs={}",
                campaign.name,
                run.file_index,
                hp.learning_rate,
                hp.num_filters,
                hp.filter_size,
                hp.batch_size,
                hp.epochs
            );

            let context = RunContext {
                run_id: self.config.run_id,
                campaign: &campaign.name,
                index: run.file_index,
            };
            let (record, handle) = run_configuration::<B, S>(
                &self.source,
                hp,
                &self.store,
                context,
                &trainer_config,
                device,
            )?;

            let path = campaign.result_path(output_path, run.file_index);
            write_record(&path, &record, campaign.write_records)?;

            println!(
                "  {} {} test error {:.4} -> {}",
                "✓".green(),
                handle.name(),
                record.test_error,
                path.display()
            );
            report.result_files.push(path);
            report.artifacts.push(handle.name().to_string());
        }

        if self.config.output.charts {
            if let Some(chart) = chart_campaign(campaign, output_path)? {
                report.charts.push(chart);
            }
        }
        Ok(())
    }
}

/// Write one record, or an empty file when `full` is false
pub fn write_record(path: &Path, record: &ResultRecord, full: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = if full {
        serde_json::to_string_pretty(record)?
    } else {
        String::new()
    };
    fs::write(path, content)?;
    Ok(())
}

/// Every non-empty `results_run_<k>.json` in `dir`, ordered by `k`
pub fn read_campaign_records(dir: &Path) -> Result<Vec<(u64, ResultRecord)>> {
    let mut records = Vec::new();
    if !dir.exists() {
        return Ok(records);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(index) = path
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(|f| f.strip_prefix("results_run_"))
            .and_then(|f| f.strip_suffix(".json"))
            .and_then(|k| k.parse::<u64>().ok())
        else {
            continue;
        };
        if fs::metadata(&path)?.len() == 0 {
            continue;
        }
        records.push((index, ResultRecord::load(&path)?));
    }

    records.sort_by_key(|(index, _)| *index);
    Ok(records)
}

/// Re-read a campaign's result files and draw their learning curves
fn chart_campaign(campaign: &Campaign, output_path: &Path) -> Result<Option<PathBuf>> {
    let dir = campaign.dir(output_path);
    // files left by earlier sweeps with other indices are not part of this chart
    let records: Vec<(u64, ResultRecord)> = read_campaign_records(&dir)?
        .into_iter()
        .filter(|(index, _)| campaign.runs.iter().any(|run| run.file_index == *index))
        .collect();
    if records.is_empty() {
        warn!("No records to chart in {}", dir.display());
        return Ok(None);
    }

    let series: Vec<CurveSeries> = records
        .iter()
        .enumerate()
        .map(|(i, (_, record))| {
            CurveSeries::new(
                campaign.kind.series_label(record),
                record.learning_curve.as_slice().to_vec(),
                i,
            )
        })
        .collect();

    let chart_path = dir.join(CHART_FILE);
    generate_learning_curve_chart(campaign.kind.chart_title(), &series, &chart_path)
        .map_err(ExperimentError::Io)?;
    info!("Chart saved to {}", chart_path.display());
    Ok(Some(chart_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(lr: f64, filter_size: usize) -> ResultRecord {
        ResultRecord {
            lr,
            num_filters: 16,
            batch_size: 128,
            filter_size,
            learning_curve: LearningCurve::from(vec![0.4, 0.3]),
            test_error: 0.25,
        }
    }

    #[test]
    fn test_standard_plan_order_and_grids() {
        let mut config = ExperimentConfig::default();
        config.run_id = 5;
        let plan = SweepPlan::standard(&config);

        let names: Vec<&str> = plan.campaigns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["results", "results_learning_rates", "results_filters"]);
        assert_eq!(plan.total_runs(), 9);

        let baseline = &plan.campaigns[0];
        assert_eq!(baseline.runs.len(), 1);
        assert_eq!(baseline.runs[0].file_index, 5);

        let lrs: Vec<f64> = plan.campaigns[1]
            .runs
            .iter()
            .map(|r| r.hyperparameters.learning_rate)
            .collect();
        assert_eq!(lrs, vec![0.1, 0.01, 0.001, 0.0001]);
        let indices: Vec<u64> = plan.campaigns[1].runs.iter().map(|r| r.file_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);

        // filter sweep keeps the base learning rate
        for (run, fs) in plan.campaigns[2].runs.iter().zip([1, 3, 5, 7]) {
            assert_eq!(run.hyperparameters.filter_size, fs);
            assert_eq!(run.hyperparameters.learning_rate, 1e-3);
        }
    }

    #[test]
    fn test_result_record_keys() {
        let json = serde_json::to_value(record(0.01, 3)).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["batch_size", "filter_size", "learning_curve", "lr", "num_filters", "test_error"]
        );
        assert_eq!(json["learning_curve"], serde_json::json!([0.4, 0.3]));
    }

    #[test]
    fn test_baseline_can_be_written_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("results_run_0.json");

        write_record(&path, &record(0.001, 3), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        write_record(&path, &record(0.001, 3), true).unwrap();
        assert_eq!(ResultRecord::load(&path).unwrap(), record(0.001, 3));
    }

    #[test]
    fn test_read_campaign_records_skips_empty_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        write_record(&dir.path().join("results_run_2.json"), &record(0.01, 3), true).unwrap();
        write_record(&dir.path().join("results_run_1.json"), &record(0.1, 3), true).unwrap();
        write_record(&dir.path().join("results_run_3.json"), &record(0.001, 3), false).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let records = read_campaign_records(dir.path()).unwrap();
        let indices: Vec<u64> = records.iter().map(|(k, _)| *k).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(records[0].1.lr, 0.1);
    }

    #[test]
    fn test_chart_written_from_disk_records() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HyperParameters::default();
        let campaign = Campaign {
            name: "results_filters".to_string(),
            kind: CampaignKind::FilterSize,
            runs: vec![
                PlannedRun {
                    file_index: 1,
                    hyperparameters: hp.with_filter_size(1),
                },
                PlannedRun {
                    file_index: 2,
                    hyperparameters: hp.with_filter_size(3),
                },
            ],
            write_records: true,
        };
        let campaign_dir = campaign.dir(dir.path());
        write_record(&campaign.result_path(dir.path(), 1), &record(0.001, 1), true).unwrap();
        write_record(&campaign.result_path(dir.path(), 2), &record(0.001, 3), true).unwrap();

        let chart = chart_campaign(&campaign, dir.path()).unwrap().unwrap();
        assert_eq!(chart, campaign_dir.join(CHART_FILE));
        let svg = fs::read_to_string(chart).unwrap();
        assert!(svg.contains("filter=1"));
        assert!(svg.contains("filter=3"));
    }

    #[test]
    fn test_baseline_chart_ignores_other_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let campaign = Campaign {
            name: "results".to_string(),
            kind: CampaignKind::Baseline,
            runs: vec![PlannedRun {
                file_index: 3,
                hyperparameters: HyperParameters::default(),
            }],
            write_records: true,
        };
        // an earlier sweep with run_id 0 left its baseline in the same directory
        write_record(&campaign.result_path(dir.path(), 0), &record(0.5, 3), true).unwrap();
        write_record(&campaign.result_path(dir.path(), 3), &record(0.001, 3), true).unwrap();

        let chart = chart_campaign(&campaign, dir.path()).unwrap().unwrap();
        let svg = fs::read_to_string(chart).unwrap();
        assert!(svg.contains("baseline (lr=0.001)"));
        assert!(!svg.contains("lr=0.5"));
    }

    #[test]
    fn test_no_chart_when_only_foreign_records() {
        let dir = tempfile::tempdir().unwrap();
        let campaign = Campaign {
            name: "results".to_string(),
            kind: CampaignKind::Baseline,
            runs: vec![PlannedRun {
                file_index: 3,
                hyperparameters: HyperParameters::default(),
            }],
            write_records: true,
        };
        write_record(&campaign.result_path(dir.path(), 0), &record(0.5, 3), true).unwrap();
        assert!(chart_campaign(&campaign, dir.path()).unwrap().is_none());
    }
}
