//! End-to-end runs on small synthetic data

use std::fs;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

use convnet_sweep::dataset::SyntheticSource;
use convnet_sweep::experiments::config::ExperimentConfig;
use convnet_sweep::experiments::{
    read_campaign_records, run_configuration, ResultRecord, RunContext, SweepOrchestrator,
    SweepPlan, SweepReport,
};
use convnet_sweep::training::{CheckpointStore, HyperParameters, TrainerConfig};
use convnet_sweep::ExperimentError;

type TestBackend = Autodiff<NdArray>;

fn tiny_source() -> SyntheticSource {
    SyntheticSource::new(20, 8, 8, 2).with_split_sizes(10, 10)
}

fn tiny_hyperparameters() -> HyperParameters {
    HyperParameters {
        learning_rate: 0.01,
        num_filters: 4,
        filter_size: 3,
        batch_size: 5,
        epochs: 2,
    }
}

fn tiny_config(output: &std::path::Path) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.hyperparameters = tiny_hyperparameters();
    config.output.output_path = output.to_path_buf();
    config.data.eval_batch_size = 4;
    config
}

#[test]
fn single_run_produces_bounded_curve_and_test_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("models"));
    let context = RunContext {
        run_id: 0,
        campaign: "results",
        index: 0,
    };

    let (record, handle) = run_configuration::<TestBackend, _>(
        &tiny_source(),
        tiny_hyperparameters(),
        &store,
        context,
        &TrainerConfig::default(),
        &Default::default(),
    )
    .unwrap();

    assert_eq!(record.learning_curve.len(), 2);
    assert!(record
        .learning_curve
        .as_slice()
        .iter()
        .all(|e| (0.0..=1.0).contains(e)));
    assert!((0.0..=1.0).contains(&record.test_error));
    assert_eq!(record.batch_size, 5);

    // the artifact resolves from its name alone
    assert!(store.resolve(handle.name()).is_ok());
}

#[test]
fn learning_rate_campaign_writes_one_file_per_rate() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    let plan = SweepPlan::standard(&config);
    let orchestrator = SweepOrchestrator::new(tiny_source(), config);

    let campaign = &plan.campaigns[1];
    let mut report = SweepReport::default();
    orchestrator
        .run_campaign::<TestBackend>(campaign, &Default::default(), &mut report)
        .unwrap();

    let campaign_dir = dir.path().join("results_learning_rates");
    let result_files: Vec<_> = fs::read_dir(&campaign_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("results_run_"))
        .collect();
    assert_eq!(result_files.len(), 4);

    let records = read_campaign_records(&campaign_dir).unwrap();
    let rates: Vec<f64> = records.iter().map(|(_, r)| r.lr).collect();
    assert_eq!(rates, vec![0.1, 0.01, 0.001, 0.0001]);
    for (i, (index, record)) in records.iter().enumerate() {
        assert_eq!(*index, i as u64 + 1);
        assert_eq!(record.learning_curve.len(), 2);
    }

    assert!(campaign_dir.join("learning_curves.svg").is_file());
    assert_eq!(report.artifacts.len(), 4);
}

#[test]
fn full_sweep_writes_every_campaign() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.run_id = 3;
    config.hyperparameters.epochs = 1;
    config.output.write_baseline = false;

    let orchestrator = SweepOrchestrator::new(tiny_source(), config);
    let report = orchestrator.run::<TestBackend>(&Default::default()).unwrap();
    assert_eq!(report.result_files.len(), 9);

    // baseline file exists but is empty
    let baseline = dir.path().join("results").join("results_run_3.json");
    assert_eq!(fs::read_to_string(&baseline).unwrap(), "");

    for k in 1..=4 {
        let path = dir
            .path()
            .join("results_filters")
            .join(format!("results_run_{}.json", k));
        let record = ResultRecord::load(&path).unwrap();
        assert_eq!(record.filter_size, [1, 3, 5, 7][k - 1]);
        assert_eq!(record.learning_curve.len(), 1);
    }

    // one persisted model per run, every name distinct
    let descriptors = orchestrator.store().list().unwrap();
    assert_eq!(descriptors.len(), 9);
    assert!(descriptors.iter().all(|d| d.run_id == 3));
}

#[test]
fn diverging_run_aborts_campaign_and_keeps_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.sweep.learning_rates = vec![0.01, 1e30];
    let plan = SweepPlan::standard(&config);
    let orchestrator = SweepOrchestrator::new(tiny_source(), config);

    let campaign = &plan.campaigns[1];
    assert_eq!(campaign.runs.len(), 2);
    let mut report = SweepReport::default();
    let err = orchestrator
        .run_campaign::<TestBackend>(campaign, &Default::default(), &mut report)
        .unwrap_err();
    assert!(matches!(err, ExperimentError::ComputationFailure(_)));

    // the first run's file survives, nothing is written for the failed run
    let campaign_dir = dir.path().join("results_learning_rates");
    let mut files: Vec<String> = fs::read_dir(&campaign_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["results_run_1.json".to_string()]);
    assert_eq!(report.result_files.len(), 1);
}
