//! Evaluator
//!
//! Rebuilds a classifier from a checkpoint and computes `1 - accuracy` over a
//! full test split, using the metric recorded in the artifact's descriptor.

use burn::tensor::backend::Backend;
use tracing::info;

use crate::dataset::DatasetSplit;
use crate::training::checkpoint::{ArtifactHandle, CheckpointStore, Metric, RestoredModel};
use crate::training::metrics::validation_error;
use crate::utils::error::{ExperimentError, Result};

/// Scores persisted models on backend `B`
pub struct Evaluator<B: Backend> {
    store: CheckpointStore,
    device: B::Device,
    chunk_size: usize,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(store: CheckpointStore, device: B::Device) -> Self {
        Self {
            store,
            device,
            chunk_size: 1000,
        }
    }

    /// Examples per forward pass
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Restore the model behind `handle` and return its error on `test`
    pub fn evaluate(&self, handle: &ArtifactHandle, test: &DatasetSplit) -> Result<f64> {
        let restored = self.store.load::<B>(handle, &self.device)?;
        let error = self.evaluate_restored(&restored, test)?;
        info!("test error for {}: {:.4}", handle.name(), error);
        Ok(error)
    }

    /// Look the artifact up by name, then evaluate it
    pub fn evaluate_by_name(&self, name: &str, test: &DatasetSplit) -> Result<f64> {
        let handle = self.store.resolve(name)?;
        self.evaluate(&handle, test)
    }

    pub fn evaluate_restored(&self, restored: &RestoredModel<B>, test: &DatasetSplit) -> Result<f64> {
        let descriptor = &restored.descriptor;
        if test.image_shape() != descriptor.input {
            return Err(ExperimentError::ShapeMismatch(format!(
                "test images are {} but {} expects {}",
                test.image_shape(),
                descriptor.name,
                descriptor.input
            )));
        }
        if test.num_classes() != descriptor.num_classes {
            return Err(ExperimentError::ShapeMismatch(format!(
                "test split has {} classes but {} predicts {}",
                test.num_classes(),
                descriptor.name,
                descriptor.num_classes
            )));
        }

        match descriptor.metric {
            Metric::ArgmaxAccuracy => {
                validation_error(&restored.model, test, self.chunk_size, &self.device)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataSource, SyntheticSource};
    use crate::training::{HyperParameters, Trainer, TrainerConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    fn saved_model(store: &CheckpointStore) -> (ArtifactHandle, crate::dataset::DataSplits) {
        let splits = SyntheticSource::new(20, 8, 8, 2).load().unwrap();
        let hp = HyperParameters {
            learning_rate: 0.01,
            num_filters: 4,
            filter_size: 3,
            batch_size: 5,
            epochs: 1,
        };
        let trained = Trainer::<Autodiff<NdArray>>::new(
            hp,
            &splits.train,
            TrainerConfig::default(),
            Default::default(),
        )
        .unwrap()
        .fit(&splits)
        .unwrap();
        (store.save(&trained, 0, "results", "eval").unwrap(), splits)
    }

    #[test]
    fn test_evaluate_returns_error_rate() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (handle, splits) = saved_model(&store);

        let evaluator = Evaluator::<NdArray>::new(store, Default::default()).with_chunk_size(3);
        let error = evaluator.evaluate(&handle, &splits.test).unwrap();
        assert!((0.0..=1.0).contains(&error));

        let by_name = evaluator.evaluate_by_name(handle.name(), &splits.test).unwrap();
        assert!((error - by_name).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (handle, _) = saved_model(&store);

        let other = SyntheticSource::new(10, 12, 12, 2).load().unwrap();
        let evaluator = Evaluator::<NdArray>::new(store, Default::default());
        assert!(matches!(
            evaluator.evaluate(&handle, &other.test),
            Err(ExperimentError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_artifact_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let splits = SyntheticSource::new(10, 8, 8, 2).load().unwrap();
        let evaluator = Evaluator::<NdArray>::new(CheckpointStore::new(dir.path()), Default::default());
        assert!(matches!(
            evaluator.evaluate_by_name("never_saved", &splits.test),
            Err(ExperimentError::ArtifactNotFound(_))
        ));
    }
}
