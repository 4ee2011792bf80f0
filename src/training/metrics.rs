//! Loss and accuracy definitions
//!
//! The same accuracy definition is used for per-epoch validation and for the
//! test-time evaluation of a restored model.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use super::LOSS_SCALE;
use crate::dataset::batcher::{eval_chunks, split_tensors};
use crate::dataset::DatasetSplit;
use crate::model::Classifier;
use crate::utils::error::{ExperimentError, Result};

/// Mean elementwise sigmoid cross-entropy between logits and one-hot targets,
/// scaled by `LOSS_SCALE`.
///
/// Uses the stable form `max(x, 0) - x * z + ln(1 + exp(-|x|))`.
pub fn sigmoid_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let positive = logits.clone().clamp_min(0.0);
    let agreement = logits.clone() * targets;
    let softplus = logits.abs().neg().exp().log1p();

    (positive - agreement + softplus).mean().mul_scalar(LOSS_SCALE)
}

/// Number of rows where the predicted class matches the label's class
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> usize {
    let predicted = logits.argmax(1);
    let expected = targets.argmax(1);
    let correct: i64 = predicted
        .equal(expected)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// `1 - accuracy` of `model` over every example of `split`, evaluated in
/// chunks of `chunk_size`.
pub fn validation_error<B: Backend>(
    model: &Classifier<B>,
    split: &DatasetSplit,
    chunk_size: usize,
    device: &B::Device,
) -> Result<f64> {
    if split.is_empty() {
        return Err(ExperimentError::InvalidInput(
            "cannot compute an error rate over an empty split".to_string(),
        ));
    }
    if split.num_classes() != model.num_classes() {
        return Err(ExperimentError::ShapeMismatch(format!(
            "split has {} classes but the model predicts {}",
            split.num_classes(),
            model.num_classes()
        )));
    }

    let mut correct = 0usize;
    for range in eval_chunks(split.len(), chunk_size) {
        let batch = split_tensors::<B>(split, range, device);
        let logits = model.forward(batch.images);
        correct += correct_predictions(logits, batch.targets);
    }

    Ok(1.0 - correct as f64 / split.len() as f64)
}
