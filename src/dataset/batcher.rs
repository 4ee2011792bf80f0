//! Mini-batch partitioning and tensor conversion
//!
//! Batches are contiguous index ranges taken in array order. There is no
//! shuffling, and a trailing remainder shorter than the batch size is dropped,
//! so the same split and batch size always give the same sequence of updates.

use std::ops::Range;

use burn::prelude::*;
use burn::tensor::TensorData;

use super::DatasetSplit;

/// Partition `train_size` examples into `train_size / batch_size` ranges of
/// exactly `batch_size` examples. `batch_size` must be at least 1.
pub fn partition(train_size: usize, batch_size: usize) -> Vec<Range<usize>> {
    let num_batches = train_size / batch_size;
    (0..num_batches)
        .map(|b| b * batch_size..(b + 1) * batch_size)
        .collect()
}

/// A batch ready for the model: images as `[N, C, H, W]`, one-hot targets as `[N, K]`
#[derive(Clone, Debug)]
pub struct SplitBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 2>,
}

/// Copy the examples in `range` onto `device`.
///
/// Splits store images channels-last; Burn convolutions expect channels-first,
/// so the image tensor is permuted after upload.
pub fn split_tensors<B: Backend>(
    split: &DatasetSplit,
    range: Range<usize>,
    device: &B::Device,
) -> SplitBatch<B> {
    let shape = split.image_shape();
    let n = range.end - range.start;
    let (features, labels) = split.rows(range);

    let images = Tensor::<B, 4>::from_data(
        TensorData::new(features.to_vec(), [n, shape.height, shape.width, shape.channels]),
        device,
    )
    .permute([0, 3, 1, 2]);

    let targets = Tensor::<B, 2>::from_data(
        TensorData::new(labels.to_vec(), [n, split.num_classes()]),
        device,
    );

    SplitBatch { images, targets }
}

/// Consecutive evaluation chunks covering every example (the last may be short)
pub fn eval_chunks(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect()
}
