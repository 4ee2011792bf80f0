//! Dataset module
//!
//! This module provides:
//! - In-memory train/validation/test splits of `[N, H, W, C]` images with one-hot labels
//! - The `DataSource` trait the sweep re-acquires data through on every run
//! - Deterministic mini-batch partitioning and tensor conversion
//! - MNIST (downloaded on demand) and seeded synthetic sources

pub mod batcher;
pub mod mnist;
pub mod synthetic;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ExperimentError, Result};

pub use batcher::{partition, split_tensors};
pub use mnist::MnistSource;
pub use synthetic::SyntheticSource;

/// Spatial layout of one image (height, width, channels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of f32 values per image
    pub fn values(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// One split: row-major `[N, H, W, C]` features and `[N, K]` one-hot labels
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    features: Vec<f32>,
    labels: Vec<f32>,
    len: usize,
    image_shape: ImageShape,
    num_classes: usize,
}

impl DatasetSplit {
    /// Build a split from flat features and flat one-hot labels, validating
    /// that N agrees across both and that every label row is one-hot.
    pub fn new(
        features: Vec<f32>,
        labels: Vec<f32>,
        image_shape: ImageShape,
        num_classes: usize,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(ExperimentError::InvalidInput(
                "a split needs at least one class".to_string(),
            ));
        }
        if image_shape.values() == 0 {
            return Err(ExperimentError::InvalidInput(format!(
                "degenerate image shape {}",
                image_shape
            )));
        }
        if labels.len() % num_classes != 0 {
            return Err(ExperimentError::ShapeMismatch(format!(
                "{} label values do not form rows of {} classes",
                labels.len(),
                num_classes
            )));
        }

        let len = labels.len() / num_classes;
        if features.len() != len * image_shape.values() {
            return Err(ExperimentError::ShapeMismatch(format!(
                "{} labels but {} feature values (expected {} for {} images of {})",
                len,
                features.len(),
                len * image_shape.values(),
                len,
                image_shape
            )));
        }

        for (row_idx, row) in labels.chunks(num_classes).enumerate() {
            let ones = row.iter().filter(|&&v| v == 1.0).count();
            let zeros = row.iter().filter(|&&v| v == 0.0).count();
            if ones != 1 || ones + zeros != num_classes {
                return Err(ExperimentError::InvalidInput(format!(
                    "label row {} is not one-hot",
                    row_idx
                )));
            }
        }

        Ok(Self {
            features,
            labels,
            len,
            image_shape,
            num_classes,
        })
    }

    /// Build a split from integer class ids, one-hot encoding them
    pub fn from_class_ids(
        features: Vec<f32>,
        class_ids: &[usize],
        image_shape: ImageShape,
    ) -> Result<Self> {
        let (labels, num_classes) = one_hot(class_ids);
        Self::new(features, labels, image_shape, num_classes)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn image_shape(&self) -> ImageShape {
        self.image_shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Features and labels of the examples in `range`
    pub fn rows(&self, range: Range<usize>) -> (&[f32], &[f32]) {
        let px = self.image_shape.values();
        let k = self.num_classes;
        (
            &self.features[range.start * px..range.end * px],
            &self.labels[range.start * k..range.end * k],
        )
    }

    /// Class id of every example (argmax of its label row)
    pub fn class_ids(&self) -> Vec<usize> {
        argmax_rows(&self.labels, self.num_classes)
    }
}

/// Train, validation and test splits as handed out by a `DataSource`
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub train: DatasetSplit,
    pub valid: DatasetSplit,
    pub test: DatasetSplit,
}

impl DataSplits {
    /// All three splits must share image shape and class count
    pub fn ensure_consistent(&self) -> Result<()> {
        for (name, split) in [("validation", &self.valid), ("test", &self.test)] {
            if split.image_shape() != self.train.image_shape() {
                return Err(ExperimentError::ShapeMismatch(format!(
                    "{} images are {} but training images are {}",
                    name,
                    split.image_shape(),
                    self.train.image_shape()
                )));
            }
            if split.num_classes() != self.train.num_classes() {
                return Err(ExperimentError::ShapeMismatch(format!(
                    "{} split has {} classes but training split has {}",
                    name,
                    split.num_classes(),
                    self.train.num_classes()
                )));
            }
        }
        Ok(())
    }
}

/// Supplier of fresh dataset splits. Called once per sweep run.
pub trait DataSource {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Acquire the train/validation/test splits
    fn load(&self) -> Result<DataSplits>;
}

/// One-hot encode class ids.
///
/// Columns follow the distinct class ids in ascending order, so `K` is the
/// number of distinct ids: `[0, 2, 1]` becomes `[[1,0,0],[0,0,1],[0,1,0]]`.
pub fn one_hot(class_ids: &[usize]) -> (Vec<f32>, usize) {
    let mut classes: Vec<usize> = class_ids.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let k = classes.len();
    let mut encoded = vec![0.0f32; class_ids.len() * k];
    for (row, id) in class_ids.iter().enumerate() {
        // ids come from `classes`, so the search always hits
        if let Ok(col) = classes.binary_search(id) {
            encoded[row * k + col] = 1.0;
        }
    }
    (encoded, k)
}

/// Index of the largest value in each row of a row-major matrix.
/// Ties resolve to the first index.
pub fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    if cols == 0 {
        return Vec::new();
    }
    values
        .chunks(cols)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
                    if v > best_v {
                        (i, v)
                    } else {
                        (best_i, best_v)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_example() {
        let (encoded, k) = one_hot(&[0, 2, 1]);
        assert_eq!(k, 3);
        assert_eq!(
            encoded,
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_one_hot_argmax_round_trip() {
        let label_sets: Vec<Vec<usize>> = vec![
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            vec![3, 3, 1, 0, 2, 1],
            vec![9, 0, 5, 5, 2, 7, 1, 3, 4, 6, 8],
        ];
        for labels in label_sets {
            let (encoded, k) = one_hot(&labels);
            assert_eq!(argmax_rows(&encoded, k), labels);
        }
    }

    #[test]
    fn test_one_hot_columns_follow_ascending_class_ids() {
        // classes 1 and 4 only: column 0 is class 1, column 1 is class 4
        let (encoded, k) = one_hot(&[4, 1, 4]);
        assert_eq!(k, 2);
        assert_eq!(encoded, vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_split_rejects_mismatched_counts() {
        let shape = ImageShape::new(2, 2, 1);
        // 3 labels but features for 2 images
        let err = DatasetSplit::from_class_ids(vec![0.0; 8], &[0, 1, 0], shape).unwrap_err();
        assert!(matches!(err, ExperimentError::ShapeMismatch(_)));
    }

    #[test]
    fn test_split_rejects_non_one_hot_rows() {
        let shape = ImageShape::new(1, 1, 1);
        let err = DatasetSplit::new(vec![0.0, 0.0], vec![1.0, 1.0, 0.0, 1.0], shape, 2)
            .unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }

    #[test]
    fn test_split_rows() {
        let shape = ImageShape::new(1, 2, 1);
        let features = vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1];
        let split = DatasetSplit::from_class_ids(features, &[0, 1, 0], shape).unwrap();

        assert_eq!(split.len(), 3);
        let (x, y) = split.rows(1..3);
        assert_eq!(x, &[1.0, 1.1, 2.0, 2.1]);
        assert_eq!(y, &[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(split.class_ids(), vec![0, 1, 0]);
    }

    #[test]
    fn test_inconsistent_splits_detected() {
        let small = ImageShape::new(1, 1, 1);
        let train = DatasetSplit::from_class_ids(vec![0.0, 1.0], &[0, 1], small).unwrap();
        let valid = train.clone();
        let test = DatasetSplit::from_class_ids(vec![0.0, 1.0, 2.0], &[0, 1, 2], small).unwrap();

        let splits = DataSplits { train, valid, test };
        assert!(matches!(
            splits.ensure_consistent(),
            Err(ExperimentError::ShapeMismatch(_))
        ));
    }
}
