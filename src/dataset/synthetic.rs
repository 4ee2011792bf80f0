//! Seeded synthetic data source
//!
//! Each class lights up its own contiguous stripe of pixels on a noisy
//! background, so a small convnet can separate classes within a couple of
//! epochs. The same seed always yields the same splits.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{DataSource, DataSplits, DatasetSplit, ImageShape};
use crate::utils::error::{ExperimentError, Result};

/// Configuration of the generated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSource {
    pub n_train: usize,
    pub n_valid: usize,
    pub n_test: usize,
    pub height: usize,
    pub width: usize,
    pub num_classes: usize,
    /// Amplitude of the uniform background noise
    pub noise: f32,
    pub seed: u64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            n_train: 1000,
            n_valid: 200,
            n_test: 200,
            height: 28,
            width: 28,
            num_classes: 10,
            noise: 0.3,
            seed: 42,
        }
    }
}

impl SyntheticSource {
    /// Small dataset with the given image size and class count
    pub fn new(n_train: usize, height: usize, width: usize, num_classes: usize) -> Self {
        Self {
            n_train,
            n_valid: n_train / 2,
            n_test: n_train / 2,
            height,
            width,
            num_classes,
            ..Self::default()
        }
    }

    pub fn with_split_sizes(mut self, n_valid: usize, n_test: usize) -> Self {
        self.n_valid = n_valid;
        self.n_test = n_test;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn image_shape(&self) -> ImageShape {
        ImageShape::new(self.height, self.width, 1)
    }

    fn validate(&self) -> Result<()> {
        if self.num_classes < 2 {
            return Err(ExperimentError::InvalidInput(
                "synthetic data needs at least 2 classes".to_string(),
            ));
        }
        if self.height * self.width < self.num_classes {
            return Err(ExperimentError::InvalidInput(format!(
                "{}x{} images cannot hold a stripe for each of {} classes",
                self.height, self.width, self.num_classes
            )));
        }
        for (name, n) in [
            ("train", self.n_train),
            ("validation", self.n_valid),
            ("test", self.n_test),
        ] {
            // every class must appear so the one-hot width is the same in all splits
            if n < self.num_classes {
                return Err(ExperimentError::InvalidInput(format!(
                    "{} split of {} examples cannot cover {} classes",
                    name, n, self.num_classes
                )));
            }
        }
        Ok(())
    }

    fn generate(&self, n: usize, rng: &mut ChaCha8Rng) -> Result<DatasetSplit> {
        let pixels = self.height * self.width;
        let mut class_ids: Vec<usize> = (0..n).map(|i| i % self.num_classes).collect();
        class_ids.shuffle(rng);

        let mut features = Vec::with_capacity(n * pixels);
        for &class in &class_ids {
            for p in 0..pixels {
                let background = rng.gen::<f32>() * self.noise;
                let value = if p * self.num_classes / pixels == class {
                    1.0 - background
                } else {
                    background
                };
                features.push(value.clamp(0.0, 1.0));
            }
        }

        DatasetSplit::from_class_ids(features, &class_ids, self.image_shape())
    }
}

impl DataSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic ({} classes, {}, seed {})",
            self.num_classes,
            self.image_shape(),
            self.seed
        )
    }

    fn load(&self) -> Result<DataSplits> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        Ok(DataSplits {
            train: self.generate(self.n_train, &mut rng)?,
            valid: self.generate(self.n_valid, &mut rng)?,
            test: self.generate(self.n_test, &mut rng)?,
        })
    }
}
