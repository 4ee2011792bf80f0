//! MNIST data source
//!
//! Reads the four gzip'd IDX files from a data directory, downloading any
//! that are missing. The 60 000 training images are split into 50 000 for
//! training and the final 10 000 for validation; the 10 000 `t10k` images are
//! the test split. Pixels are scaled to [0, 1] and images are `28x28x1`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::info;

use super::{DataSource, DataSplits, DatasetSplit, ImageShape};
use crate::utils::error::{ExperimentError, Result};

/// Public mirror of the MNIST files
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";

/// Validation examples carved off the end of the training file
pub const DEFAULT_VALIDATION_SIZE: usize = 10_000;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte.gz";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte.gz";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
const IDX_LABELS_MAGIC: u32 = 0x0000_0801;

/// MNIST loader rooted at a data directory
#[derive(Debug, Clone)]
pub struct MnistSource {
    data_dir: PathBuf,
    base_url: String,
    validation_size: usize,
    download: bool,
}

impl MnistSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            validation_size: DEFAULT_VALIDATION_SIZE,
            download: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_validation_size(mut self, validation_size: usize) -> Self {
        self.validation_size = validation_size;
        self
    }

    /// Disable fetching; missing files then fail with `DataUnavailable`
    pub fn offline(mut self) -> Self {
        self.download = false;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Make sure every file is present, downloading the missing ones
    pub fn ensure_files(&self) -> Result<()> {
        for file in [TRAIN_IMAGES, TRAIN_LABELS, TEST_IMAGES, TEST_LABELS] {
            let path = self.data_dir.join(file);
            if path.exists() {
                continue;
            }
            if !self.download {
                return Err(ExperimentError::DataUnavailable(format!(
                    "{} is missing and downloading is disabled",
                    path.display()
                )));
            }
            self.download_file(file, &path)?;
        }
        Ok(())
    }

    fn download_file(&self, file: &str, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let url = format!("{}{}", self.base_url, file);
        info!("... downloading {} from {}", file, url);

        let bytes = reqwest::blocking::get(&url)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(|e| {
                ExperimentError::DataUnavailable(format!("failed to download {}: {}", url, e))
            })?;

        // write to a temporary name so an interrupted download is never mistaken for data
        let partial = path.with_extension("part");
        let mut out = File::create(&partial)?;
        out.write_all(&bytes)?;
        fs::rename(&partial, path)?;
        Ok(())
    }
}

impl DataSource for MnistSource {
    fn describe(&self) -> String {
        format!("MNIST ({})", self.data_dir.display())
    }

    fn load(&self) -> Result<DataSplits> {
        self.ensure_files()?;
        info!("... loading data");

        let (train_x, shape, train_n) = parse_idx_images(&read_gz(&self.data_dir.join(TRAIN_IMAGES))?)?;
        let train_y = parse_idx_labels(&read_gz(&self.data_dir.join(TRAIN_LABELS))?)?;
        let (test_x, test_shape, test_n) = parse_idx_images(&read_gz(&self.data_dir.join(TEST_IMAGES))?)?;
        let test_y = parse_idx_labels(&read_gz(&self.data_dir.join(TEST_LABELS))?)?;

        if train_y.len() != train_n || test_y.len() != test_n {
            return Err(ExperimentError::ShapeMismatch(format!(
                "image/label counts differ: train {}/{}, test {}/{}",
                train_n,
                train_y.len(),
                test_n,
                test_y.len()
            )));
        }
        if self.validation_size >= train_n {
            return Err(ExperimentError::InvalidInput(format!(
                "validation size {} leaves no training images out of {}",
                self.validation_size, train_n
            )));
        }

        let cut = train_n - self.validation_size;
        let px = shape.values();
        let (fit_x, valid_x) = train_x.split_at(cut * px);
        let (fit_y, valid_y) = train_y.split_at(cut);

        let splits = DataSplits {
            train: DatasetSplit::from_class_ids(fit_x.to_vec(), fit_y, shape)?,
            valid: DatasetSplit::from_class_ids(valid_x.to_vec(), valid_y, shape)?,
            test: DatasetSplit::from_class_ids(test_x, &test_y, test_shape)?,
        };
        info!("... done loading data");
        Ok(splits)
    }
}

fn read_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| {
        ExperimentError::DataUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut bytes = Vec::new();
    GzDecoder::new(file).read_to_end(&mut bytes).map_err(|e| {
        ExperimentError::DataUnavailable(format!("cannot decompress {}: {}", path.display(), e))
    })?;
    Ok(bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ExperimentError::DataUnavailable("truncated IDX header".to_string()))
}

/// Decode an IDX3 image file into normalized channels-last pixels
pub fn parse_idx_images(bytes: &[u8]) -> Result<(Vec<f32>, ImageShape, usize)> {
    let magic = read_u32(bytes, 0)?;
    if magic != IDX_IMAGES_MAGIC {
        return Err(ExperimentError::DataUnavailable(format!(
            "bad IDX image magic {:#010x}",
            magic
        )));
    }
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;

    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| {
            ExperimentError::DataUnavailable(format!(
                "IDX image header {}x{}x{} is too large",
                count, rows, cols
            ))
        })?;

    let body = &bytes[16..];
    if body.len() != expected {
        return Err(ExperimentError::DataUnavailable(format!(
            "IDX image payload is {} bytes, expected {}",
            body.len(),
            expected
        )));
    }

    let pixels = body.iter().map(|&b| b as f32 / 255.0).collect();
    Ok((pixels, ImageShape::new(rows, cols, 1), count))
}

/// Decode an IDX1 label file
pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IDX_LABELS_MAGIC {
        return Err(ExperimentError::DataUnavailable(format!(
            "bad IDX label magic {:#010x}",
            magic
        )));
    }
    let count = read_u32(bytes, 4)? as usize;
    let body = &bytes[8..];
    if body.len() != count {
        return Err(ExperimentError::DataUnavailable(format!(
            "IDX label payload is {} bytes, expected {}",
            body.len(),
            count
        )));
    }
    Ok(body.iter().map(|&b| b as usize).collect())
}
