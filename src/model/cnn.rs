//! Two-stage convolutional classifier
//!
//! conv -> relu -> max-pool -> conv -> relu -> max-pool -> flatten ->
//! dense(128) -> relu -> dense(K). Filter count and kernel size come from the
//! config; every other shape is derived from the input image size.
//!
//! Convolutions keep the spatial size. Kernels of any side are accepted: the
//! input is zero padded by `(k-1)/2` on the top and left and by the remaining
//! `k-1-(k-1)/2` on the bottom and right before each convolution.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::dataset::ImageShape;
use crate::utils::error::{self, ExperimentError};

/// Architecture of the classifier. Serialized next to the weights so the
/// model can be rebuilt from disk alone.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub input_height: usize,
    pub input_width: usize,

    #[config(default = "1")]
    pub input_channels: usize,

    pub num_classes: usize,

    /// Filters in each convolution
    #[config(default = "16")]
    pub num_filters: usize,

    /// Square kernel side
    #[config(default = "3")]
    pub filter_size: usize,

    /// Width of the hidden dense layer
    #[config(default = "128")]
    pub hidden_units: usize,
}

impl ClassifierConfig {
    /// Config for images of `shape` with `num_classes` outputs
    pub fn for_input(shape: ImageShape, num_classes: usize) -> Self {
        Self::new(shape.height, shape.width, num_classes).with_input_channels(shape.channels)
    }

    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.input_height, self.input_width, self.input_channels)
    }

    /// Features entering the first dense layer after two 2x2 pools
    pub fn flattened_features(&self) -> usize {
        self.num_filters * (self.input_height / 2 / 2) * (self.input_width / 2 / 2)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes == 0 || self.num_filters == 0 || self.hidden_units == 0 {
            return Err(ExperimentError::InvalidInput(format!(
                "classes ({}), filters ({}) and hidden units ({}) must all be positive",
                self.num_classes, self.num_filters, self.hidden_units
            )));
        }
        if self.filter_size == 0 {
            return Err(ExperimentError::InvalidInput(format!(
                "filter size {} must be positive",
                self.filter_size
            )));
        }
        if self.input_height < 4 || self.input_width < 4 || self.input_channels == 0 {
            return Err(ExperimentError::InvalidInput(format!(
                "input {} is too small for two 2x2 pooling stages",
                self.input_shape()
            )));
        }
        Ok(())
    }

    /// Validate and build the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<Classifier<B>> {
        self.validate()?;
        Ok(Classifier::new(self, device))
    }
}

#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub conv1: Conv2d<B>,
    pub pool1: MaxPool2d,
    pub conv2: Conv2d<B>,
    pub pool2: MaxPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    relu: Relu,
    num_classes: usize,
    pad_before: usize,
    pad_after: usize,
}

impl<B: Backend> Classifier<B> {
    fn new(config: &ClassifierConfig, device: &B::Device) -> Self {
        let kernel = [config.filter_size, config.filter_size];
        let filters = config.num_filters;

        let conv1 = Conv2dConfig::new([config.input_channels, filters], kernel)
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let conv2 = Conv2dConfig::new([filters, filters], kernel)
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        Self {
            conv1,
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2,
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(config.flattened_features(), config.hidden_units).init(device),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            relu: Relu::new(),
            num_classes: config.num_classes,
            pad_before: (config.filter_size - 1) / 2,
            pad_after: config.filter_size - 1 - (config.filter_size - 1) / 2,
        }
    }

    /// Logits for a batch of images.
    ///
    /// # Arguments
    /// * `x` - images of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool1.forward(self.relu.forward(self.conv1.forward(self.same_pad(x))));
        let x = self.pool2.forward(self.relu.forward(self.conv2.forward(self.same_pad(x))));

        // [B, F, H/4, W/4] -> [B, F*H/4*W/4]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.relu.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    // (left, right, top, bottom); the extra row and column of an even kernel go last
    fn same_pad(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.pad_before == 0 && self.pad_after == 0 {
            return x;
        }
        x.pad(
            (self.pad_before, self.pad_after, self.pad_before, self.pad_after),
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_classifier_output_shape_mnist() {
        let device = Default::default();
        let config = ClassifierConfig::new(28, 28, 10);
        let model = config.init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 28, 28], &device);
        assert_eq!(model.forward(input).dims(), [2, 10]);
        assert_eq!(config.flattened_features(), 16 * 7 * 7);
    }

    #[test]
    fn test_classifier_output_shape_odd_size() {
        // 10 -> 5 -> 2 after the two pools
        let device = Default::default();
        let config = ClassifierConfig::new(10, 10, 3)
            .with_num_filters(4)
            .with_filter_size(5);
        let model = config.init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([3, 1, 10, 10], &device);
        assert_eq!(model.forward(input).dims(), [3, 3]);
        assert_eq!(config.flattened_features(), 4 * 2 * 2);
    }

    #[test]
    fn test_filter_size_one_is_supported() {
        let device = Default::default();
        let model = ClassifierConfig::new(8, 8, 2)
            .with_filter_size(1)
            .init::<TestBackend>(&device)
            .unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device);
        assert_eq!(model.forward(input).dims(), [1, 2]);
    }

    #[test]
    fn test_even_filter_sizes_keep_spatial_size() {
        let device = Default::default();
        for k in [2, 4] {
            let config = ClassifierConfig::new(8, 8, 2)
                .with_num_filters(3)
                .with_filter_size(k);
            let model = config.init::<TestBackend>(&device).unwrap();

            let input = Tensor::<TestBackend, 4>::ones([2, 1, 8, 8], &device);
            assert_eq!(model.forward(input).dims(), [2, 2]);
            assert_eq!(config.flattened_features(), 3 * 2 * 2);
        }
    }

    #[test]
    fn test_even_kernel_pads_bottom_right() {
        let device = Default::default();
        let model = ClassifierConfig::new(8, 8, 2)
            .with_filter_size(4)
            .init::<TestBackend>(&device)
            .unwrap();
        let padded = model.same_pad(Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device));
        assert_eq!(padded.dims(), [1, 1, 11, 11]);

        let values = padded.into_data().to_vec::<f32>().unwrap();
        // first row is padding, second row starts with one padded column
        assert_eq!(values[0], 0.0);
        assert_eq!(values[11], 0.0);
        assert_eq!(values[12], 1.0);
        // last two rows are padding
        assert!(values[9 * 11..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_filter_size_rejected() {
        let config = ClassifierConfig::new(8, 8, 2).with_filter_size(0);
        assert!(matches!(
            config.validate(),
            Err(ExperimentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = ClassifierConfig::new(8, 8, 2).with_num_filters(6);
        let json = serde_json::to_string(&config).unwrap();
        let back: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_filters, 6);
        assert_eq!(back.hidden_units, 128);
        assert_eq!(back.input_shape(), ImageShape::new(8, 8, 1));
    }
}
