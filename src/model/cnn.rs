//! Shallow CNN regressor
//!
//! Three convolution blocks followed by a dense layer and a single linear
//! output unit. Trained from scratch on `[0, 1]` pixel input.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::config::RegressorConfig;

/// Convolution with ReLU, then BatchNorm and a 2x2 max-pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        let x = self.bn.forward(x);
        self.pool.forward(x)
    }
}

/// Shallow CNN area regressor
///
/// Architecture:
/// - 3 convolutional blocks (32 -> 64 -> 128 filters by default)
/// - Flatten
/// - Dense + ReLU, dropout
/// - Linear output with one unbounded value
#[derive(Module, Debug)]
pub struct ShallowCnn<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ShallowCnn<B> {
    /// Create a new shallow CNN from configuration
    pub fn new(config: &RegressorConfig, device: &B::Device) -> Self {
        let [f1, f2, f3] = config.cnn_filters;

        let conv1 = ConvBlock::new(3, f1, device);
        let conv2 = ConvBlock::new(f1, f2, device);
        let conv3 = ConvBlock::new(f2, f3, device);

        let side = config.cnn_feature_size();
        let fc1 = LinearConfig::new(f3 * side * side, config.cnn_dense_units).init(device);
        let dropout = DropoutConfig::new(config.cnn_dropout).init();
        let output = LinearConfig::new(config.cnn_dense_units, 1).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            fc1,
            dropout,
            output,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width] in `[0, 1]`
    ///
    /// # Returns
    /// * Predictions of shape [batch_size, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // Flatten: [B, C, H, W] -> [B, C*H*W]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::BackboneKind;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_shallow_cnn_output_shape() {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::Simple, 32);
        let model = ShallowCnn::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_odd_image_size_flattens() {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::Simple, 36);
        let model = ShallowCnn::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 36, 36], &device);
        assert_eq!(model.forward(input).dims(), [1, 1]);
    }
}
