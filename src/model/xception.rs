//! Xception backbone
//!
//! Entry, middle and exit flows built from depthwise-separable convolutions
//! with residual shortcuts. Input in `[0, 1]` is rescaled to `[-1, 1]`.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

const MIDDLE_FLOW_BLOCKS: usize = 8;
const MIDDLE_FLOW_CHANNELS: usize = 728;

/// Depthwise 3x3 convolution, pointwise 1x1 convolution, BatchNorm
#[derive(Module, Debug)]
pub struct SeparableConvBn<B: Backend> {
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> SeparableConvBn<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let depthwise = Conv2dConfig::new([in_channels, in_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(in_channels)
            .with_bias(false)
            .init(device);
        let pointwise = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            depthwise,
            pointwise,
            bn,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.depthwise.forward(x);
        let x = self.pointwise.forward(x);
        self.bn.forward(x)
    }
}

/// Two separable convolutions, a strided max-pool and a strided 1x1 shortcut
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    sep1: SeparableConvBn<B>,
    sep2: SeparableConvBn<B>,
    pool: MaxPool2d,
    shortcut: Conv2d<B>,
    shortcut_bn: BatchNorm<B, 2>,
    relu: Relu,
    relu_first: bool,
}

impl<B: Backend> DownBlock<B> {
    fn new(
        in_channels: usize,
        mid_channels: usize,
        out_channels: usize,
        relu_first: bool,
        device: &B::Device,
    ) -> Self {
        let shortcut = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([2, 2])
            .with_bias(false)
            .init(device);

        Self {
            sep1: SeparableConvBn::new(in_channels, mid_channels, device),
            sep2: SeparableConvBn::new(mid_channels, out_channels, device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            shortcut,
            shortcut_bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            relu_first,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.shortcut_bn.forward(self.shortcut.forward(input.clone()));

        let x = if self.relu_first {
            self.relu.forward(input)
        } else {
            input
        };
        let x = self.sep1.forward(x);
        let x = self.relu.forward(x);
        let x = self.sep2.forward(x);
        let x = self.pool.forward(x);

        x + residual
    }
}

/// Three ReLU + separable convolution steps with an identity shortcut
#[derive(Module, Debug)]
pub struct MiddleBlock<B: Backend> {
    convs: Vec<SeparableConvBn<B>>,
    relu: Relu,
}

impl<B: Backend> MiddleBlock<B> {
    fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            convs: (0..3)
                .map(|_| SeparableConvBn::new(channels, channels, device))
                .collect(),
            relu: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        for conv in &self.convs {
            x = conv.forward(self.relu.forward(x));
        }
        x + input
    }
}

/// Xception feature extractor
#[derive(Module, Debug)]
pub struct Xception<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,

    entry: Vec<DownBlock<B>>,
    middle: Vec<MiddleBlock<B>>,
    exit: DownBlock<B>,

    sep3: SeparableConvBn<B>,
    sep4: SeparableConvBn<B>,
    relu: Relu,
}

impl<B: Backend> Xception<B> {
    pub fn new(device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 32], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([32, 64], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let entry = vec![
            DownBlock::new(64, 128, 128, false, device),
            DownBlock::new(128, 256, 256, true, device),
            DownBlock::new(256, MIDDLE_FLOW_CHANNELS, MIDDLE_FLOW_CHANNELS, true, device),
        ];
        let middle = (0..MIDDLE_FLOW_BLOCKS)
            .map(|_| MiddleBlock::new(MIDDLE_FLOW_CHANNELS, device))
            .collect();
        let exit = DownBlock::new(MIDDLE_FLOW_CHANNELS, MIDDLE_FLOW_CHANNELS, 1024, true, device);

        Self {
            conv1,
            bn1: BatchNormConfig::new(32).init(device),
            conv2,
            bn2: BatchNormConfig::new(64).init(device),
            entry,
            middle,
            exit,
            sep3: SeparableConvBn::new(1024, 1536, device),
            sep4: SeparableConvBn::new(1536, 2048, device),
            relu: Relu::new(),
        }
    }

    /// Number of channels of the returned feature map
    pub fn out_channels(&self) -> usize {
        2048
    }

    /// Forward pass returning the exit-flow feature map
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        // [0, 1] -> [-1, 1]
        let x = input * 2.0 - 1.0;

        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let mut x = self.relu.forward(self.bn2.forward(self.conv2.forward(x)));

        for block in &self.entry {
            x = block.forward(x);
        }
        for block in &self.middle {
            x = block.forward(x);
        }
        let x = self.exit.forward(x);

        let x = self.relu.forward(self.sep3.forward(x));
        self.relu.forward(self.sep4.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_separable_conv_shape() {
        let device = Default::default();
        let conv = SeparableConvBn::<TestBackend>::new(8, 16, &device);
        let x = Tensor::<TestBackend, 4>::ones([2, 8, 5, 5], &device);
        assert_eq!(conv.forward(x).dims(), [2, 16, 5, 5]);
    }

    #[test]
    fn test_down_block_halves_resolution() {
        let device = Default::default();
        let block = DownBlock::<TestBackend>::new(8, 16, 16, true, &device);
        let x = Tensor::<TestBackend, 4>::ones([1, 8, 7, 7], &device);
        assert_eq!(block.forward(x).dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_xception_forward_shape() {
        let device = Default::default();
        let model = Xception::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);

        let features = model.forward(input);
        assert_eq!(features.dims(), [1, model.out_channels(), 1, 1]);
    }
}
