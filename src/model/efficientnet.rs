//! EfficientNet backbones (B0 and B7)
//!
//! MBConv blocks with squeeze-and-excitation, scaled from the B0 stage table
//! by a width and a depth coefficient. The backbone stops after the 1x1 head
//! convolution and returns a feature map; pooling belongs to the regressor.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor, TensorData,
    },
};

/// ImageNet channel means used to normalize `[0, 1]` input
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One stage of the B0 table: (expand ratio, kernel, stride, in, out, repeats)
struct StageDef {
    expand: usize,
    kernel: usize,
    stride: usize,
    in_filters: usize,
    out_filters: usize,
    repeats: usize,
}

const fn stage(
    expand: usize,
    kernel: usize,
    stride: usize,
    in_filters: usize,
    out_filters: usize,
    repeats: usize,
) -> StageDef {
    StageDef {
        expand,
        kernel,
        stride,
        in_filters,
        out_filters,
        repeats,
    }
}

const B0_STAGES: [StageDef; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

const STEM_FILTERS: usize = 32;
const HEAD_FILTERS: usize = 1280;
const SE_RATIO: f64 = 0.25;
const DEPTH_DIVISOR: usize = 8;

/// Compound scaling variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfficientNetVariant {
    B0,
    B7,
}

impl EfficientNetVariant {
    /// (width coefficient, depth coefficient)
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            EfficientNetVariant::B0 => (1.0, 1.0),
            EfficientNetVariant::B7 => (2.0, 3.1),
        }
    }
}

/// Scale a filter count by `width` and round to a multiple of 8
pub fn round_filters(filters: usize, width: f64) -> usize {
    let scaled = filters as f64 * width;
    let divisor = DEPTH_DIVISOR as f64;
    let mut rounded = ((scaled + divisor / 2.0) / divisor).floor() * divisor;
    rounded = rounded.max(divisor);
    if rounded < 0.9 * scaled {
        rounded += divisor;
    }
    rounded as usize
}

/// Scale a block repeat count by `depth`, rounding up
pub fn round_repeats(repeats: usize, depth: f64) -> usize {
    (repeats as f64 * depth).ceil() as usize
}

/// Convolution followed by BatchNorm, no activation
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let pad = kernel / 2;
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(channels[1]).init(device);

        Self { conv, bn }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Channel attention: pool, squeeze, excite, rescale
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let s = self.pool.forward(x.clone());
        let s = silu(self.reduce.forward(s));
        let s = sigmoid(self.expand.forward(s));
        x * s
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    expand: Option<ConvBn<B>>,
    depthwise: ConvBn<B>,
    se: SqueezeExcite<B>,
    project: ConvBn<B>,
    residual: bool,
}

impl<B: Backend> MbConv<B> {
    fn new(
        in_filters: usize,
        out_filters: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_filters * expand_ratio;
        let expand = (expand_ratio != 1).then(|| ConvBn::new([in_filters, hidden], 1, 1, 1, device));
        let depthwise = ConvBn::new([hidden, hidden], kernel, stride, hidden, device);
        let squeezed = ((in_filters as f64 * SE_RATIO) as usize).max(1);
        let se = SqueezeExcite::new(hidden, squeezed, device);
        let project = ConvBn::new([hidden, out_filters], 1, 1, 1, device);

        Self {
            expand,
            depthwise,
            se,
            project,
            residual: stride == 1 && in_filters == out_filters,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => silu(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = silu(self.depthwise.forward(x));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            x + input
        } else {
            x
        }
    }
}

/// EfficientNet feature extractor
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    stem: ConvBn<B>,
    blocks: Vec<MbConv<B>>,
    head: ConvBn<B>,
    out_channels: usize,
}

impl<B: Backend> EfficientNet<B> {
    /// Build a backbone for the given variant
    pub fn new(variant: EfficientNetVariant, device: &B::Device) -> Self {
        let (width, depth) = variant.coefficients();

        let stem_filters = round_filters(STEM_FILTERS, width);
        let stem = ConvBn::new([3, stem_filters], 3, 2, 1, device);

        let mut blocks = Vec::new();
        for stage in &B0_STAGES {
            let in_filters = round_filters(stage.in_filters, width);
            let out_filters = round_filters(stage.out_filters, width);

            for i in 0..round_repeats(stage.repeats, depth) {
                let (block_in, stride) = if i == 0 {
                    (in_filters, stage.stride)
                } else {
                    (out_filters, 1)
                };
                blocks.push(MbConv::new(
                    block_in,
                    out_filters,
                    stage.expand,
                    stage.kernel,
                    stride,
                    device,
                ));
            }
        }

        let last_filters = round_filters(B0_STAGES[B0_STAGES.len() - 1].out_filters, width);
        let out_channels = round_filters(HEAD_FILTERS, width);
        let head = ConvBn::new([last_filters, out_channels], 1, 1, 1, device);

        Self {
            stem,
            blocks,
            head,
            out_channels,
        }
    }

    /// Number of channels of the returned feature map
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Number of MBConv blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Normalize `[0, 1]` input with the ImageNet statistics
    fn rescale(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x.device();
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            &device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            &device,
        );
        (x - mean) / std
    }

    /// Forward pass returning the head feature map
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.rescale(input);
        let mut x = silu(self.stem.forward(x));

        for block in &self.blocks {
            x = block.forward(x);
        }

        silu(self.head.forward(x))
    }
}
