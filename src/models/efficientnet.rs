//! EfficientNet (B3 by default) built from burn modules.
//!
//! Field names mirror the torchvision layout closely enough that its
//! checkpoints load through a fixed key remap (see `factory`).

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Distribution, Tensor,
    },
};

/// `(expand_ratio, kernel, stride, in_channels, out_channels, layers)` of the
/// B0 baseline, scaled by width and depth multipliers.
const BASE_STAGES: [(usize, usize, usize, usize, usize, usize); 7] = [
    (1, 3, 1, 32, 16, 1),
    (6, 3, 2, 16, 24, 2),
    (6, 5, 2, 24, 40, 2),
    (6, 3, 2, 40, 80, 3),
    (6, 5, 1, 80, 112, 3),
    (6, 5, 2, 112, 192, 4),
    (6, 3, 1, 192, 320, 1),
];

#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    #[config(default = 1000)]
    pub num_classes: usize,
    #[config(default = 1.2)]
    pub width_mult: f64,
    #[config(default = 1.4)]
    pub depth_mult: f64,
    #[config(default = 0.3)]
    pub dropout: f64,
    #[config(default = 0.2)]
    pub stochastic_depth_prob: f64,
}

/// Rounds `v` to the nearest multiple of 8 without going below 90% of it.
pub(crate) fn make_divisible(v: f64) -> usize {
    const DIVISOR: usize = 8;
    let mut rounded = (((v + DIVISOR as f64 / 2.0) as usize) / DIVISOR * DIVISOR).max(DIVISOR);
    if (rounded as f64) < 0.9 * v {
        rounded += DIVISOR;
    }
    rounded
}

#[derive(Module, Debug)]
pub struct ConvNormAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
    pub silu: bool,
}

impl<B: Backend> ConvNormAct<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        groups: usize,
        silu: bool,
        device: &B::Device,
    ) -> Self {
        let pad = (kernel - 1) / 2;
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        Self {
            conv,
            norm: BatchNormConfig::new(channels[1]).init(device),
            silu,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        if self.silu {
            silu(x)
        } else {
            x
        }
    }
}

#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub fc1: Conv2d<B>,
    pub fc2: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    fn new(channels: usize, squeeze: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: Conv2dConfig::new([channels, squeeze], [1, 1]).init(device),
            fc2: Conv2dConfig::new([squeeze, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = sigmoid(self.fc2.forward(silu(self.fc1.forward(scale))));
        x * scale
    }
}

/// Inverted residual block with squeeze-and-excitation.
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand: Option<ConvNormAct<B>>,
    pub depthwise: ConvNormAct<B>,
    pub se: SqueezeExcitation<B>,
    pub project: ConvNormAct<B>,
    pub use_residual: bool,
    /// Probability of dropping the residual branch for a whole sample while
    /// training.
    pub drop_prob: f64,
}

impl<B: Backend> MbConv<B> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        input: usize,
        output: usize,
        drop_prob: f64,
        device: &B::Device,
    ) -> Self {
        let expanded = make_divisible((input * expand_ratio) as f64);
        let expand = (expanded != input)
            .then(|| ConvNormAct::new([input, expanded], 1, 1, 1, true, device));
        Self {
            expand,
            depthwise: ConvNormAct::new([expanded, expanded], kernel, stride, expanded, true, device),
            se: SqueezeExcitation::new(expanded, (input / 4).max(1), device),
            project: ConvNormAct::new([expanded, output], 1, 1, 1, false, device),
            use_residual: stride == 1 && input == output,
            drop_prob,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = expand.forward(x);
        }
        let x = self.project.forward(self.se.forward(self.depthwise.forward(x)));
        if !self.use_residual {
            return x;
        }
        stochastic_depth(x, self.drop_prob) + input
    }
}

/// Row-wise stochastic depth; identity outside of autodiff.
fn stochastic_depth<B: Backend>(x: Tensor<B, 4>, p: f64) -> Tensor<B, 4> {
    if !B::ad_enabled() || p <= 0.0 {
        return x;
    }
    let survival = 1.0 - p;
    let [batch, _, _, _] = x.dims();
    let mask = Tensor::<B, 4>::random(
        [batch, 1, 1, 1],
        Distribution::Bernoulli(survival),
        &x.device(),
    );
    x * mask.div_scalar(survival)
}

#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    pub blocks: Vec<MbConv<B>>,
}

#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub stem: ConvNormAct<B>,
    pub stages: Vec<Stage<B>>,
    /// 1x1 expansion to the final feature width; its conv is the feature layer.
    pub head: ConvNormAct<B>,
    pub avgpool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifier: Linear<B>,
}

impl EfficientNetConfig {
    /// torchvision `efficientnet_b3` hyper-parameters.
    pub fn b3() -> Self {
        Self::new()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let width = |c: usize| make_divisible(c as f64 * self.width_mult);
        let depth = |n: usize| (n as f64 * self.depth_mult).ceil() as usize;

        let total_blocks: usize = BASE_STAGES.iter().map(|s| depth(s.5)).sum();
        let stem_out = width(BASE_STAGES[0].3);
        let stem = ConvNormAct::new([3, stem_out], 3, 2, 1, true, device);

        let mut block_id = 0;
        let mut stages = Vec::with_capacity(BASE_STAGES.len());
        for &(expand, kernel, stride, input, output, layers) in BASE_STAGES.iter() {
            let (input, output) = (width(input), width(output));
            let mut blocks = Vec::new();
            for i in 0..depth(layers) {
                let drop_prob = self.stochastic_depth_prob * block_id as f64 / total_blocks as f64;
                let (block_in, block_stride) = if i == 0 { (input, stride) } else { (output, 1) };
                blocks.push(MbConv::new(
                    expand,
                    kernel,
                    block_stride,
                    block_in,
                    output,
                    drop_prob,
                    device,
                ));
                block_id += 1;
            }
            stages.push(Stage { blocks });
        }

        let last_in = width(BASE_STAGES[BASE_STAGES.len() - 1].4);
        let features = 4 * last_in;
        EfficientNet {
            stem,
            stages,
            head: ConvNormAct::new([last_in, features], 1, 1, 1, true, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            classifier: LinearConfig::new(features, self.num_classes).init(device),
        }
    }
}

impl<B: Backend> EfficientNet<B> {
    /// `[batch, 3, h, w]` -> `[batch, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_head(self.forward_features(images))
    }

    /// Activations of the feature layer, `[batch, features, h/32, w/32]`.
    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(images);
        for stage in &self.stages {
            for block in &stage.blocks {
                x = block.forward(x);
            }
        }
        self.head.forward(x)
    }

    pub fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.avgpool.forward(features);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);
        self.classifier.forward(self.dropout.forward(x))
    }

    pub fn num_features(&self) -> usize {
        self.classifier.weight.val().dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }

    /// Swaps the final linear layer for a freshly initialized one.
    pub fn with_num_classes(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.classifier = LinearConfig::new(self.num_features(), num_classes).init(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn channel_rounding_matches_b3_widths() {
        let widths: Vec<_> = [32, 16, 24, 40, 80, 112, 192, 320]
            .iter()
            .map(|&c| make_divisible(c as f64 * 1.2))
            .collect();
        assert_eq!(widths, vec![40, 24, 32, 48, 96, 136, 232, 384]);
        assert_eq!(make_divisible(3.0), 8);
    }

    #[test]
    fn b3_layout() {
        let device = Default::default();
        let model = EfficientNetConfig::b3().init::<TestBackend>(&device);
        let depths: Vec<_> = model.stages.iter().map(|s| s.blocks.len()).collect();
        assert_eq!(depths, vec![2, 3, 3, 5, 5, 6, 2]);
        assert!(model.stages[0].blocks[0].expand.is_none());
        assert!(model.stages[1].blocks[0].expand.is_some());
        assert!(!model.stages[1].blocks[0].use_residual);
        assert!(model.stages[1].blocks[1].use_residual);
        assert_eq!(model.stages[0].blocks[0].drop_prob, 0.0);
        assert_eq!(model.num_features(), 1536);
        assert_eq!(model.num_classes(), 1000);
    }

    #[test]
    fn forward_shapes() {
        let device = Default::default();
        let model = EfficientNetConfig::b3()
            .with_num_classes(4)
            .init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);

        let features = model.forward_features(images.clone());
        assert_eq!(features.dims(), [2, 1536, 2, 2]);
        assert_eq!(model.forward(images).dims(), [2, 4]);
    }

    #[test]
    fn replacing_the_classifier_keeps_features() {
        let device = Default::default();
        let model = EfficientNetConfig::b3().init::<TestBackend>(&device);
        let model = model.with_num_classes(7, &device);
        assert_eq!(model.num_classes(), 7);
        assert_eq!(model.num_features(), 1536);
    }
}
