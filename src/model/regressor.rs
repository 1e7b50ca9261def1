//! Area regressors
//!
//! [`AreaRegressor`] is the model trained and exported by the pipeline. It is
//! either the shallow CNN or a pretrained-style backbone with a small
//! regression head. Both produce one unbounded value per image.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use tracing::{info, warn};

use crate::model::cnn::ShallowCnn;
use crate::model::config::{BackboneKind, RegressorConfig};
use crate::model::efficientnet::{EfficientNet, EfficientNetVariant};
use crate::model::xception::Xception;

/// Feature extractor of a transfer regressor
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Xception(Xception<B>),
    EfficientNet(EfficientNet<B>),
}

impl<B: Backend> Backbone<B> {
    pub fn out_channels(&self) -> usize {
        match self {
            Backbone::Xception(model) => model.out_channels(),
            Backbone::EfficientNet(model) => model.out_channels(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Backbone::Xception(model) => model.forward(x),
            Backbone::EfficientNet(model) => model.forward(x),
        }
    }
}

/// Backbone, global average pooling and a dense regression head
#[derive(Module, Debug)]
pub struct TransferRegressor<B: Backend> {
    pub backbone: Backbone<B>,
    pool: AdaptiveAvgPool2d,
    dropout1: Dropout,
    fc1: Linear<B>,
    dropout2: Dropout,
    output: Linear<B>,
}

impl<B: Backend> TransferRegressor<B> {
    pub fn new(backbone: Backbone<B>, config: &RegressorConfig, device: &B::Device) -> Self {
        let channels = backbone.out_channels();

        Self {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout1: DropoutConfig::new(config.head_dropout).init(),
            fc1: LinearConfig::new(channels, config.head_dense_units).init(device),
            dropout2: DropoutConfig::new(config.head_dropout).init(),
            output: LinearConfig::new(config.head_dense_units, 1).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head(self.backbone.forward(x))
    }

    /// Pool backbone features and regress one value per image
    pub fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);

        let x = self.dropout1.forward(x);
        let x = Relu::new().forward(self.fc1.forward(x));
        let x = self.dropout2.forward(x);
        self.output.forward(x)
    }
}

/// The area regression model
#[derive(Module, Debug)]
pub enum AreaRegressor<B: Backend> {
    Shallow(ShallowCnn<B>),
    Transfer(TransferRegressor<B>),
}

impl<B: Backend> AreaRegressor<B> {
    /// Build a freshly initialized model; the backbone is frozen unless
    /// `fine_tune_backbone` is set
    pub fn new(config: &RegressorConfig, device: &B::Device) -> Self {
        let model = match config.backbone {
            BackboneKind::Simple => AreaRegressor::Shallow(ShallowCnn::new(config, device)),
            BackboneKind::Xception => {
                let backbone = Backbone::Xception(Xception::new(device));
                AreaRegressor::Transfer(TransferRegressor::new(backbone, config, device))
            }
            BackboneKind::EfficientNetB0 => {
                let backbone =
                    Backbone::EfficientNet(EfficientNet::new(EfficientNetVariant::B0, device));
                AreaRegressor::Transfer(TransferRegressor::new(backbone, config, device))
            }
            BackboneKind::EfficientNetB7 => {
                let backbone =
                    Backbone::EfficientNet(EfficientNet::new(EfficientNetVariant::B7, device));
                AreaRegressor::Transfer(TransferRegressor::new(backbone, config, device))
            }
        };

        model.apply_freeze(config)
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width] in `[0, 1]`
    ///
    /// # Returns
    /// * Predictions of shape [batch_size, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            AreaRegressor::Shallow(model) => model.forward(x),
            AreaRegressor::Transfer(model) => model.forward(x),
        }
    }

    /// Stop gradients through the backbone unless fine-tuning is requested.
    ///
    /// Loading a record restores trainable flags, so this is applied again
    /// after every restore.
    pub fn apply_freeze(self, config: &RegressorConfig) -> Self {
        match self {
            AreaRegressor::Transfer(mut model) if !config.fine_tune_backbone => {
                model.backbone = model.backbone.no_grad();
                AreaRegressor::Transfer(model)
            }
            other => other,
        }
    }

    /// Load pretrained backbone weights from a named MessagePack record.
    ///
    /// A failed load keeps the current weights and logs a warning.
    pub fn load_backbone_weights(self, path: &Path, device: &B::Device) -> Self {
        let mut model = match self {
            AreaRegressor::Transfer(model) => model,
            shallow => {
                warn!("Backbone weights ignored: the simple CNN has no backbone");
                return shallow;
            }
        };

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        match model.backbone.clone().load_file(path, &recorder, device) {
            Ok(backbone) => {
                info!("Loaded backbone weights from {:?}", path);
                model.backbone = backbone;
            }
            Err(e) => {
                warn!(
                    "Could not load backbone weights from {:?}: {}; using random initialization",
                    path, e
                );
            }
        }

        AreaRegressor::Transfer(model)
    }

    /// Number of parameters of the whole model
    pub fn parameter_count(&self) -> usize {
        self.num_params()
    }
}

impl<B: AutodiffBackend> AreaRegressor<B> {
    /// Forward pass used by the fit loop.
    ///
    /// `no_grad` keeps a frozen backbone's weights fixed, but batch norm
    /// still updates its running statistics whenever autodiff is on. A
    /// frozen backbone therefore runs in inference mode on the inner
    /// backend and only the head is recorded on the graph.
    pub fn forward_train(&self, x: Tensor<B, 4>, freeze_backbone: bool) -> Tensor<B, 2> {
        match self {
            AreaRegressor::Transfer(model) if freeze_backbone => {
                let features = model.backbone.valid().forward(x.inner());
                model.head(Tensor::from_inner(features))
            }
            _ => self.forward(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_simple_regressor_output() {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::Simple, 16);
        let model = AreaRegressor::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([3, 3, 16, 16], &device);
        assert_eq!(model.forward(input).dims(), [3, 1]);
        assert!(model.parameter_count() > 0);
    }

    #[test]
    fn test_efficientnet_regressor_output() {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::EfficientNetB0, 32);
        let model = AreaRegressor::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 1]);
    }

    #[test]
    fn test_missing_backbone_weights_keep_model() {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::EfficientNetB0, 32);
        let model = AreaRegressor::<TestBackend>::new(&config, &device);
        let params = model.parameter_count();

        let model = model.load_backbone_weights(Path::new("/missing/backbone.mpk"), &device);
        assert_eq!(model.parameter_count(), params);
    }
}
