//! Model Configuration Module
//!
//! Architecture settings for the area regressors. The configuration is
//! backend-free so it can be stored next to checkpoints and in run files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::error::{AreaError, Result};

/// Feature extractor in front of the regression head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackboneKind {
    /// Shallow three-block CNN trained from scratch (`simple` or `None`)
    #[default]
    Simple,
    Xception,
    EfficientNetB0,
    EfficientNetB7,
}

impl BackboneKind {
    /// Parse a selector, falling back to the shallow CNN on unknown names.
    ///
    /// With `strict` set, an unknown name is a configuration error instead.
    pub fn select(name: &str, strict: bool) -> Result<Self> {
        match name.parse() {
            Ok(kind) => Ok(kind),
            Err(msg) if strict => Err(AreaError::Config(msg)),
            Err(msg) => {
                warn!("{}, using the simple CNN", msg);
                Ok(BackboneKind::Simple)
            }
        }
    }

    pub fn is_transfer(&self) -> bool {
        !matches!(self, BackboneKind::Simple)
    }
}

impl FromStr for BackboneKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "none" => Ok(BackboneKind::Simple),
            "xception" => Ok(BackboneKind::Xception),
            "efficientnetb0" => Ok(BackboneKind::EfficientNetB0),
            "efficientnetb7" => Ok(BackboneKind::EfficientNetB7),
            other => Err(format!("Unknown backbone '{}'", other)),
        }
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackboneKind::Simple => "simple",
            BackboneKind::Xception => "Xception",
            BackboneKind::EfficientNetB0 => "EfficientNetB0",
            BackboneKind::EfficientNetB7 => "EfficientNetB7",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for an area regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressorConfig {
    /// Feature extractor
    pub backbone: BackboneKind,

    /// Input image size (width and height, assumed square)
    pub image_size: usize,

    /// Train the backbone weights instead of keeping them frozen
    pub fine_tune_backbone: bool,

    /// Filters of the three shallow CNN blocks
    pub cnn_filters: [usize; 3],

    /// Units of the shallow CNN dense layer
    pub cnn_dense_units: usize,

    /// Dropout after the shallow CNN dense layer
    pub cnn_dropout: f64,

    /// Units of the transfer head dense layer
    pub head_dense_units: usize,

    /// Dropout around the transfer head dense layer
    pub head_dropout: f64,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneKind::Simple,
            image_size: 224,
            fine_tune_backbone: false,
            cnn_filters: [32, 64, 128],
            cnn_dense_units: 512,
            cnn_dropout: 0.5,
            head_dense_units: 1024,
            head_dropout: 0.2,
        }
    }
}

impl RegressorConfig {
    pub fn new(backbone: BackboneKind, image_size: usize) -> Self {
        Self {
            backbone,
            image_size,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.image_size < 8 {
            return Err(AreaError::Config(format!(
                "Image size must be at least 8 (got {})",
                self.image_size
            )));
        }

        if !(0.0..1.0).contains(&self.cnn_dropout) || !(0.0..1.0).contains(&self.head_dropout) {
            return Err(AreaError::Config(
                "Dropout rates must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.cnn_filters.contains(&0) || self.cnn_dense_units == 0 || self.head_dense_units == 0
        {
            return Err(AreaError::Config(
                "Layer widths must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Spatial size after the three 2x2 pools of the shallow CNN
    pub fn cnn_feature_size(&self) -> usize {
        self.image_size / 8
    }
}
