//! Model module for area regression architectures using the Burn framework
//!
//! This module provides:
//! - A shallow CNN trained from scratch
//! - Xception and EfficientNet (B0/B7) backbones with a regression head
//! - Backend-free model configuration stored alongside checkpoints

pub mod cnn;
pub mod config;
pub mod efficientnet;
pub mod regressor;
pub mod xception;

pub use config::{BackboneKind, RegressorConfig};
pub use regressor::AreaRegressor;
