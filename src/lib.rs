//! # Ant Leaf-Fragment Area Regression
//!
//! Trains a convolutional regressor that estimates the pixel area of the
//! leaf fragment carried by an ant, from cropped images whose file names
//! encode the ground-truth area (`<anything>_a<area>[_<anything>].<ext>`).
//!
//! ## Modules
//!
//! - `dataset`: label extraction, source scanning, augmentation and batching
//! - `model`: the shallow CNN and the Xception / EfficientNet transfer models
//! - `training`: target transform, losses, checkpoints, fit loop and run driver
//! - `inference`: batched prediction and evaluation artefacts
//! - `config`: the TOML-backed run configuration
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use antleaf_area::backend::{default_device, TrainingBackend};
//! use antleaf_area::{run, RunConfig};
//!
//! let mut config = RunConfig::new("data/real_carrying");
//! config.data.log_transform = true;
//! let report = run::<TrainingBackend>(&config, &default_device())?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use config::RunConfig;
pub use dataset::{area_from_file_name, area_from_path, assemble_pool, DatasetSources, Sample};
pub use inference::{AreaPredictor, EvaluationRecord};
pub use model::{AreaRegressor, BackboneKind, RegressorConfig};
pub use training::{run, DriverStage, LossKind, RunReport, TargetContext, TargetTransform};
pub use utils::error::{AreaError, Result};
