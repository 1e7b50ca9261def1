//! Training module
//!
//! - Target transform and log-range diagnostic
//! - Loss selection and the percentage-error metric
//! - Checkpoint formats and training history
//! - The fit loop and the end-to-end run driver

pub mod checkpoint;
pub mod driver;
pub mod history;
pub mod loss;
pub mod trainer;
pub mod transform;

pub use checkpoint::{restore_model, save_full_model, save_weights, CheckpointFormat, CheckpointMeta};
pub use driver::{run, DriverStage, RunReport};
pub use history::{EpochRecord, TrainingHistory};
pub use loss::{percentage_error, LossKind};
pub use trainer::{fit, FitOutcome, FitSettings};
pub use transform::{LogRange, TargetContext, TargetTransform};
