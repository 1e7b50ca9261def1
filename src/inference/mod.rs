//! Inference module
//!
//! Batched prediction on a trained regressor and the evaluation artefacts
//! written at the end of a run.

pub mod export;
pub mod predictor;

pub use export::{write_predictions_csv, EvaluationRecord, EvaluationSource, ResultsSummary};
pub use predictor::{AreaPredictor, Predictions};
