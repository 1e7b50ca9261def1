//! Error Handling Module
//!
//! Defines the error type for the area regression library.
//! Uses thiserror for ergonomic error definitions; the binary maps each
//! variant to a process exit status through [`AreaError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

/// Exit status for a normal run
pub const EXIT_OK: u8 = 0;
/// Exit status for errors without a dedicated code
pub const EXIT_FAILURE: u8 = 1;
/// Exit status when no training sample could be assembled
pub const EXIT_NO_TRAINING_DATA: u8 = 2;
/// Exit status for a checkpoint path with an unsupported extension
pub const EXIT_UNSUPPORTED_CHECKPOINT: u8 = 3;
/// Exit status when there is nothing to evaluate on
pub const EXIT_NO_EVALUATION_DATA: u8 = 4;

/// Main error type for area regression operations
#[derive(Error, Debug)]
pub enum AreaError {
    /// None of the dataset sources contributed a single image
    #[error("No training images found in any dataset source ({0})")]
    NoTrainingData(String),

    /// Neither the test directory nor the training pool has samples
    #[error("No evaluation data available")]
    NoEvaluationData,

    /// Checkpoint path whose extension is neither a full model nor weights
    #[error("Unsupported checkpoint extension for '{0}' (expected .mpk or .bin)")]
    UnsupportedCheckpoint(PathBuf),

    /// Reading or writing a checkpoint failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AreaError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            AreaError::NoTrainingData(_) => EXIT_NO_TRAINING_DATA,
            AreaError::UnsupportedCheckpoint(_) => EXIT_UNSUPPORTED_CHECKPOINT,
            AreaError::NoEvaluationData => EXIT_NO_EVALUATION_DATA,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<serde_json::Error> for AreaError {
    fn from(err: serde_json::Error) -> Self {
        AreaError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for AreaError {
    fn from(err: csv::Error) -> Self {
        AreaError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for AreaError {
    fn from(err: toml::ser::Error) -> Self {
        AreaError::Serialization(err.to_string())
    }
}

/// Convenience Result type for area regression operations
pub type Result<T> = std::result::Result<T, AreaError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| AreaError::Config(format!("{}: {}", f(), e)))
    }
}
