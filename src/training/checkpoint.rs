//! Model checkpointing
//!
//! Two on-disk formats:
//! - `.mpk` full model: named MessagePack record plus a `<stem>.model.json`
//!   sidecar describing the architecture, so it can be rebuilt on load
//! - `.bin` weights only: binary record loaded into a model built from the
//!   current run configuration
//!
//! Records are written under a temporary name in the target directory and
//! renamed into place once complete.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{AreaRegressor, RegressorConfig};
use crate::utils::error::{AreaError, Result};

/// Extension of full-model checkpoints
pub const FULL_MODEL_EXTENSION: &str = "mpk";
/// Extension of weights-only checkpoints
pub const WEIGHTS_EXTENSION: &str = "bin";

const SIDECAR_SUFFIX: &str = "model.json";

/// On-disk checkpoint format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    FullModel,
    WeightsOnly,
}

impl CheckpointFormat {
    /// Detect the format of a path.
    ///
    /// Any extension other than `.mpk` or `.bin` is rejected, whether or not
    /// the file exists.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            FULL_MODEL_EXTENSION => Ok(CheckpointFormat::FullModel),
            WEIGHTS_EXTENSION => Ok(CheckpointFormat::WeightsOnly),
            _ => Err(AreaError::UnsupportedCheckpoint(path.to_path_buf())),
        }
    }
}

/// Description stored next to a full-model checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub model: RegressorConfig,
    pub loss: String,
    pub log_transform: bool,
    pub epoch: Option<usize>,
    pub timestamp: String,
}

impl CheckpointMeta {
    pub fn new(model: RegressorConfig, loss: String, log_transform: bool, epoch: Option<usize>) -> Self {
        Self {
            model,
            loss,
            log_transform,
            epoch,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Sidecar path of a full-model checkpoint: `dir/stem.model.json`
pub fn sidecar_path(model_path: &Path) -> PathBuf {
    let stem = model_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    model_path.with_file_name(format!("{}.{}", stem, SIDECAR_SUFFIX))
}

/// Temporary sibling path used while a file is being written
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".partial-{}", name))
}

/// Write a record under a temporary name, then rename it into place
fn save_record<B, R>(model: &AreaRegressor<B>, path: &Path, recorder: &R) -> Result<()>
where
    B: Backend,
    R: FileRecorder<B>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    model
        .clone()
        .save_file(&partial, recorder)
        .map_err(|e| AreaError::Checkpoint(format!("Failed to save {:?}: {}", path, e)))?;

    fs::rename(&partial, path)?;
    debug!("Wrote {:?}", path);
    Ok(())
}

/// Write bytes under a temporary name, then rename them into place
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, contents)?;
    fs::rename(&partial, path)?;
    Ok(())
}

/// Save a full-model checkpoint and its sidecar
pub fn save_full_model<B: Backend>(
    model: &AreaRegressor<B>,
    path: &Path,
    meta: &CheckpointMeta,
) -> Result<()> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    save_record(model, &path.with_extension(FULL_MODEL_EXTENSION), &recorder)?;

    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&sidecar_path(path), json.as_bytes())?;

    info!("Full model saved to {:?}", path);
    Ok(())
}

/// Save only the model weights
pub fn save_weights<B: Backend>(model: &AreaRegressor<B>, path: &Path) -> Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    save_record(model, &path.with_extension(WEIGHTS_EXTENSION), &recorder)?;

    info!("Weights saved to {:?}", path);
    Ok(())
}

/// Read the sidecar of a full-model checkpoint
pub fn load_meta(model_path: &Path) -> Result<CheckpointMeta> {
    let json = fs::read_to_string(sidecar_path(model_path))?;
    Ok(serde_json::from_str(&json)?)
}

/// Restore a model from a checkpoint.
///
/// Full models are rebuilt from their sidecar when present, otherwise from
/// `config`. Weights-only files always use `config`. The backbone freeze
/// setting of `config` is applied to the result.
pub fn restore_model<B: Backend>(
    path: &Path,
    config: &RegressorConfig,
    device: &B::Device,
) -> Result<AreaRegressor<B>> {
    let format = CheckpointFormat::from_path(path)?;

    if !path.is_file() {
        return Err(AreaError::Checkpoint(format!(
            "Checkpoint file not found: {:?}",
            path
        )));
    }

    let model = match format {
        CheckpointFormat::FullModel => {
            let architecture = match load_meta(path) {
                Ok(meta) => RegressorConfig {
                    fine_tune_backbone: config.fine_tune_backbone,
                    ..meta.model
                },
                Err(e) => {
                    warn!(
                        "No readable model description next to {:?} ({}); assuming the current configuration",
                        path, e
                    );
                    config.clone()
                }
            };

            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            AreaRegressor::new(&architecture, device)
                .load_file(path, &recorder, device)
                .map_err(|e| AreaError::Checkpoint(format!("Failed to load {:?}: {}", path, e)))?
                .apply_freeze(&architecture)
        }
        CheckpointFormat::WeightsOnly => {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            AreaRegressor::new(config, device)
                .load_file(path, &recorder, device)
                .map_err(|e| AreaError::Checkpoint(format!("Failed to load {:?}: {}", path, e)))?
                .apply_freeze(config)
        }
    };

    info!("Restored model from {:?}", path);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackboneKind;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn small_config() -> RegressorConfig {
        RegressorConfig::new(BackboneKind::Simple, 16)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("a/final_model.mpk")).unwrap(),
            CheckpointFormat::FullModel
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("a/final_weights.BIN")).unwrap(),
            CheckpointFormat::WeightsOnly
        );
        let err = CheckpointFormat::from_path(Path::new("model.h5")).unwrap_err();
        assert_eq!(err.exit_code(), crate::utils::error::EXIT_UNSUPPORTED_CHECKPOINT);
        assert!(CheckpointFormat::from_path(Path::new("model")).is_err());
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("out/checkpoints/epoch_001.mpk")),
            PathBuf::from("out/checkpoints/epoch_001.model.json")
        );
    }

    #[test]
    fn test_full_model_round_trip() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = small_config();
        let model = AreaRegressor::<TestBackend>::new(&config, &device);

        let path = dir.path().join("final_model.mpk");
        let meta = CheckpointMeta::new(config.clone(), "mse_keras".into(), true, Some(0));
        save_full_model(&model, &path, &meta).unwrap();

        assert!(path.is_file());
        assert!(dir.path().join("final_model.model.json").is_file());
        assert_eq!(load_meta(&path).unwrap().model, config);

        let restored = restore_model::<TestBackend>(&path, &config, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let a = model.forward(input.clone()).into_data();
        let b = restored.forward(input).into_data();
        assert_eq!(a, b);
    }

    #[test]
    fn test_weights_round_trip() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = small_config();
        let model = AreaRegressor::<TestBackend>::new(&config, &device);

        let path = dir.path().join("final_weights.bin");
        save_weights(&model, &path).unwrap();
        assert!(path.is_file());

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let restored = restore_model::<TestBackend>(&path, &config, &device).unwrap();
        assert_eq!(restored.parameter_count(), model.parameter_count());
    }

    #[test]
    fn test_restore_missing_file_is_recoverable_error() {
        let device = Default::default();
        let err = restore_model::<TestBackend>(Path::new("/missing/model.mpk"), &small_config(), &device)
            .unwrap_err();
        assert!(matches!(err, AreaError::Checkpoint(_)));
    }

    #[test]
    fn test_restore_corrupt_file_is_recoverable_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        fs::write(&path, b"garbage").unwrap();

        let device = Default::default();
        let err = restore_model::<TestBackend>(&path, &small_config(), &device).unwrap_err();
        assert!(matches!(err, AreaError::Checkpoint(_)));
    }
}
