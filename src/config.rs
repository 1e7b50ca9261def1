//! Run configuration
//!
//! One [`RunConfig`] describes a whole run. It can be read from TOML, is
//! overridden by command-line flags, and the resolved version is written to
//! `run_config.toml` in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::loader::DatasetSources;
use crate::dataset::split::SplitConfig;
use crate::model::RegressorConfig;
use crate::utils::error::{AreaError, Result, ResultExt};

/// File name of the resolved configuration inside the output directory
pub const RUN_CONFIG_FILE: &str = "run_config.toml";

/// Where the images come from and how targets are prepared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Held-out evaluation directory
    pub test_dataset: Option<PathBuf>,
    /// Size of the logged (unused) hold-out split
    pub validation_fraction: f64,
    pub augmentation: bool,
    pub log_transform: bool,
    pub sources: DatasetSources,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            test_dataset: None,
            validation_fraction: 0.2,
            augmentation: false,
            log_transform: false,
            sources: DatasetSources::default(),
        }
    }
}

/// Optimisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Checkpoint interval in epochs
    pub save_every: usize,
    pub learning_rate: f64,
    /// Loss selector: `mse_keras`, `mape_keras` or `custom_<alpha>_<beta>`
    pub loss: String,
    pub seed: u64,
    /// Reject unknown selectors instead of falling back
    pub strict_selectors: bool,
    /// Draw a progress bar for every epoch
    pub show_progress: bool,
    pub resume_from: Option<PathBuf>,
    /// Pretrained backbone record (`.mpk`)
    pub backbone_weights: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            save_every: 1,
            learning_rate: 1e-4,
            loss: "mse_keras".to_string(),
            seed: 42,
            strict_selectors: false,
            show_progress: true,
            resume_from: None,
            backbone_weights: None,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub data: DataConfig,
    pub model: RegressorConfig,
    pub training: TrainingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            data: DataConfig::default(),
            model: RegressorConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Configuration for a primary dataset directory, everything else default
    pub fn new<P: Into<PathBuf>>(dataset: P) -> Self {
        let mut config = Self::default();
        config.data.sources = DatasetSources::new(dataset);
        config
    }

    /// Read a TOML configuration file
    pub fn load_toml(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Write the configuration as TOML
    pub fn save_toml(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Split settings derived from the data and training sections
    pub fn split_config(&self) -> Result<SplitConfig> {
        SplitConfig::new(self.data.validation_fraction, self.training.seed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.sources.real_carrying.as_os_str().is_empty() {
            return Err(AreaError::Config(
                "A primary dataset directory is required".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(AreaError::Config("Output directory must not be empty".to_string()));
        }
        if self.training.batch_size == 0 {
            return Err(AreaError::Config("Batch size must be greater than 0".to_string()));
        }
        if self.training.save_every == 0 {
            return Err(AreaError::Config(
                "Checkpoint interval must be at least 1 epoch".to_string(),
            ));
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(AreaError::Config(format!(
                "Learning rate must be positive, got {}",
                self.training.learning_rate
            )));
        }

        self.split_config()?;
        self.model.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackboneKind;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RunConfig::new("data/carrying");
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.save_every, 1);
        assert_eq!(config.training.loss, "mse_keras");
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.model.backbone, BackboneKind::Simple);
        assert_eq!(config.model.image_size, 224);
        assert!(!config.data.augmentation);
        assert!(!config.data.log_transform);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert!(RunConfig::default().validate().is_err());

        let mut config = RunConfig::new("data");
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::new("data");
        config.training.learning_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::new("data");
        config.data.validation_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(RUN_CONFIG_FILE);

        let mut config = RunConfig::new("data/carrying");
        config.data.sources.synthetic_carrying = Some(PathBuf::from("data/synthetic"));
        config.data.log_transform = true;
        config.model.backbone = BackboneKind::EfficientNetB0;
        config.training.loss = "custom_0.7_0.3".to_string();
        config.training.resume_from = Some(PathBuf::from("out/final_model.mpk"));

        config.save_toml(&path).unwrap();
        assert_eq!(RunConfig::load_toml(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            "[data.sources]\nreal_carrying = \"ants\"\n\n[training]\nepochs = 3\n",
        )
        .unwrap();

        let config = RunConfig::load_toml(&path).unwrap();
        assert_eq!(config.data.sources.real_carrying, PathBuf::from("ants"));
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_unreadable_toml_is_config_error() {
        let err = RunConfig::load_toml(Path::new("/missing/run.toml")).unwrap_err();
        assert!(matches!(err, AreaError::Config(_)));
    }
}
