//! End-to-end run driver
//!
//! Moves one run through its stages:
//!
//! ```text
//! Init -> Loading -> Assembled -> [CheckpointRestore] -> Compiled
//!      -> [Training] -> Evaluating -> Exported -> Done
//! ```
//!
//! Fatal conditions (no training data, unsupported checkpoint extension,
//! nothing to evaluate) abort the run with a typed error. Everything else
//! that can be recovered from is logged as a warning.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use crate::config::{RunConfig, RUN_CONFIG_FILE};
use crate::dataset::augmentation::Augmenter;
use crate::dataset::burn_dataset::{AreaDataset, EpochPipeline};
use crate::dataset::loader::{assemble_pool, scan_directory, Sample};
use crate::dataset::split::{shuffle_samples, HoldoutSplit, SplitStats};
use crate::inference::export::{
    write_predictions_csv, EvaluationRecord, EvaluationSource, ResultsSummary,
};
use crate::inference::predictor::{AreaPredictor, Predictions};
use crate::model::AreaRegressor;
use crate::training::checkpoint::{restore_model, save_full_model, save_weights, CheckpointMeta};
use crate::training::history::TrainingHistory;
use crate::training::loss::LossKind;
use crate::training::trainer::{fit, FitSettings};
use crate::training::transform::{TargetContext, TargetTransform};
use crate::utils::error::{AreaError, Result};

pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const FINAL_WEIGHTS_FILE: &str = "final_weights.bin";
pub const FINAL_MODEL_FILE: &str = "final_model.mpk";
pub const HISTORY_FILE: &str = "training_history.json";
pub const SUMMARY_FILE: &str = "results_summary.txt";
pub const PREDICTIONS_FILE: &str = "evaluation_predictions.csv";

/// Stages of a run, in the order they are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStage {
    Init,
    Loading,
    Assembled,
    CheckpointRestore,
    Compiled,
    Training,
    Evaluating,
    Exported,
    Done,
}

impl fmt::Display for DriverStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a finished run did and produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages: Vec<DriverStage>,
    pub pool_size: usize,
    pub split: SplitStats,
    pub target: TargetContext,
    pub loss: LossKind,
    pub history: TrainingHistory,
    /// Whether `resume_from` was actually loaded
    pub restored: bool,
    pub checkpoints: Vec<PathBuf>,
    pub evaluation_source: EvaluationSource,
    pub evaluation_samples: usize,
    pub evaluation_loss: f64,
    pub evaluation_percentage_error: f64,
    /// Every file written into the output directory
    pub artefacts: Vec<PathBuf>,
}

impl RunReport {
    pub fn visited(&self, stage: DriverStage) -> bool {
        self.stages.contains(&stage)
    }
}

struct StageLog(Vec<DriverStage>);

impl StageLog {
    fn enter(&mut self, stage: DriverStage) {
        info!("Stage: {}", stage);
        self.0.push(stage);
    }
}

/// Pick the evaluation samples: the test directory when it has images,
/// otherwise the training pool.
fn evaluation_samples(
    test_dir: Option<&PathBuf>,
    pool: &[Sample],
) -> Result<(Vec<Sample>, EvaluationSource)> {
    if let Some(dir) = test_dir.filter(|d| !d.as_os_str().is_empty()) {
        let scan = scan_directory(dir);
        if !scan.is_empty() {
            info!("Evaluating on {} test images from {:?}", scan.len(), dir);
            return Ok((scan.into_samples(), EvaluationSource::TestDataset));
        }
        warn!("Test dataset {:?} has no images", dir);
    }

    if pool.is_empty() {
        return Err(AreaError::NoEvaluationData);
    }

    warn!(
        "No test dataset available; evaluating on the {} training samples",
        pool.len()
    );
    Ok((pool.to_vec(), EvaluationSource::TrainingPool))
}

/// Execute a full run on backend `B`
pub fn run<B: AutodiffBackend>(config: &RunConfig, device: &B::Device) -> Result<RunReport> {
    let mut stages = StageLog(Vec::new());
    let mut artefacts = Vec::new();

    // Init
    stages.enter(DriverStage::Init);
    config.validate()?;
    let loss = LossKind::select(&config.training.loss, config.training.strict_selectors)?;
    let split_config = config.split_config()?;
    let output_dir = &config.output_dir;
    fs::create_dir_all(output_dir)?;

    let config_path = output_dir.join(RUN_CONFIG_FILE);
    config.save_toml(&config_path)?;
    artefacts.push(config_path);

    // Loading -> Assembled
    stages.enter(DriverStage::Loading);
    let pool = assemble_pool(&config.data.sources)?;
    stages.enter(DriverStage::Assembled);

    let transform = TargetTransform::from_flag(config.data.log_transform);
    let target = TargetContext::new(transform, &pool.labels());
    if let Some(range) = &target.log_range {
        info!("Log-space label range (diagnostic only): {}", range);
    }

    let mut samples = pool.samples.clone();
    shuffle_samples(&mut samples, split_config.seed);
    let split = HoldoutSplit::from_shuffled(&samples, &split_config).stats();
    info!("Hold-out split: {}", split);
    warn!(
        "The hold-out split is reported only; all {} samples are used for training",
        samples.len()
    );

    // CheckpointRestore -> Compiled
    let mut restored = false;
    let model = match &config.training.resume_from {
        Some(path) => {
            stages.enter(DriverStage::CheckpointRestore);
            match restore_model::<B>(path, &config.model, device) {
                Ok(model) => {
                    restored = true;
                    model
                }
                Err(e @ AreaError::UnsupportedCheckpoint(_)) => return Err(e),
                Err(e) => {
                    warn!("{}; starting from a fresh model", e);
                    AreaRegressor::new(&config.model, device)
                }
            }
        }
        None => AreaRegressor::new(&config.model, device),
    };

    let model = match &config.training.backbone_weights {
        Some(path) if !restored => model.load_backbone_weights(path, device),
        _ => model,
    };
    stages.enter(DriverStage::Compiled);
    info!(
        "Model: {} backbone, {} parameters, loss {}",
        config.model.backbone,
        model.parameter_count(),
        loss
    );

    let meta = CheckpointMeta::new(
        config.model.clone(),
        loss.to_string(),
        transform.is_log(),
        None,
    );

    // Training
    let mut history = TrainingHistory::new();
    let mut checkpoints = Vec::new();
    let model = if config.training.epochs > 0 {
        stages.enter(DriverStage::Training);

        let augmenter = config
            .data
            .augmentation
            .then(|| Augmenter::with_defaults(config.model.image_size));
        let pipeline = EpochPipeline::new(
            AreaDataset::new(samples.clone(), config.model.image_size, transform),
            config.training.batch_size,
            augmenter,
            config.training.seed,
        );

        let settings = FitSettings {
            epochs: config.training.epochs,
            learning_rate: config.training.learning_rate,
            save_every: config.training.save_every,
            checkpoint_dir: output_dir.join(CHECKPOINT_DIR),
            loss,
            target,
            meta: meta.clone(),
            show_progress: config.training.show_progress,
        };

        let outcome = fit(model, &pipeline, &settings, device)?;
        history = outcome.history;
        checkpoints = outcome.checkpoints;
        for path in &checkpoints {
            artefacts.push(path.clone());
        }

        let weights_path = output_dir.join(FINAL_WEIGHTS_FILE);
        save_weights(&outcome.model, &weights_path)?;
        artefacts.push(weights_path);

        let model_path = output_dir.join(FINAL_MODEL_FILE);
        let final_meta = CheckpointMeta {
            epoch: Some(config.training.epochs),
            ..meta
        };
        save_full_model(&outcome.model, &model_path, &final_meta)?;
        artefacts.push(model_path);

        let history_path = output_dir.join(HISTORY_FILE);
        history.save(&history_path)?;
        artefacts.push(history_path);

        outcome.model
    } else {
        info!("Epoch count is 0; skipping training");
        model
    };

    // Evaluating
    stages.enter(DriverStage::Evaluating);
    let (eval_samples, evaluation_source) =
        evaluation_samples(config.data.test_dataset.as_ref(), &samples)?;
    let eval_pipeline = EpochPipeline::new(
        AreaDataset::new(eval_samples, config.model.image_size, transform),
        config.training.batch_size,
        None,
        config.training.seed,
    );
    let predictor = AreaPredictor::new(model.valid(), target, device.clone());
    let predictions: Predictions = predictor.evaluate(&eval_pipeline, loss)?;

    // Exported
    let records = EvaluationRecord::assemble(
        &predictions.paths,
        &predictions.ground_truth,
        &predictions.predicted,
    );
    let csv_path = output_dir.join(PREDICTIONS_FILE);
    write_predictions_csv(&csv_path, &records)?;
    artefacts.push(csv_path);

    let summary = ResultsSummary {
        backbone: config.model.backbone.to_string(),
        loss: loss.to_string(),
        log_transform: transform.is_log(),
        log_range: target.log_range,
        epochs_run: history.len(),
        pool_size: pool.len(),
        source_counts: pool.counts.clone(),
        zero_area_count: pool.zero_area_count(),
        split,
        final_train_loss: history.final_loss(),
        final_train_percentage_error: history.percentage_error.last().copied(),
        evaluation_source,
        evaluation_samples: predictions.len(),
        evaluation_loss: predictions.loss,
        evaluation_percentage_error: predictions.percentage_error,
    };
    let summary_path = output_dir.join(SUMMARY_FILE);
    summary.write(&summary_path)?;
    artefacts.push(summary_path);
    stages.enter(DriverStage::Exported);

    stages.enter(DriverStage::Done);

    Ok(RunReport {
        stages: stages.0,
        pool_size: pool.len(),
        split,
        target,
        loss,
        history,
        restored,
        checkpoints,
        evaluation_source,
        evaluation_samples: predictions.len(),
        evaluation_loss: predictions.loss,
        evaluation_percentage_error: predictions.percentage_error,
        artefacts,
    })
}
