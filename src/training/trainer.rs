//! Fit loop
//!
//! A plain Burn training loop: shuffled batches from the epoch pipeline,
//! forward pass, loss, backward pass and an Adam step. Full-model snapshots
//! are written on the configured epoch interval.

use std::path::PathBuf;
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{AreaBatch, AreaBatcher, EpochPipeline};
use crate::model::AreaRegressor;
use crate::training::checkpoint::{save_full_model, CheckpointMeta};
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::training::loss::{percentage_error, LossKind};
use crate::training::transform::TargetContext;
use crate::utils::error::Result;
use crate::utils::logging::TrainingLogger;

/// Settings for one call to [`fit`]
#[derive(Debug, Clone)]
pub struct FitSettings {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Snapshot after every epoch whose 1-based number is a multiple of this
    pub save_every: usize,
    pub checkpoint_dir: PathBuf,
    pub loss: LossKind,
    pub target: TargetContext,
    /// Sidecar written next to every snapshot; `epoch` is filled in per save
    pub meta: CheckpointMeta,
    pub show_progress: bool,
}

impl FitSettings {
    /// Whether a snapshot is due after `epoch` (0-based)
    pub fn should_save(&self, epoch: usize) -> bool {
        self.save_every > 0 && (epoch + 1) % self.save_every == 0
    }

    /// Whether the backbone stays fixed, batch-norm statistics included
    pub fn freeze_backbone(&self) -> bool {
        !self.meta.model.fine_tune_backbone
    }

    /// Snapshot path for `epoch` (0-based): `epoch_001.mpk` for the first
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.checkpoint_dir.join(format!("epoch_{:03}.mpk", epoch + 1))
    }
}

/// Trained model plus what happened along the way
pub struct FitOutcome<B: AutodiffBackend> {
    pub model: AreaRegressor<B>,
    pub history: TrainingHistory,
    pub checkpoints: Vec<PathBuf>,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Train `model` for `settings.epochs` epochs over the pipeline
pub fn fit<B: AutodiffBackend>(
    mut model: AreaRegressor<B>,
    pipeline: &EpochPipeline,
    settings: &FitSettings,
    device: &B::Device,
) -> Result<FitOutcome<B>> {
    let batcher = AreaBatcher::new(pipeline.dataset().image_size());
    let mut optimizer = AdamConfig::new().init();
    let mut history = TrainingHistory::new();
    let mut checkpoints = Vec::new();
    let mut logger = TrainingLogger::new(settings.epochs);

    info!(
        "Training on {} samples, {} batches per epoch, loss {}",
        pipeline.len(),
        pipeline.num_batches(),
        settings.loss
    );

    for epoch in 0..settings.epochs {
        logger.start_epoch(epoch);
        let epoch_start = Instant::now();

        let batches = pipeline.epoch_batches(epoch);
        let pb = progress_bar(batches.len(), settings.show_progress);

        let mut loss_sum = 0.0f64;
        let mut error_sum = 0.0f64;
        let mut seen = 0usize;

        for (batch_idx, indices) in batches.iter().enumerate() {
            let items = pipeline.load_batch(indices, Some(epoch))?;
            let batch_len = items.len();
            let batch: AreaBatch<B> = batcher.batch(items, device);

            let predictions = model
                .forward_train(batch.images, settings.freeze_backbone())
                .flatten::<1>(0, 1);
            let loss = settings.loss.forward(predictions.clone(), batch.targets.clone());
            let error = percentage_error(
                predictions.detach(),
                batch.targets,
                settings.target.transform,
            );

            let loss_value: f64 = loss.clone().into_scalar().elem();
            let error_value: f64 = error.into_scalar().elem();
            loss_sum += loss_value * batch_len as f64;
            error_sum += error_value * batch_len as f64;
            seen += batch_len;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(settings.learning_rate, model, grads);

            debug!(
                "Batch {}/{}: loss = {:.4}, pct error = {:.2}%",
                batch_idx + 1,
                batches.len(),
                loss_value,
                error_value
            );
            pb.set_message(format!("loss {:.4}", loss_value));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let denom = seen.max(1) as f64;
        let record = EpochRecord {
            epoch,
            loss: loss_sum / denom,
            percentage_error: error_sum / denom,
            learning_rate: settings.learning_rate,
            duration_secs: epoch_start.elapsed().as_secs_f64(),
        };
        logger.end_epoch(record.loss, record.percentage_error);
        history.push(record);

        if settings.should_save(epoch) {
            let path = settings.checkpoint_path(epoch);
            let meta = CheckpointMeta {
                epoch: Some(epoch + 1),
                ..settings.meta.clone()
            };
            save_full_model(&model, &path, &meta)?;
            checkpoints.push(path);
        }
    }

    logger.log_complete(history.final_loss());

    Ok(FitOutcome {
        model,
        history,
        checkpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::AreaDataset;
    use crate::dataset::loader::Sample;
    use crate::model::{BackboneKind, RegressorConfig};
    use crate::training::transform::TargetTransform;
    use burn::backend::Autodiff;
    use burn::module::AutodiffModule;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn settings(dir: &std::path::Path, epochs: usize, save_every: usize) -> FitSettings {
        let config = RegressorConfig::new(BackboneKind::Simple, 16);
        FitSettings {
            epochs,
            learning_rate: 1e-3,
            save_every,
            checkpoint_dir: dir.join("checkpoints"),
            loss: LossKind::Mse,
            target: TargetContext::default(),
            meta: CheckpointMeta::new(config, "mse_keras".into(), false, None),
            show_progress: false,
        }
    }

    #[test]
    fn test_save_schedule() {
        let s = settings(std::path::Path::new("out"), 5, 2);
        assert!(!s.should_save(0));
        assert!(s.should_save(1));
        assert!(s.should_save(3));
        assert_eq!(
            s.checkpoint_path(0),
            PathBuf::from("out/checkpoints/epoch_001.mpk")
        );

        let never = settings(std::path::Path::new("out"), 5, 0);
        assert!(!never.should_save(0));
    }

    fn write_samples(dir: &std::path::Path, n: usize, size: u32) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("ant{}_a{}_x.png", i, i + 1));
                RgbImage::from_pixel(size, size, Rgb([(i * 40) as u8, 80, 120]))
                    .save(&path)
                    .unwrap();
                Sample {
                    path,
                    area: (i + 1) as f32,
                }
            })
            .collect()
    }

    /// Backbone features for a fixed input, in inference mode
    fn backbone_features(model: &AreaRegressor<TestBackend>, size: usize) -> Vec<f32> {
        let device = Default::default();
        let input = Tensor::<NdArray<f32>, 4>::ones([1, 3, size, size], &device).mul_scalar(0.5);
        match model.valid() {
            AreaRegressor::Transfer(transfer) => transfer
                .backbone
                .forward(input)
                .into_data()
                .iter::<f32>()
                .collect(),
            AreaRegressor::Shallow(_) => panic!("expected a transfer model"),
        }
    }

    #[test]
    fn test_fit_records_history_and_snapshots() {
        let dir = tempdir().unwrap();
        let samples = write_samples(dir.path(), 5, 16);

        let pipeline = EpochPipeline::new(
            AreaDataset::new(samples, 16, TargetTransform::Identity),
            2,
            None,
            42,
        );
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::Simple, 16);
        let model = AreaRegressor::<TestBackend>::new(&config, &device);

        let s = settings(dir.path(), 2, 1);
        let outcome = fit(model, &pipeline, &s, &device).unwrap();

        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history.loss.iter().all(|l| l.is_finite()));
        assert_eq!(outcome.checkpoints.len(), 2);
        assert!(dir.path().join("checkpoints/epoch_002.mpk").is_file());
        assert!(dir.path().join("checkpoints/epoch_002.model.json").is_file());
    }

    #[test]
    fn test_frozen_backbone_is_unchanged_by_fit() {
        let dir = tempdir().unwrap();
        let samples = write_samples(dir.path(), 2, 32);
        let pipeline = EpochPipeline::new(
            AreaDataset::new(samples, 32, TargetTransform::Identity),
            2,
            None,
            7,
        );
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::EfficientNetB0, 32);
        let model = AreaRegressor::<TestBackend>::new(&config, &device);
        let before = backbone_features(&model, 32);

        let s = FitSettings {
            meta: CheckpointMeta::new(config, "mse_keras".into(), false, None),
            ..settings(dir.path(), 1, 5)
        };
        assert!(s.freeze_backbone());
        let outcome = fit(model, &pipeline, &s, &device).unwrap();

        assert!(outcome.history.loss[0].is_finite());
        assert_eq!(backbone_features(&outcome.model, 32), before);
    }
}
