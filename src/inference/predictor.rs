//! Batched prediction with a trained regressor
//!
//! Predictions come out of the model in the training space and are mapped
//! back to pixel areas through the run's [`TargetContext`].

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use tracing::info;

use crate::dataset::burn_dataset::{AreaBatch, AreaBatcher, EpochPipeline};
use crate::model::AreaRegressor;
use crate::training::loss::{percentage_error, LossKind};
use crate::training::transform::TargetContext;
use crate::utils::error::Result;
use crate::utils::logging::ProgressLogger;

/// Per-sample predictions over an evaluation set plus aggregate scores
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub paths: Vec<PathBuf>,
    /// Labels in pixel area
    pub ground_truth: Vec<f32>,
    /// Predictions in pixel area
    pub predicted: Vec<f32>,
    /// Mean loss in the training space
    pub loss: f64,
    pub percentage_error: f64,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.predicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted.is_empty()
    }
}

/// Runs a regressor in inference mode
pub struct AreaPredictor<B: Backend> {
    model: AreaRegressor<B>,
    target: TargetContext,
    device: B::Device,
}

impl<B: Backend> AreaPredictor<B> {
    pub fn new(model: AreaRegressor<B>, target: TargetContext, device: B::Device) -> Self {
        Self {
            model,
            target,
            device,
        }
    }

    /// Raw model outputs (training space) for a batch of images
    pub fn predict_values(&self, images: Tensor<B, 4>) -> Vec<f32> {
        self.model
            .forward(images)
            .flatten::<1>(0, 1)
            .into_data()
            .iter::<f32>()
            .collect()
    }

    /// Predicted pixel areas for a batch of images
    pub fn predict_areas(&self, images: Tensor<B, 4>) -> Vec<f32> {
        self.target.to_areas(&self.predict_values(images))
    }

    /// Predict every sample of the pipeline in dataset order, without
    /// augmentation
    pub fn evaluate(&self, pipeline: &EpochPipeline, loss: LossKind) -> Result<Predictions> {
        let batcher = AreaBatcher::new(pipeline.dataset().image_size());
        let samples = pipeline.dataset().samples();
        let mut progress = ProgressLogger::new("Evaluating", pipeline.len());

        let mut out = Predictions::default();
        let mut loss_sum = 0.0f64;
        let mut error_sum = 0.0f64;

        for indices in pipeline.ordered_batches() {
            let items = pipeline.load_batch(&indices, None)?;
            let n = items.len();
            out.paths.extend(items.iter().map(|item| item.path.clone()));
            out.ground_truth.extend(indices.iter().map(|&i| samples[i].area));

            let batch: AreaBatch<B> = batcher.batch(items, &self.device);
            let values = self.model.forward(batch.images).flatten::<1>(0, 1);

            let batch_loss: f64 = loss
                .forward(values.clone(), batch.targets.clone())
                .into_scalar()
                .elem();
            let batch_error: f64 =
                percentage_error(values.clone(), batch.targets, self.target.transform)
                    .into_scalar()
                    .elem();
            loss_sum += batch_loss * n as f64;
            error_sum += batch_error * n as f64;

            let values: Vec<f32> = values.into_data().iter::<f32>().collect();
            out.predicted.extend(self.target.to_areas(&values));

            progress.advance(n);
        }

        let denom = out.len().max(1) as f64;
        out.loss = loss_sum / denom;
        out.percentage_error = error_sum / denom;

        info!(
            "Evaluation on {} samples: loss = {:.4}, pct error = {:.2}%",
            out.len(),
            out.loss,
            out.percentage_error
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::AreaDataset;
    use crate::dataset::loader::Sample;
    use crate::model::{BackboneKind, RegressorConfig};
    use crate::training::transform::TargetTransform;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn predictor(transform: TargetTransform) -> AreaPredictor<TestBackend> {
        let device = Default::default();
        let config = RegressorConfig::new(BackboneKind::Simple, 16);
        let model = AreaRegressor::new(&config, &device);
        AreaPredictor::new(model, TargetContext::new(transform, &[1.0]), device)
    }

    #[test]
    fn test_log_mode_predictions_are_exponentiated() {
        let p = predictor(TargetTransform::Log);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &Default::default());

        let values = p.predict_values(images.clone());
        let areas = p.predict_areas(images);
        assert_eq!(values.len(), 2);
        for (v, a) in values.iter().zip(&areas) {
            assert!((v.exp() - a).abs() < 1e-4 * a.max(1.0));
            assert!(*a > 0.0);
        }
    }

    #[test]
    fn test_evaluate_keeps_dataset_order() {
        let dir = tempdir().unwrap();
        let samples: Vec<Sample> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("ant{}_a{}_x.png", i, i + 2));
                RgbImage::from_pixel(12, 12, Rgb([10 * i as u8, 50, 90]))
                    .save(&path)
                    .unwrap();
                Sample {
                    path,
                    area: (i + 2) as f32,
                }
            })
            .collect();

        let pipeline = EpochPipeline::new(
            AreaDataset::new(samples.clone(), 16, TargetTransform::Identity),
            2,
            None,
            0,
        );

        let out = predictor(TargetTransform::Identity)
            .evaluate(&pipeline, LossKind::Mse)
            .unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(out.paths, samples.iter().map(|s| s.path.clone()).collect::<Vec<_>>());
        assert_eq!(out.ground_truth, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(out.loss.is_finite());
        assert!(out.percentage_error.is_finite());
    }
}
