//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits for area regression and
//! the per-epoch pipeline that shuffles the pool, decodes a batch in
//! parallel and optionally augments it.
//!
//! Each sample's augmentation RNG is derived from `(seed, epoch, index)`,
//! so results do not depend on how rayon schedules the work.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::warn;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::loader::{load_image_tensor, Sample};
use crate::training::transform::TargetTransform;
use crate::utils::error::Result;

/// A single decoded sample ready for Burn
#[derive(Clone, Debug)]
pub struct AreaItem {
    /// Image data as flattened CHW float array [3 * H * W] in `[0, 1]`
    pub image: Vec<f32>,
    /// Label in the training space
    pub target: f32,
    /// Image path (for export and logging)
    pub path: PathBuf,
}

impl AreaItem {
    /// Decode, resize and transform the label of one sample
    pub fn from_sample(
        sample: &Sample,
        image_size: usize,
        transform: TargetTransform,
    ) -> Result<Self> {
        let image = load_image_tensor(&sample.path, image_size)?;

        Ok(Self {
            image,
            target: transform.forward(sample.area),
            path: sample.path.clone(),
        })
    }
}

/// Lazily decoded area regression dataset
#[derive(Debug, Clone)]
pub struct AreaDataset {
    samples: Vec<Sample>,
    image_size: usize,
    transform: TargetTransform,
}

impl AreaDataset {
    pub fn new(samples: Vec<Sample>, image_size: usize, transform: TargetTransform) -> Self {
        Self {
            samples,
            image_size,
            transform,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Decode one sample, propagating decode failures
    pub fn load(&self, index: usize) -> Result<AreaItem> {
        AreaItem::from_sample(&self.samples[index], self.image_size, self.transform)
    }
}

impl Dataset<AreaItem> for AreaDataset {
    fn get(&self, index: usize) -> Option<AreaItem> {
        if index >= self.samples.len() {
            return None;
        }
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with their regression targets
#[derive(Clone, Debug)]
pub struct AreaBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Targets with shape [batch_size]
    pub targets: Tensor<B, 1>,
}

/// Batcher stacking decoded items into tensors
///
/// Pixel values stay in `[0, 1]`; each model rescales its own input.
#[derive(Clone, Debug)]
pub struct AreaBatcher {
    image_size: usize,
}

impl AreaBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, AreaItem, AreaBatch<B>> for AreaBatcher {
    fn batch(&self, items: Vec<AreaItem>, device: &B::Device) -> AreaBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let targets_data: Vec<f32> = items.iter().map(|item| item.target).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );
        let targets =
            Tensor::<B, 1>::from_floats(TensorData::new(targets_data, [batch_size]), device);

        AreaBatch { images, targets }
    }
}

/// Seed for one sample in one epoch
pub fn sample_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    seed ^ (epoch as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64 + 1).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Shuffled, optionally augmented batches over a dataset
pub struct EpochPipeline {
    dataset: AreaDataset,
    batch_size: usize,
    augmenter: Option<Augmenter>,
    seed: u64,
}

impl EpochPipeline {
    pub fn new(
        dataset: AreaDataset,
        batch_size: usize,
        augmenter: Option<Augmenter>,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            augmenter,
            seed,
        }
    }

    pub fn dataset(&self) -> &AreaDataset {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Number of batches per epoch, counting the last partial batch
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Full-pool shuffle for an epoch, cut into batches of indices
    pub fn epoch_batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(sample_seed(self.seed, epoch, 0));
        indices.shuffle(&mut rng);
        self.chunk(indices)
    }

    /// Batches in dataset order (evaluation)
    pub fn ordered_batches(&self) -> Vec<Vec<usize>> {
        self.chunk((0..self.len()).collect())
    }

    fn chunk(&self, indices: Vec<usize>) -> Vec<Vec<usize>> {
        indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Decode a batch in parallel; `epoch` enables augmentation
    pub fn load_batch(&self, indices: &[usize], epoch: Option<usize>) -> Result<Vec<AreaItem>> {
        indices
            .par_iter()
            .map(|&index| -> Result<AreaItem> {
                let mut item = self.dataset.load(index)?;
                if let (Some(augmenter), Some(epoch)) = (&self.augmenter, epoch) {
                    let mut rng = ChaCha8Rng::seed_from_u64(sample_seed(self.seed, epoch, index));
                    item.image = augmenter.augment(item.image, &mut rng);
                }
                Ok(item)
            })
            .collect()
    }
}
