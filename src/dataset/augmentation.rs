//! Data Augmentation Module
//!
//! On-the-fly augmentations applied to resized CHW float images in `[0, 1]`.
//! A single coin flip per sample decides whether the whole chain runs; inside
//! the chain every transform draws its own random parameters.
//!
//! Geometric transforms fill uncovered pixels by reflecting the image at its
//! borders, so no black corners appear after rotation or zoom-out.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Probability that a sample goes through the augmentation chain at all
    pub apply_prob: f32,
    /// Probability of a horizontal flip once the chain runs
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum relative zoom (scale drawn from 1.0 ± zoom_delta)
    pub zoom_delta: f32,
    /// Brightness adjustment range (±brightness_delta)
    pub brightness_delta: f32,
    /// Contrast adjustment range (1.0 ± contrast_delta)
    pub contrast_delta: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            apply_prob: 0.5,
            horizontal_flip_prob: 0.5,
            // 0.017 of a full turn
            rotation_degrees: 6.12,
            zoom_delta: 0.1,
            brightness_delta: 0.1,
            contrast_delta: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for evaluation)
    pub fn none() -> Self {
        Self {
            apply_prob: 0.0,
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            zoom_delta: 0.0,
            brightness_delta: 0.0,
            contrast_delta: 0.0,
        }
    }
}

/// Image augmenter working on square CHW float buffers
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: usize,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig, image_size: usize) -> Self {
        Self { config, image_size }
    }

    /// Create an augmenter with the default chain
    pub fn with_defaults(image_size: usize) -> Self {
        Self::new(AugmentationConfig::default(), image_size)
    }

    /// Run the augmentation chain on one sample with probability `apply_prob`
    pub fn augment(&self, data: Vec<f32>, rng: &mut ChaCha8Rng) -> Vec<f32> {
        if rng.gen::<f32>() >= self.config.apply_prob {
            return data;
        }

        let mut result = data;

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = self.flip_horizontal(&result);
        }

        if self.config.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = self.rotate(&result, angle);
        }

        if self.config.zoom_delta > 0.0 {
            let scale = 1.0 + rng.gen_range(-self.config.zoom_delta..=self.config.zoom_delta);
            result = self.zoom(&result, scale);
        }

        if self.config.brightness_delta > 0.0 {
            let delta = rng.gen_range(-self.config.brightness_delta..=self.config.brightness_delta);
            result = self.adjust_brightness(&result, delta);
        }

        if self.config.contrast_delta > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.config.contrast_delta..=self.config.contrast_delta);
            result = self.adjust_contrast(&result, factor);
        }

        result
    }

    fn plane(&self) -> usize {
        self.image_size * self.image_size
    }

    /// Mirror every row
    fn flip_horizontal(&self, data: &[f32]) -> Vec<f32> {
        let size = self.image_size;
        let mut output = vec![0.0f32; data.len()];

        for c in 0..3 {
            let base = c * self.plane();
            for y in 0..size {
                for x in 0..size {
                    output[base + y * size + x] = data[base + y * size + (size - 1 - x)];
                }
            }
        }

        output
    }

    /// Rotate around the image center by the given angle in degrees
    fn rotate(&self, data: &[f32], angle_degrees: f32) -> Vec<f32> {
        let angle_rad = angle_degrees.to_radians();
        let (sin_a, cos_a) = angle_rad.sin_cos();
        let center = (self.image_size as f32 - 1.0) / 2.0;

        self.resample(data, |x, y| {
            let dx = x - center;
            let dy = y - center;
            (
                center + dx * cos_a + dy * sin_a,
                center - dx * sin_a + dy * cos_a,
            )
        })
    }

    /// Scale around the image center; `scale > 1` zooms out
    fn zoom(&self, data: &[f32], scale: f32) -> Vec<f32> {
        let center = (self.image_size as f32 - 1.0) / 2.0;

        self.resample(data, |x, y| {
            (center + (x - center) * scale, center + (y - center) * scale)
        })
    }

    /// Inverse-map every output pixel and sample the source bilinearly
    fn resample<F>(&self, data: &[f32], source_of: F) -> Vec<f32>
    where
        F: Fn(f32, f32) -> (f32, f32),
    {
        let size = self.image_size;
        let mut output = vec![0.0f32; data.len()];

        for y in 0..size {
            for x in 0..size {
                let (src_x, src_y) = source_of(x as f32, y as f32);
                for c in 0..3 {
                    output[c * self.plane() + y * size + x] =
                        self.bilinear_sample(data, c, src_x, src_y);
                }
            }
        }

        output
    }

    /// Bilinear sample with reflected out-of-bounds neighbours
    fn bilinear_sample(&self, data: &[f32], channel: usize, x: f32, y: f32) -> f32 {
        let size = self.image_size;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let xi0 = reflect_index(x0 as i64, size);
        let xi1 = reflect_index(x0 as i64 + 1, size);
        let yi0 = reflect_index(y0 as i64, size);
        let yi1 = reflect_index(y0 as i64 + 1, size);

        let base = channel * self.plane();
        let at = |xi: usize, yi: usize| data[base + yi * size + xi];

        at(xi0, yi0) * (1.0 - fx) * (1.0 - fy)
            + at(xi1, yi0) * fx * (1.0 - fy)
            + at(xi0, yi1) * (1.0 - fx) * fy
            + at(xi1, yi1) * fx * fy
    }

    /// Add `delta` to every value, clipped to `[0, 1]`
    fn adjust_brightness(&self, data: &[f32], delta: f32) -> Vec<f32> {
        data.iter().map(|v| (v + delta).clamp(0.0, 1.0)).collect()
    }

    /// Scale each channel around its own mean, clipped to `[0, 1]`
    fn adjust_contrast(&self, data: &[f32], factor: f32) -> Vec<f32> {
        let plane = self.plane();
        let mut output = Vec::with_capacity(data.len());

        for channel in data.chunks(plane) {
            let mean = channel.iter().sum::<f32>() / channel.len().max(1) as f32;
            output.extend(
                channel
                    .iter()
                    .map(|v| (mean + factor * (v - mean)).clamp(0.0, 1.0)),
            );
        }

        output
    }
}

/// Map any integer coordinate into `0..size` by mirroring at the edges
/// (`d c b a | a b c d | d c b a`)
fn reflect_index(index: i64, size: usize) -> usize {
    let n = size as i64;
    if n <= 1 {
        return 0;
    }

    let period = 2 * n;
    let m = index.rem_euclid(period);
    if m >= n {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}
