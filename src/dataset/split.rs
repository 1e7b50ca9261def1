//! Seeded shuffling and the hold-out split
//!
//! The pool is shuffled once with a fixed seed and a validation hold-out is
//! carved from its tail. The hold-out is reported, but training still
//! consumes the whole shuffled pool.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::Sample;
use crate::utils::error::{AreaError, Result};

/// Configuration for the hold-out split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of the pool held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(AreaError::Config(
                "Validation fraction must be in [0.0, 1.0)".to_string(),
            ));
        }

        Ok(Self {
            validation_fraction,
            seed,
        })
    }
}

/// Shuffle samples in place with a seeded generator
pub fn shuffle_samples(samples: &mut [Sample], seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    samples.shuffle(&mut rng);
}

/// Train/validation partition of an already shuffled pool
#[derive(Debug, Clone)]
pub struct HoldoutSplit {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

impl HoldoutSplit {
    /// Split the tail of `samples` off as the validation set
    pub fn from_shuffled(samples: &[Sample], config: &SplitConfig) -> Self {
        let n = samples.len();
        let n_val = ((n as f64 * config.validation_fraction).floor() as usize).min(n);
        let n_train = n - n_val;

        Self {
            train: samples[..n_train].to_vec(),
            validation: samples[n_train..].to_vec(),
        }
    }

    pub fn stats(&self) -> SplitStats {
        SplitStats {
            train_size: self.train.len(),
            validation_size: self.validation.len(),
        }
    }
}

/// Sizes of both sides of a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitStats {
    pub train_size: usize,
    pub validation_size: usize,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = (self.train_size + self.validation_size).max(1) as f64;
        write!(
            f,
            "train {} ({:.1}%), validation {} ({:.1}%)",
            self.train_size,
            100.0 * self.train_size as f64 / total,
            self.validation_size,
            100.0 * self.validation_size as f64 / total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                path: PathBuf::from(format!("ant{}_a{}_x.png", i, i)),
                area: i as f32,
            })
            .collect()
    }

    #[test]
    fn test_shuffle_reproducibility() {
        let mut a = create_samples(50);
        let mut b = create_samples(50);
        shuffle_samples(&mut a, 42);
        shuffle_samples(&mut b, 42);
        assert_eq!(a, b);
        assert_ne!(a, create_samples(50));
    }

    #[test]
    fn test_split_sizes() {
        let samples = create_samples(10);
        let split = HoldoutSplit::from_shuffled(&samples, &SplitConfig::default());
        assert_eq!(split.stats().train_size, 8);
        assert_eq!(split.stats().validation_size, 2);
        assert_eq!(split.validation[0].area, 8.0);
    }

    #[test]
    fn test_split_config_validation() {
        assert!(SplitConfig::new(0.2, 1).is_ok());
        assert!(SplitConfig::new(1.0, 1).is_err());
        assert!(SplitConfig::new(-0.1, 1).is_err());
    }

    #[test]
    fn test_split_stats_display() {
        let stats = SplitStats {
            train_size: 3,
            validation_size: 1,
        };
        assert_eq!(
            stats.to_string(),
            "train 3 (75.0%), validation 1 (25.0%)"
        );
    }
}
