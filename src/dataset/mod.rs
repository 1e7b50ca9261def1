//! Dataset module for labeled ant images
//!
//! This module handles:
//! - Area labels encoded in file names
//! - Scanning and merging the real and synthetic image sources
//! - The seeded hold-out split
//! - Augmentation and Burn dataset/batcher integration

pub mod augmentation;
pub mod burn_dataset;
pub mod labels;
pub mod loader;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{AreaBatch, AreaBatcher, AreaDataset, AreaItem, EpochPipeline};
pub use labels::{area_from_file_name, area_from_path};
pub use loader::{assemble_pool, scan_directory, DatasetSources, Sample, SamplePool, ScanResult};
pub use split::{HoldoutSplit, SplitConfig};
