//! Dataset Loader
//!
//! Scans image directories, reads area labels out of file names and merges
//! the real and synthetic sources into one ordered sample pool.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::labels::area_from_path;
use crate::utils::error::{AreaError, Result};

/// Image extensions picked up by the scanner (compared lowercase)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// A single image with its area label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file
    pub path: PathBuf,
    /// Fragment area in pixels, `0.0` for non-carrying or unlabeled images
    pub area: f32,
}

/// Parallel path/label sequences produced by a directory scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub paths: Vec<PathBuf>,
    pub labels: Vec<f32>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Zip paths and labels back into samples
    pub fn into_samples(self) -> Vec<Sample> {
        self.paths
            .into_iter()
            .zip(self.labels)
            .map(|(path, area)| Sample { path, area })
            .collect()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_resource_fork(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("._"))
}

/// Recursively scan a directory for labeled images.
///
/// A directory that does not exist contributes nothing and only logs a
/// warning. Entries are visited in file-name order.
pub fn scan_directory<P: AsRef<Path>>(dir: P) -> ScanResult {
    let dir = dir.as_ref();
    let mut result = ScanResult::default();

    if !dir.is_dir() {
        warn!("Dataset directory does not exist: {:?}", dir);
        return result;
    }

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_image_file(path) || is_resource_fork(path) {
            continue;
        }

        result.labels.push(area_from_path(path));
        result.paths.push(path.to_path_buf());
    }

    debug!("Scanned {:?}: {} images", dir, result.len());
    result
}

/// Which role a directory plays in the training pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    RealCarrying,
    RealNonCarrying,
    SyntheticCarrying,
    SyntheticNonCarrying,
}

impl SourceKind {
    /// Assembly order of the pool
    pub const ORDER: [SourceKind; 4] = [
        SourceKind::RealCarrying,
        SourceKind::RealNonCarrying,
        SourceKind::SyntheticCarrying,
        SourceKind::SyntheticNonCarrying,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::RealCarrying => "real carrying",
            SourceKind::RealNonCarrying => "real non-carrying",
            SourceKind::SyntheticCarrying => "synthetic carrying",
            SourceKind::SyntheticNonCarrying => "synthetic non-carrying",
        }
    }
}

/// Directories feeding the training pool
///
/// Directories are used exactly as given; nothing is inferred from their
/// names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSources {
    pub real_carrying: PathBuf,
    pub real_non_carrying: Option<PathBuf>,
    pub synthetic_carrying: Option<PathBuf>,
    pub synthetic_non_carrying: Option<PathBuf>,
}

impl DatasetSources {
    pub fn new<P: Into<PathBuf>>(real_carrying: P) -> Self {
        Self {
            real_carrying: real_carrying.into(),
            ..Self::default()
        }
    }

    /// Directory for a source, skipping unset or empty paths
    pub fn dir(&self, kind: SourceKind) -> Option<&Path> {
        let dir = match kind {
            SourceKind::RealCarrying => Some(&self.real_carrying),
            SourceKind::RealNonCarrying => self.real_non_carrying.as_ref(),
            SourceKind::SyntheticCarrying => self.synthetic_carrying.as_ref(),
            SourceKind::SyntheticNonCarrying => self.synthetic_non_carrying.as_ref(),
        }?;

        if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir.as_path())
        }
    }
}

/// Samples contributed by one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    pub kind: SourceKind,
    pub count: usize,
}

/// Ordered union of every source
#[derive(Debug, Clone, Default)]
pub struct SamplePool {
    pub samples: Vec<Sample>,
    pub counts: Vec<SourceCount>,
}

impl SamplePool {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.samples.iter().map(|s| s.path.clone()).collect()
    }

    pub fn labels(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.area).collect()
    }

    /// Number of samples labeled exactly zero
    pub fn zero_area_count(&self) -> usize {
        self.samples.iter().filter(|s| s.area == 0.0).count()
    }
}

/// Scan every configured source and concatenate them in assembly order.
///
/// Fails with [`AreaError::NoTrainingData`] when no source yields a sample.
pub fn assemble_pool(sources: &DatasetSources) -> Result<SamplePool> {
    let mut pool = SamplePool::default();

    for kind in SourceKind::ORDER {
        let Some(dir) = sources.dir(kind) else {
            continue;
        };

        let scan = scan_directory(dir);
        info!("Found {} {} images in {:?}", scan.len(), kind.label(), dir);

        pool.counts.push(SourceCount {
            kind,
            count: scan.len(),
        });
        pool.samples.extend(scan.into_samples());
    }

    if pool.is_empty() {
        let scanned = pool
            .counts
            .iter()
            .map(|c| c.kind.label())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AreaError::NoTrainingData(format!("scanned: {}", scanned)));
    }

    info!(
        "Assembled pool of {} samples ({} with zero area)",
        pool.len(),
        pool.zero_area_count()
    );

    Ok(pool)
}

/// Decode an image, convert it to floats in `[0, 1]` and resize it.
///
/// Returns CHW data with shape `[3, image_size, image_size]`.
pub fn load_image_tensor(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    let decoded = ImageReader::open(path)
        .map_err(|e| AreaError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| AreaError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    let size = image_size as u32;
    let rgb = DynamicImage::ImageRgb32F(decoded.to_rgb32f())
        .resize_exact(size, size, FilterType::Triangle)
        .into_rgb32f();

    let plane = image_size * image_size;
    let mut tensor = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * image_size + x as usize;
        for c in 0..3 {
            tensor[c * plane + offset] = pixel[c].clamp(0.0, 1.0);
        }
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, color: [u8; 3]) {
        let img = RgbImage::from_pixel(8, 6, Rgb(color));
        img.save(path).unwrap();
    }

    #[test]
    fn test_scan_filters_and_labels() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("b_a2.5_x.png"), [10, 20, 30]);
        write_png(&dir.path().join("a_a1_x.PNG"), [10, 20, 30]);
        write_png(&dir.path().join("._a_a3_x.png"), [10, 20, 30]);
        std::fs::write(dir.path().join("notes_a4_x.txt"), "not an image").unwrap();

        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        write_png(&nested.join("c.png"), [0, 0, 0]);

        let scan = scan_directory(dir.path());
        assert_eq!(scan.len(), 3);
        assert_eq!(scan.labels, vec![1.0, 2.5, 0.0]);
        assert!(scan.paths[0].ends_with("a_a1_x.PNG"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let scan = scan_directory("/definitely/not/here");
        assert!(scan.is_empty());
        assert!(scan.labels.is_empty());
    }

    #[test]
    fn test_assemble_order() {
        let real = tempdir().unwrap();
        let synthetic = tempdir().unwrap();
        write_png(&real.path().join("r_a5_x.png"), [1, 2, 3]);
        write_png(&synthetic.path().join("s_a9_x.png"), [1, 2, 3]);
        write_png(&synthetic.path().join("t.png"), [1, 2, 3]);

        let sources = DatasetSources {
            real_carrying: real.path().to_path_buf(),
            real_non_carrying: Some(PathBuf::from("/missing/non/carrying")),
            synthetic_carrying: None,
            synthetic_non_carrying: Some(synthetic.path().to_path_buf()),
        };

        let pool = assemble_pool(&sources).unwrap();
        assert_eq!(pool.labels(), vec![5.0, 9.0, 0.0]);
        assert_eq!(pool.zero_area_count(), 1);
        assert_eq!(pool.counts.len(), 3);
        assert_eq!(pool.counts[1].count, 0);
        assert_eq!(pool.counts[2].kind, SourceKind::SyntheticNonCarrying);
    }

    #[test]
    fn test_assemble_empty_is_fatal() {
        let empty = tempdir().unwrap();
        let err = assemble_pool(&DatasetSources::new(empty.path())).unwrap_err();
        assert!(matches!(err, AreaError::NoTrainingData(_)));
        assert_eq!(err.exit_code(), crate::utils::error::EXIT_NO_TRAINING_DATA);
    }

    #[test]
    fn test_empty_optional_path_is_skipped() {
        let sources = DatasetSources {
            real_non_carrying: Some(PathBuf::new()),
            ..DatasetSources::new("/data/real")
        };
        assert!(sources.dir(SourceKind::RealNonCarrying).is_none());
        assert!(sources.dir(SourceKind::SyntheticCarrying).is_none());
    }

    #[test]
    fn test_load_image_tensor_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("red_a1_x.png");
        write_png(&path, [255, 0, 0]);

        let tensor = load_image_tensor(&path, 4).unwrap();
        assert_eq!(tensor.len(), 3 * 4 * 4);
        assert!((tensor[0] - 1.0).abs() < 1e-4);
        assert!(tensor[16].abs() < 1e-4);
        assert!(tensor[32].abs() < 1e-4);
    }

    #[test]
    fn test_load_image_missing_file() {
        let err = load_image_tensor(Path::new("/missing/ant_a1_x.png"), 4).unwrap_err();
        assert!(matches!(err, AreaError::ImageLoad(_, _)));
    }
}
