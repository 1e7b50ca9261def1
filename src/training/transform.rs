//! Target transform and the log-range diagnostic
//!
//! Areas can be trained either as-is or in natural-log space. The active
//! mode travels in a [`TargetContext`] to every piece of code that has to
//! map values between the training space and pixel areas.

use serde::{Deserialize, Serialize};

/// Smallest value fed to `ln`, so zero-area samples map to a finite target
pub const LOG_EPSILON: f32 = 1e-9;

const RANGE_PADDING: f64 = 0.05;
const RANGE_FLOOR: f64 = 1e-7;
const DEFAULT_RANGE: (f64, f64) = (1e-4, 0.05);

/// Space the model is trained in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetTransform {
    /// Raw pixel areas
    #[default]
    Identity,
    /// `ln(max(area, LOG_EPSILON))`
    Log,
}

impl TargetTransform {
    pub fn from_flag(log_transform: bool) -> Self {
        if log_transform {
            TargetTransform::Log
        } else {
            TargetTransform::Identity
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, TargetTransform::Log)
    }

    /// Map an area into the training space
    pub fn forward(&self, area: f32) -> f32 {
        match self {
            TargetTransform::Identity => area,
            TargetTransform::Log => area.max(LOG_EPSILON).ln(),
        }
    }

    /// Map a training-space value back to an area
    pub fn inverse(&self, value: f32) -> f32 {
        match self {
            TargetTransform::Identity => value,
            TargetTransform::Log => value.exp(),
        }
    }
}

/// Padded range of the positive labels.
///
/// Informational only: it is logged and reported, never used to clamp
/// inputs or predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRange {
    pub min: f64,
    pub max: f64,
}

impl LogRange {
    /// Compute the range over the strictly positive labels
    pub fn from_labels(labels: &[f32]) -> Self {
        let positive: Vec<f64> = labels
            .iter()
            .filter(|&&v| v > 0.0)
            .map(|&v| v as f64)
            .collect();

        if positive.is_empty() {
            return Self {
                min: DEFAULT_RANGE.0,
                max: DEFAULT_RANGE.1,
            };
        }

        let lo = positive.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = positive.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;

        let (min, max) = if range < RANGE_FLOOR {
            let center = lo.max(RANGE_FLOOR);
            let pad = (center * RANGE_PADDING).max(RANGE_FLOOR);
            (center - pad, center + pad)
        } else {
            let pad = range * RANGE_PADDING;
            (lo - pad, hi + pad)
        };

        // Flooring `min` can swallow the gap for labels below the floor
        let min = min.max(RANGE_FLOOR);
        let max = max.max(min + 2.0 * RANGE_FLOOR);

        Self { min, max }
    }
}

impl std::fmt::Display for LogRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.6e}, {:.6e}]", self.min, self.max)
    }
}

/// Target mode plus the diagnostic computed when log mode is on
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetContext {
    pub transform: TargetTransform,
    pub log_range: Option<LogRange>,
}

impl TargetContext {
    /// Build the context for a label pool, computing the diagnostic in log mode
    pub fn new(transform: TargetTransform, labels: &[f32]) -> Self {
        let log_range = transform.is_log().then(|| LogRange::from_labels(labels));
        Self {
            transform,
            log_range,
        }
    }

    /// Map a batch of training-space values back to areas
    pub fn to_areas(&self, values: &[f32]) -> Vec<f32> {
        values.iter().map(|&v| self.transform.inverse(v)).collect()
    }
}
