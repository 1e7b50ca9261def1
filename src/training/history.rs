//! Per-epoch training history
//!
//! Scalars recorded after every epoch, saved as JSON at the end of training.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Metrics for a single epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub percentage_error: f64,
    pub learning_rate: f64,
    pub duration_secs: f64,
}

/// Training history record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub percentage_error: Vec<f64>,
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.loss.push(record.loss);
        self.percentage_error.push(record.percentage_error);
        self.epochs.push(record);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(epoch: usize, loss: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            loss,
            percentage_error: loss * 10.0,
            learning_rate: 1e-4,
            duration_secs: 1.5,
        }
    }

    #[test]
    fn test_push_keeps_series_aligned() {
        let mut history = TrainingHistory::new();
        assert!(history.final_loss().is_none());

        history.push(record(0, 2.0));
        history.push(record(1, 1.0));

        assert_eq!(history.len(), 2);
        assert_eq!(history.loss, vec![2.0, 1.0]);
        assert_eq!(history.percentage_error, vec![20.0, 10.0]);
        assert_eq!(history.final_loss(), Some(1.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("training_history.json");

        let mut history = TrainingHistory::new();
        history.push(record(0, 0.5));
        history.save(&path).unwrap();

        assert_eq!(TrainingHistory::load(&path).unwrap(), history);
    }
}
