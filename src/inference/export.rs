//! Evaluation artefacts
//!
//! Writes the per-image prediction table (`evaluation_predictions.csv`) and
//! the plain-text run summary (`results_summary.txt`).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::loader::SourceCount;
use crate::dataset::split::SplitStats;
use crate::training::transform::LogRange;
use crate::utils::error::Result;

/// One row of the prediction table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub file_path: String,
    pub ground_truth_area: f32,
    pub predicted_area: f32,
}

impl EvaluationRecord {
    /// Zip paths, labels and predictions into rows.
    ///
    /// When the label and prediction counts differ, both are cut to the
    /// shorter length. Rows without a path get `unknown_path_<i>`.
    pub fn assemble(paths: &[PathBuf], ground_truth: &[f32], predicted: &[f32]) -> Vec<Self> {
        let n = ground_truth.len().min(predicted.len());

        if ground_truth.len() != predicted.len() {
            warn!(
                "{} labels but {} predictions; exporting the first {}",
                ground_truth.len(),
                predicted.len(),
                n
            );
        }
        if paths.len() < n {
            warn!(
                "Only {} file paths for {} rows; using placeholders for the rest",
                paths.len(),
                n
            );
        }

        (0..n)
            .map(|i| EvaluationRecord {
                file_path: paths
                    .get(i)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("unknown_path_{}", i)),
                ground_truth_area: ground_truth[i],
                predicted_area: predicted[i],
            })
            .collect()
    }
}

/// Write rows as CSV with a `file_path,ground_truth_area,predicted_area` header
pub fn write_predictions_csv(path: &Path, records: &[EvaluationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Wrote {} predictions to {:?}", records.len(), path);
    Ok(())
}

/// What was evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationSource {
    TestDataset,
    TrainingPool,
}

impl fmt::Display for EvaluationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationSource::TestDataset => write!(f, "test dataset"),
            EvaluationSource::TrainingPool => write!(f, "training pool"),
        }
    }
}

/// Human-readable report of a finished run
#[derive(Debug, Clone)]
pub struct ResultsSummary {
    pub backbone: String,
    pub loss: String,
    pub log_transform: bool,
    pub log_range: Option<LogRange>,
    pub epochs_run: usize,
    pub pool_size: usize,
    pub source_counts: Vec<SourceCount>,
    pub zero_area_count: usize,
    pub split: SplitStats,
    pub final_train_loss: Option<f64>,
    pub final_train_percentage_error: Option<f64>,
    pub evaluation_source: EvaluationSource,
    pub evaluation_samples: usize,
    pub evaluation_loss: f64,
    pub evaluation_percentage_error: f64,
}

impl ResultsSummary {
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        info!("Results summary written to {:?}", path);
        Ok(())
    }
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Leaf-fragment area regression results")?;
        writeln!(f, "======================================")?;
        writeln!(f, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f)?;

        writeln!(f, "Model")?;
        writeln!(f, "  Backbone: {}", self.backbone)?;
        writeln!(f, "  Loss: {}", self.loss)?;
        writeln!(f, "  Log transform: {}", self.log_transform)?;
        if let Some(range) = &self.log_range {
            writeln!(f, "  Log range: {}", range)?;
        }
        writeln!(f)?;

        writeln!(f, "Data")?;
        writeln!(f, "  Pool size: {}", self.pool_size)?;
        for count in &self.source_counts {
            writeln!(f, "    {}: {}", count.kind.label(), count.count)?;
        }
        writeln!(f, "  Zero-area samples: {}", self.zero_area_count)?;
        writeln!(f, "  Hold-out split (not used for training): {}", self.split)?;
        writeln!(f)?;

        writeln!(f, "Training")?;
        writeln!(f, "  Epochs: {}", self.epochs_run)?;
        match (self.final_train_loss, self.final_train_percentage_error) {
            (Some(loss), Some(err)) => {
                writeln!(f, "  Final loss: {:.6}", loss)?;
                writeln!(f, "  Final percentage error: {:.2}%", err)?;
            }
            _ => writeln!(f, "  No training epochs were run")?,
        }
        writeln!(f)?;

        writeln!(f, "Evaluation ({})", self.evaluation_source)?;
        writeln!(f, "  Samples: {}", self.evaluation_samples)?;
        writeln!(f, "  Loss: {:.6}", self.evaluation_loss)?;
        writeln!(f, "  Percentage error: {:.2}%", self.evaluation_percentage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::SourceKind;
    use tempfile::tempdir;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("ants/ant{}_a{}_x.png", i, i)))
            .collect()
    }

    #[test]
    fn test_assemble_trims_to_shorter_length() {
        let truth: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let predicted: Vec<f32> = (0..8).map(|i| i as f32 + 0.5).collect();

        let records = EvaluationRecord::assemble(&paths(10), &truth, &predicted);
        assert_eq!(records.len(), 8);
        assert_eq!(records[7].ground_truth_area, 7.0);
        assert_eq!(records[7].predicted_area, 7.5);
    }

    #[test]
    fn test_assemble_uses_placeholder_paths() {
        let records = EvaluationRecord::assemble(&paths(2), &[1.0; 4], &[2.0; 4]);
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].file_path, "ants/ant1_a1_x.png");
        assert_eq!(records[2].file_path, "unknown_path_2");
        assert_eq!(records[3].file_path, "unknown_path_3");
    }

    #[test]
    fn test_csv_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("evaluation_predictions.csv");
        let records = EvaluationRecord::assemble(&paths(3), &[1.0, 2.0, 3.0], &[1.5, 2.5, 3.5]);
        write_predictions_csv(&path, &records).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "file_path,ground_truth_area,predicted_area");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "ants/ant0_a0_x.png,1.0,1.5");
    }

    #[test]
    fn test_summary_contents() {
        let summary = ResultsSummary {
            backbone: "simple".into(),
            loss: "mse_keras".into(),
            log_transform: true,
            log_range: Some(LogRange { min: 1.0, max: 2.0 }),
            epochs_run: 1,
            pool_size: 10,
            source_counts: vec![SourceCount {
                kind: SourceKind::RealCarrying,
                count: 10,
            }],
            zero_area_count: 0,
            split: SplitStats {
                train_size: 8,
                validation_size: 2,
            },
            final_train_loss: Some(0.25),
            final_train_percentage_error: Some(12.5),
            evaluation_source: EvaluationSource::TrainingPool,
            evaluation_samples: 10,
            evaluation_loss: 0.3,
            evaluation_percentage_error: 13.0,
        };

        let text = summary.to_string();
        assert!(text.contains("Backbone: simple"));
        assert!(text.contains("real carrying: 10"));
        assert!(text.contains("Evaluation (training pool)"));
        assert!(text.contains("Percentage error: 13.00%"));
    }
}
