use crate::error::{AppError, Result};
use crate::ml::evaluation::{self, confusion_matrix, predict_labels};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::{Display, EnumString};

/// Recall an early-stage investor expects before accepting a threshold
pub const EARLY_STAGE_RECALL: f64 = 0.95;

/// Precision a conservative investor expects before accepting a threshold
pub const CONSERVATIVE_PRECISION: f64 = 0.90;

/// Rule used to pick the serving threshold from the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ThresholdObjective {
    /// Highest F1
    F1,
    /// Highest precision among thresholds meeting the recall floor
    RecallConstrained,
    /// Highest accuracy
    Accuracy,
    /// Fewest false positives plus false negatives
    MinErrors,
}

/// Threshold scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub objective: ThresholdObjective,

    /// Recall floor for the recall-constrained objective
    pub min_recall: f64,

    /// First candidate threshold
    pub start: f64,

    /// Last candidate threshold (inclusive)
    pub end: f64,

    pub step: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            objective: ThresholdObjective::F1,
            min_recall: 0.90,
            start: 0.10,
            end: 0.70,
            step: 0.05,
        }
    }
}

impl ThresholdConfig {
    /// Candidate thresholds from `start` to `end` inclusive
    pub fn candidates(&self) -> Result<Vec<f64>> {
        if self.step.is_nan() || self.step <= 0.0 || self.start > self.end || self.start < 0.0 || self.end > 1.0 {
            return Err(AppError::Validation(format!(
                "Invalid threshold range {}..={} step {}",
                self.start, self.end, self.step
            )));
        }

        let n = ((self.end - self.start) / self.step + 1e-9).floor() as usize + 1;
        Ok((0..n)
            .map(|i| ((self.start + i as f64 * self.step) * 1e6).round() / 1e6)
            .collect())
    }
}

/// Metrics of one candidate threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdMetrics {
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub total_errors: usize,
}

impl ThresholdMetrics {
    /// Qualitative F1 rating shown in reports
    pub fn rating(&self) -> &'static str {
        if self.f1 >= 0.88 {
            "excellent"
        } else if self.f1 >= 0.86 {
            "very good"
        } else if self.f1 >= 0.84 {
            "good"
        } else {
            ""
        }
    }
}

/// Suggested thresholds for different investor profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecommendations {
    /// First threshold catching at least 95% of winners, if any does
    pub early_stage: Option<f64>,

    /// Best-F1 threshold
    pub balanced: f64,

    /// Last threshold with at least 90% precision, else the highest scanned
    pub conservative: f64,
}

/// Result of a threshold scan over held-out predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAnalysis {
    pub objective: ThresholdObjective,
    pub min_recall: f64,
    pub rows: Vec<ThresholdMetrics>,
    pub best_f1: f64,
    pub best_accuracy: f64,
    pub min_errors: f64,
    pub recall_constrained: f64,
    pub scenarios: ScenarioRecommendations,
    /// Threshold chosen by the configured objective
    pub selected: f64,
}

/// First row maximizing `key`
fn first_max_by<F>(rows: &[ThresholdMetrics], key: F) -> Option<&ThresholdMetrics>
where
    F: Fn(&ThresholdMetrics) -> f64,
{
    rows.iter().fold(None, |best, row| match best {
        Some(b) if key(b) >= key(row) => Some(b),
        _ => Some(row),
    })
}

/// Scan candidate thresholds against held-out labels and probabilities
pub fn analyze(labels: &[usize], probabilities: &[f64], config: &ThresholdConfig) -> Result<ThresholdAnalysis> {
    if labels.is_empty() || labels.len() != probabilities.len() {
        return Err(AppError::Data(format!(
            "Threshold scan needs aligned, non-empty inputs ({} labels, {} probabilities)",
            labels.len(),
            probabilities.len()
        )));
    }

    let auc = evaluation::roc_auc(labels, probabilities);
    let rows: Vec<ThresholdMetrics> = config
        .candidates()?
        .into_iter()
        .map(|threshold| {
            let cm = confusion_matrix(labels, &predict_labels(probabilities, threshold));
            ThresholdMetrics {
                threshold,
                accuracy: evaluation::accuracy(&cm),
                precision: evaluation::precision(&cm),
                recall: evaluation::recall(&cm),
                f1: evaluation::f1_score(&cm),
                roc_auc: auc,
                tp: cm.tp,
                fp: cm.fp,
                tn: cm.tn,
                fn_: cm.fn_,
                total_errors: cm.errors(),
            }
        })
        .collect();

    let best_f1 = first_max_by(&rows, |r| r.f1)
        .map(|r| r.threshold)
        .ok_or_else(|| AppError::Internal("Empty threshold scan".to_string()))?;
    let best_accuracy = first_max_by(&rows, |r| r.accuracy).map_or(best_f1, |r| r.threshold);
    let min_errors = first_max_by(&rows, |r| -(r.total_errors as f64)).map_or(best_f1, |r| r.threshold);

    let meeting_recall: Vec<ThresholdMetrics> = rows
        .iter()
        .filter(|r| r.recall >= config.min_recall)
        .cloned()
        .collect();
    let recall_constrained = first_max_by(&meeting_recall, |r| r.precision).map_or(best_f1, |r| r.threshold);

    let scenarios = ScenarioRecommendations {
        early_stage: rows
            .iter()
            .find(|r| r.recall >= EARLY_STAGE_RECALL)
            .map(|r| r.threshold),
        balanced: best_f1,
        conservative: rows
            .iter()
            .rev()
            .find(|r| r.precision >= CONSERVATIVE_PRECISION)
            .or_else(|| rows.last())
            .map_or(best_f1, |r| r.threshold),
    };

    let selected = match config.objective {
        ThresholdObjective::F1 => best_f1,
        ThresholdObjective::RecallConstrained => recall_constrained,
        ThresholdObjective::Accuracy => best_accuracy,
        ThresholdObjective::MinErrors => min_errors,
    };

    tracing::info!(
        objective = %config.objective,
        selected,
        best_f1,
        best_accuracy,
        min_errors,
        recall_constrained,
        "Threshold scan complete"
    );

    Ok(ThresholdAnalysis {
        objective: config.objective,
        min_recall: config.min_recall,
        rows,
        best_f1,
        best_accuracy,
        min_errors,
        recall_constrained,
        scenarios,
        selected,
    })
}

impl ThresholdAnalysis {
    /// Metrics row of a scanned threshold
    pub fn row(&self, threshold: f64) -> Option<&ThresholdMetrics> {
        self.rows
            .iter()
            .find(|r| (r.threshold - threshold).abs() < 1e-9)
    }

    pub fn selected_metrics(&self) -> Option<&ThresholdMetrics> {
        self.row(self.selected)
    }

    /// Write one CSV row per candidate threshold
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), rows = self.rows.len(), "Threshold report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(objective: ThresholdObjective) -> ThresholdAnalysis {
        let labels = [0, 0, 0, 0, 1, 1, 1, 1];
        let probabilities = [0.05, 0.2, 0.28, 0.55, 0.3, 0.5, 0.65, 0.9];
        let config = ThresholdConfig {
            objective,
            ..Default::default()
        };
        analyze(&labels, &probabilities, &config).unwrap()
    }

    #[test]
    fn test_default_candidates() {
        let candidates = ThresholdConfig::default().candidates().unwrap();
        assert_eq!(candidates.len(), 13);
        assert_eq!(candidates[0], 0.1);
        assert_eq!(candidates[1], 0.15);
        assert_eq!(candidates[12], 0.7);
    }

    #[test]
    fn test_invalid_range() {
        let config = ThresholdConfig {
            step: 0.0,
            ..Default::default()
        };
        assert!(config.candidates().is_err());
    }

    #[test]
    fn test_scan_rows_and_selection() {
        let analysis = scan(ThresholdObjective::F1);
        assert_eq!(analysis.rows.len(), 13);

        let low = analysis.row(0.1).unwrap();
        assert_eq!(low.recall, 1.0);
        assert_eq!(low.fp, 3);
        assert_eq!(low.total_errors, 3);

        // 0.30 catches every positive with a single false positive
        assert_eq!(analysis.best_f1, 0.3);
        assert_eq!(analysis.selected, 0.3);
        assert_eq!(analysis.min_errors, 0.3);
        assert_eq!(analysis.best_accuracy, 0.3);
        assert_eq!(analysis.scenarios.early_stage, Some(0.1));
        assert_eq!(analysis.scenarios.balanced, 0.3);
        assert_eq!(analysis.scenarios.conservative, 0.7);
    }

    #[test]
    fn test_recall_constrained_prefers_precision() {
        let analysis = scan(ThresholdObjective::RecallConstrained);
        assert_eq!(analysis.selected, 0.3);
        assert!(analysis.selected_metrics().unwrap().recall >= 0.9);
    }

    #[test]
    fn test_misaligned_inputs() {
        assert!(analyze(&[0, 1], &[0.5], &ThresholdConfig::default()).is_err());
    }

    #[test]
    fn test_csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.csv");
        scan(ThresholdObjective::F1).write_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "threshold,accuracy,precision,recall,f1,roc_auc,tp,fp,tn,fn,total_errors"
        );
        assert_eq!(lines.count(), 13);
    }
}
