//! Analysis report types with JSON persistence and drift detection.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::AssessmentAnalysis;
use crate::irt::IrtModel;

/// A complete batch analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// IRT model used for calibration.
    pub model: IrtModel,
    /// Per-assessment results, ordered by assessment id.
    pub assessments: Vec<AssessmentAnalysis>,
    /// Assessments that could not be analyzed.
    #[serde(default)]
    pub failures: Vec<AnalysisFailure>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// An assessment whose analysis failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub assessment_id: String,
    pub error: String,
}

impl AnalysisReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AnalysisReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Number of assessments that passed certification.
    pub fn certified_count(&self) -> usize {
        self.assessments
            .iter()
            .filter(|a| a.certification.certified)
            .count()
    }

    /// Compare this report against a baseline to detect parameter drift.
    ///
    /// An item drifts when its calibrated difficulty moved by more than
    /// `threshold` logits.
    pub fn compare(&self, baseline: &AnalysisReport, threshold: f64) -> DriftReport {
        let difficulty_map = |report: &AnalysisReport| -> BTreeMap<(String, String), f64> {
            report
                .assessments
                .iter()
                .flat_map(|a| {
                    a.calibration.items.iter().map(move |item| {
                        (
                            (a.assessment_id.clone(), item.item_id.clone()),
                            item.difficulty,
                        )
                    })
                })
                .collect()
        };

        let baseline_items = difficulty_map(baseline);
        let current_items = difficulty_map(self);

        let mut drifted = Vec::new();
        let mut stable = 0usize;
        let mut new_items = Vec::new();

        for (key, &current) in &current_items {
            if let Some(&baseline_val) = baseline_items.get(key) {
                let delta = current - baseline_val;
                if delta.abs() > threshold {
                    drifted.push(ItemDrift {
                        assessment_id: key.0.clone(),
                        item_id: key.1.clone(),
                        baseline_difficulty: baseline_val,
                        current_difficulty: current,
                        delta,
                    });
                } else {
                    stable += 1;
                }
            } else {
                new_items.push(ItemRef {
                    assessment_id: key.0.clone(),
                    item_id: key.1.clone(),
                });
            }
        }

        let removed_items = baseline_items
            .keys()
            .filter(|k| !current_items.contains_key(k))
            .map(|(assessment_id, item_id)| ItemRef {
                assessment_id: assessment_id.clone(),
                item_id: item_id.clone(),
            })
            .collect();

        let reliability_changes = self
            .assessments
            .iter()
            .filter_map(|current| {
                let base = baseline
                    .assessments
                    .iter()
                    .find(|b| b.assessment_id == current.assessment_id)?;
                Some(ReliabilityChange {
                    assessment_id: current.assessment_id.clone(),
                    baseline_alpha: base.reliability.cronbach_alpha,
                    current_alpha: current.reliability.cronbach_alpha,
                    delta: current.reliability.cronbach_alpha - base.reliability.cronbach_alpha,
                    baseline_certified: base.certification.certified,
                    current_certified: current.certification.certified,
                })
            })
            .collect();

        DriftReport {
            threshold,
            drifted,
            stable,
            new_items,
            removed_items,
            reliability_changes,
        }
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    /// Difficulty change (in logits) above which an item counts as drifted.
    pub threshold: f64,
    pub drifted: Vec<ItemDrift>,
    /// Items present in both reports whose difficulty held.
    pub stable: usize,
    /// Items in current but not baseline.
    pub new_items: Vec<ItemRef>,
    /// Items in baseline but not current.
    pub removed_items: Vec<ItemRef>,
    /// One entry per assessment present in both reports.
    pub reliability_changes: Vec<ReliabilityChange>,
}

/// An item whose difficulty moved beyond the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDrift {
    pub assessment_id: String,
    pub item_id: String,
    pub baseline_difficulty: f64,
    pub current_difficulty: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub assessment_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityChange {
    pub assessment_id: String,
    pub baseline_alpha: f64,
    pub current_alpha: f64,
    pub delta: f64,
    pub baseline_certified: bool,
    pub current_certified: bool,
}

impl ReliabilityChange {
    /// Certification flipped from pass to fail.
    pub fn lost_certification(&self) -> bool {
        self.baseline_certified && !self.current_certified
    }
}

impl DriftReport {
    /// Format the drift report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} drifted, {} stable, {} new, {} removed (threshold {:.2} logits)\n\n",
            self.drifted.len(),
            self.stable,
            self.new_items.len(),
            self.removed_items.len(),
            self.threshold
        ));

        if !self.drifted.is_empty() {
            md.push_str("### Drifted Items\n\n");
            md.push_str("| Assessment | Item | Baseline b | Current b | Delta |\n");
            md.push_str("|------------|------|------------|-----------|-------|\n");
            for d in &self.drifted {
                md.push_str(&format!(
                    "| {} | {} | {:.3} | {:.3} | {:+.3} |\n",
                    d.assessment_id,
                    d.item_id,
                    d.baseline_difficulty,
                    d.current_difficulty,
                    d.delta
                ));
            }
            md.push('\n');
        }

        if !self.reliability_changes.is_empty() {
            md.push_str("### Reliability\n\n");
            md.push_str("| Assessment | Baseline α | Current α | Delta | Certified |\n");
            md.push_str("|------------|------------|-----------|-------|-----------|\n");
            for r in &self.reliability_changes {
                let certified = match (r.baseline_certified, r.current_certified) {
                    (true, true) => "yes",
                    (false, false) => "no",
                    (true, false) => "lost",
                    (false, true) => "gained",
                };
                md.push_str(&format!(
                    "| {} | {:.3} | {:.3} | {:+.3} | {} |\n",
                    r.assessment_id, r.baseline_alpha, r.current_alpha, r.delta, certified
                ));
            }
        }

        md
    }

    /// Returns true if any item drifted.
    pub fn has_drift(&self) -> bool {
        !self.drifted.is_empty()
    }
}
