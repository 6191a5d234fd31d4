//! Pass/fail certification of an assessment against psychometric thresholds.
//!
//! Three criteria must all hold:
//!
//! - **reliability**: Cronbach's alpha ≥ 0.85
//! - **precision**: SEM < 4.0 raw-score points (a fixed threshold; it is not
//!   rescaled to the length of the test)
//! - **fairness**: fewer than 5% of analysed items flagged for DIF
//!
//! Every criterion carries the observed value and its threshold so the
//! report states its evidence, not just the verdict.

use serde::{Deserialize, Serialize};

use crate::dif::DifResult;
use crate::irt::ItemParameters;
use crate::model::ResponseMatrix;
use crate::reliability::ReliabilityResult;

/// Items below this discrimination are counted as weakly discriminating.
const LOW_DISCRIMINATION: f64 = 0.5;

/// Thresholds applied by [`certify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationThresholds {
    /// Minimum Cronbach's alpha.
    #[serde(default = "default_min_alpha")]
    pub min_alpha: f64,
    /// SEM must be strictly below this.
    #[serde(default = "default_max_sem")]
    pub max_sem: f64,
    /// Flagged-item proportion must be strictly below this.
    #[serde(default = "default_max_dif_proportion")]
    pub max_dif_proportion: f64,
}

fn default_min_alpha() -> f64 {
    0.85
}

fn default_max_sem() -> f64 {
    4.0
}

fn default_max_dif_proportion() -> f64 {
    0.05
}

impl Default for CertificationThresholds {
    fn default() -> Self {
        Self {
            min_alpha: default_min_alpha(),
            max_sem: default_max_sem(),
            max_dif_proportion: default_max_dif_proportion(),
        }
    }
}

/// One certification criterion with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub passed: bool,
    pub value: f64,
    pub threshold: f64,
}

/// Summary of the calibrated item parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEvidence {
    pub n_items: usize,
    pub mean_discrimination: f64,
    pub low_discrimination_items: Vec<String>,
    pub min_difficulty: f64,
    pub max_difficulty: f64,
    pub mean_guessing: f64,
}

/// Outcome of certifying one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationReport {
    pub assessment_id: String,
    pub n_students: usize,
    pub n_items: usize,
    pub reliability: Criterion,
    pub precision: Criterion,
    pub fairness: Criterion,
    pub flagged_items: Vec<String>,
    pub item_evidence: ItemEvidence,
    pub certified: bool,
    /// Human-readable summary in Markdown.
    pub narrative: String,
}

/// Certify with the default thresholds.
pub fn certify(
    assessment_id: &str,
    responses: &ResponseMatrix,
    item_parameters: &[ItemParameters],
    reliability: &ReliabilityResult,
    dif_results: &[DifResult],
) -> CertificationReport {
    certify_with(
        assessment_id,
        responses,
        item_parameters,
        reliability,
        dif_results,
        &CertificationThresholds::default(),
    )
}

/// Certify against explicit thresholds.
pub fn certify_with(
    assessment_id: &str,
    responses: &ResponseMatrix,
    item_parameters: &[ItemParameters],
    reliability: &ReliabilityResult,
    dif_results: &[DifResult],
    thresholds: &CertificationThresholds,
) -> CertificationReport {
    let reliability_criterion = Criterion {
        passed: reliability.cronbach_alpha >= thresholds.min_alpha,
        value: reliability.cronbach_alpha,
        threshold: thresholds.min_alpha,
    };

    let precision = Criterion {
        passed: reliability.sem < thresholds.max_sem,
        value: reliability.sem,
        threshold: thresholds.max_sem,
    };

    let flagged_items: Vec<String> = dif_results
        .iter()
        .filter(|r| r.flagged)
        .map(|r| r.item_id.clone())
        .collect();
    let flagged_proportion = if dif_results.is_empty() {
        0.0
    } else {
        flagged_items.len() as f64 / dif_results.len() as f64
    };
    let fairness = Criterion {
        passed: flagged_proportion < thresholds.max_dif_proportion,
        value: flagged_proportion,
        threshold: thresholds.max_dif_proportion,
    };

    let certified = reliability_criterion.passed && precision.passed && fairness.passed;
    let item_evidence = item_evidence(item_parameters);

    let mut report = CertificationReport {
        assessment_id: assessment_id.to_string(),
        n_students: responses.n_students(),
        n_items: responses.n_items(),
        reliability: reliability_criterion,
        precision,
        fairness,
        flagged_items,
        item_evidence,
        certified,
        narrative: String::new(),
    };
    report.narrative = narrative(&report, dif_results.len());

    tracing::info!(
        assessment = assessment_id,
        certified,
        alpha = report.reliability.value,
        sem = report.precision.value,
        flagged = report.flagged_items.len(),
        "certification complete"
    );
    report
}

fn item_evidence(items: &[ItemParameters]) -> ItemEvidence {
    let n = items.len();
    let mean_of = |f: fn(&ItemParameters) -> f64| {
        if n == 0 {
            0.0
        } else {
            items.iter().map(f).sum::<f64>() / n as f64
        }
    };
    let difficulties = items.iter().map(|i| i.difficulty);

    ItemEvidence {
        n_items: n,
        mean_discrimination: mean_of(|i| i.discrimination),
        low_discrimination_items: items
            .iter()
            .filter(|i| i.discrimination < LOW_DISCRIMINATION)
            .map(|i| i.item_id.clone())
            .collect(),
        min_difficulty: difficulties.clone().reduce(f64::min).unwrap_or(0.0),
        max_difficulty: difficulties.reduce(f64::max).unwrap_or(0.0),
        mean_guessing: mean_of(|i| i.guessing),
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

fn narrative(report: &CertificationReport, n_dif: usize) -> String {
    let mut md = String::new();

    md.push_str(&format!(
        "## Certification: {}\n\n",
        if report.certified {
            "CERTIFIED"
        } else {
            "NOT CERTIFIED"
        }
    ));
    md.push_str(&format!(
        "Assessment `{}`: {} students, {} items.\n\n",
        report.assessment_id, report.n_students, report.n_items
    ));

    md.push_str("| Criterion | Observed | Threshold | Result |\n");
    md.push_str("|-----------|----------|-----------|--------|\n");
    md.push_str(&format!(
        "| Reliability (alpha) | {:.3} | >= {:.2} | {} |\n",
        report.reliability.value,
        report.reliability.threshold,
        verdict(report.reliability.passed)
    ));
    md.push_str(&format!(
        "| Precision (SEM) | {:.3} | < {:.2} | {} |\n",
        report.precision.value,
        report.precision.threshold,
        verdict(report.precision.passed)
    ));
    md.push_str(&format!(
        "| Fairness (DIF flagged) | {:.1}% of {} | < {:.1}% | {} |\n\n",
        report.fairness.value * 100.0,
        n_dif,
        report.fairness.threshold * 100.0,
        verdict(report.fairness.passed)
    ));

    if !report.flagged_items.is_empty() {
        md.push_str(&format!(
            "Items flagged for DIF: {}.\n\n",
            report.flagged_items.join(", ")
        ));
    }

    let ev = &report.item_evidence;
    md.push_str(&format!(
        "Item parameters: difficulty {:.2} to {:.2}, mean discrimination {:.2}, mean guessing {:.2}.\n",
        ev.min_difficulty, ev.max_difficulty, ev.mean_discrimination, ev.mean_guessing
    ));
    if !ev.low_discrimination_items.is_empty() {
        md.push_str(&format!(
            "Weakly discriminating items (< {LOW_DISCRIMINATION}): {}.\n",
            ev.low_discrimination_items.join(", ")
        ));
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dif::{DifMethod, DifSeverity};
    use crate::irt::{calibrate, IrtModel};
    use crate::reliability::ReliabilityMethod;

    fn matrix() -> ResponseMatrix {
        ResponseMatrix::new(&[vec![1, 1, 0], vec![1, 0, 0], vec![1, 1, 1]]).unwrap()
    }

    fn reliability(alpha: f64, sem: f64) -> ReliabilityResult {
        ReliabilityResult {
            method: ReliabilityMethod::CronbachAlpha,
            cronbach_alpha: alpha,
            kr20: alpha,
            split_half: alpha,
            reliability: alpha,
            sem,
            ci_half_width: 1.96 * sem,
            confidence_interval: (-1.96 * sem, 1.96 * sem),
            mean_total: 2.0,
            sd_total: 1.0,
            n_items: 3,
            n_students: 3,
            degenerate: false,
        }
    }

    fn dif(id: &str, flagged: bool) -> DifResult {
        DifResult {
            item_id: id.into(),
            method: DifMethod::MantelHaenszel,
            statistic: if flagged { 10.0 } else { 0.5 },
            p_value: if flagged { 0.001 } else { 0.2 },
            effect_size: if flagged { 0.2 } else { 0.01 },
            severity: if flagged {
                DifSeverity::Large
            } else {
                DifSeverity::Negligible
            },
            flagged,
            p_reference: 0.5,
            p_focal: 0.5,
            common_odds_ratio: None,
            ets_delta: None,
        }
    }

    fn fair_items(n: usize) -> Vec<DifResult> {
        (0..n).map(|i| dif(&format!("q{i}"), false)).collect()
    }

    #[test]
    fn all_criteria_pass() {
        let m = matrix();
        let items = calibrate(&m, IrtModel::TwoPl, 10, 0.001);
        let report = certify("exam", &m, &items, &reliability(0.9, 2.0), &fair_items(3));
        assert!(report.reliability.passed);
        assert!(report.precision.passed);
        assert!(report.fairness.passed);
        assert!(report.certified);
        assert!(report.narrative.contains("## Certification: CERTIFIED"));
        assert_eq!(report.item_evidence.n_items, 3);
    }

    #[test]
    fn raising_alpha_flips_reliability_and_overall() {
        let m = matrix();
        let items = calibrate(&m, IrtModel::OnePl, 10, 0.001);
        let difs = fair_items(3);

        let low = certify("exam", &m, &items, &reliability(0.80, 2.0), &difs);
        assert!(!low.reliability.passed);
        assert!(!low.certified);

        let high = certify("exam", &m, &items, &reliability(0.86, 2.0), &difs);
        assert!(high.reliability.passed);
        assert!(high.certified);
        assert_eq!(high.precision, low.precision);
        assert_eq!(high.fairness, low.fairness);
    }

    #[test]
    fn alpha_threshold_is_inclusive_and_sem_strict() {
        let m = matrix();
        let report = certify("exam", &m, &[], &reliability(0.85, 4.0), &[]);
        assert!(report.reliability.passed);
        assert!(!report.precision.passed);
        assert!(!report.certified);
    }

    #[test]
    fn fairness_uses_flagged_proportion() {
        let m = matrix();
        let mut difs = fair_items(19);
        difs.push(dif("biased", true));
        // 1 of 20 = 5%, not strictly below 5%.
        let report = certify("exam", &m, &[], &reliability(0.9, 1.0), &difs);
        assert!((report.fairness.value - 0.05).abs() < 1e-12);
        assert!(!report.fairness.passed);
        assert_eq!(report.flagged_items, vec!["biased".to_string()]);
        assert!(report.narrative.contains("biased"));

        difs.push(dif("extra", false));
        let report = certify("exam", &m, &[], &reliability(0.9, 1.0), &difs);
        assert!(report.fairness.passed);
    }

    #[test]
    fn no_dif_results_counts_as_fair() {
        let m = matrix();
        let report = certify("exam", &m, &[], &reliability(0.9, 1.0), &[]);
        assert_eq!(report.fairness.value, 0.0);
        assert!(report.fairness.passed);
    }

    #[test]
    fn custom_thresholds() {
        let m = matrix();
        let thresholds = CertificationThresholds {
            min_alpha: 0.7,
            max_sem: 10.0,
            max_dif_proportion: 0.5,
        };
        let report = certify_with("exam", &m, &[], &reliability(0.75, 5.0), &[], &thresholds);
        assert!(report.certified);
        assert_eq!(report.reliability.threshold, 0.7);
    }

    #[test]
    fn low_discrimination_evidence() {
        let m = matrix();
        let mut items = calibrate(&m, IrtModel::TwoPl, 10, 0.001);
        items[1].discrimination = 0.3;
        let report = certify("exam", &m, &items, &reliability(0.9, 1.0), &[]);
        assert_eq!(
            report.item_evidence.low_discrimination_items,
            vec!["item2".to_string()]
        );
        assert!(report.narrative.contains("Weakly discriminating"));
    }
}
