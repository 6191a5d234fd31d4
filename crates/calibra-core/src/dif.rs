//! Differential item functioning between a reference and a focal group.
//!
//! The detection statistic is a simplified, unstratified Mantel-Haenszel
//! chi-square over the two groups' correct counts, with one degree of
//! freedom. Its p-value is a two-bucket approximation: 0.001 when the
//! statistic exceeds the χ²(1) critical value at α = 0.01, otherwise 0.20.
//! It is not a continuous p-value.
//!
//! Alongside it, the Mantel-Haenszel common odds ratio stratified by total
//! score is reported as supporting evidence (on the ETS delta scale too).
//! It does not take part in flagging.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::model::{GroupLabels, ResponseMatrix};

/// χ²(1) critical value at α = 0.01.
const CHI2_CRITICAL_01: f64 = 6.63;
const P_SIGNIFICANT: f64 = 0.001;
const P_NOT_SIGNIFICANT: f64 = 0.20;
const FLAG_ALPHA: f64 = 0.01;
const FLAG_EFFECT: f64 = 0.10;
const ETS_DELTA_SCALE: f64 = -2.35;

/// DIF detection method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum DifMethod {
    #[default]
    MantelHaenszel,
    /// Not implemented; produces a neutral result for every item.
    LogisticRegression,
}

impl fmt::Display for DifMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifMethod::MantelHaenszel => write!(f, "mantel_haenszel"),
            DifMethod::LogisticRegression => write!(f, "logistic_regression"),
        }
    }
}

impl FromStr for DifMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "mantel_haenszel" | "mh" => Ok(DifMethod::MantelHaenszel),
            "logistic_regression" | "lr" => Ok(DifMethod::LogisticRegression),
            other => Err(AnalysisError::UnknownMethod {
                kind: "DIF",
                method: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DifMethod {
    type Error = AnalysisError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// Size category of a DIF effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifSeverity {
    Negligible,
    Slight,
    Moderate,
    Large,
}

impl DifSeverity {
    /// Classify by the absolute effect size.
    pub fn classify(effect_size: f64) -> Self {
        let magnitude = effect_size.abs();
        if magnitude < 0.05 {
            DifSeverity::Negligible
        } else if magnitude < 0.10 {
            DifSeverity::Slight
        } else if magnitude < 0.15 {
            DifSeverity::Moderate
        } else {
            DifSeverity::Large
        }
    }
}

impl fmt::Display for DifSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifSeverity::Negligible => write!(f, "negligible"),
            DifSeverity::Slight => write!(f, "slight"),
            DifSeverity::Moderate => write!(f, "moderate"),
            DifSeverity::Large => write!(f, "large"),
        }
    }
}

/// DIF evidence for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifResult {
    pub item_id: String,
    pub method: DifMethod,
    pub statistic: f64,
    pub p_value: f64,
    /// p_reference − p_focal.
    pub effect_size: f64,
    pub severity: DifSeverity,
    pub flagged: bool,
    pub p_reference: f64,
    pub p_focal: f64,
    /// Stratified MH common odds ratio (reference vs. focal), if estimable.
    pub common_odds_ratio: Option<f64>,
    /// −2.35 × ln(common odds ratio).
    pub ets_delta: Option<f64>,
}

impl DifResult {
    fn neutral(item_id: &str, method: DifMethod) -> Self {
        Self {
            item_id: item_id.to_string(),
            method,
            statistic: 0.0,
            p_value: 1.0,
            effect_size: 0.0,
            severity: DifSeverity::Negligible,
            flagged: false,
            p_reference: 0.0,
            p_focal: 0.0,
            common_odds_ratio: None,
            ets_delta: None,
        }
    }
}

/// Run DIF detection for every item.
pub fn detect_dif(
    responses: &ResponseMatrix,
    groups: &GroupLabels,
    method: DifMethod,
) -> Result<Vec<DifResult>> {
    if groups.len() != responses.n_students() {
        return Err(AnalysisError::DimensionMismatch {
            what: "group labels",
            expected: responses.n_students(),
            found: groups.len(),
        });
    }

    let items = responses.item_ids();
    match method {
        DifMethod::MantelHaenszel => {
            let totals = responses.total_scores();
            Ok((0..responses.n_items())
                .map(|j| mantel_haenszel(responses, groups, &totals, j))
                .collect())
        }
        DifMethod::LogisticRegression => {
            tracing::debug!(%method, "DIF method not implemented, returning neutral results");
            Ok(items
                .iter()
                .map(|id| DifResult::neutral(id, method))
                .collect())
        }
    }
}

/// Like [`detect_dif`], but resolves the method from its name first.
pub fn detect_dif_named(
    responses: &ResponseMatrix,
    groups: &GroupLabels,
    method: &str,
) -> Result<Vec<DifResult>> {
    detect_dif(responses, groups, method.parse()?)
}

#[derive(Default, Clone, Copy)]
struct Table {
    ref_correct: f64,
    ref_wrong: f64,
    focal_correct: f64,
    focal_wrong: f64,
}

impl Table {
    fn add(&mut self, reference: bool, correct: bool) {
        match (reference, correct) {
            (true, true) => self.ref_correct += 1.0,
            (true, false) => self.ref_wrong += 1.0,
            (false, true) => self.focal_correct += 1.0,
            (false, false) => self.focal_wrong += 1.0,
        }
    }

    fn total(&self) -> f64 {
        self.ref_correct + self.ref_wrong + self.focal_correct + self.focal_wrong
    }
}

fn mantel_haenszel(
    responses: &ResponseMatrix,
    groups: &GroupLabels,
    totals: &[f64],
    item: usize,
) -> DifResult {
    let mut overall = Table::default();
    // Total scores are whole numbers, so they key the strata exactly.
    let mut strata: BTreeMap<u64, Table> = BTreeMap::new();
    for (i, total) in totals.iter().enumerate() {
        let reference = groups.is_reference(i);
        let correct = responses.get(i, item) == 1;
        overall.add(reference, correct);
        strata
            .entry(*total as u64)
            .or_default()
            .add(reference, correct);
    }

    let n_ref = overall.ref_correct + overall.ref_wrong;
    let n_focal = overall.focal_correct + overall.focal_wrong;
    let p_reference = proportion(overall.ref_correct, n_ref);
    let p_focal = proportion(overall.focal_correct, n_focal);
    let effect_size = p_reference - p_focal;

    let pooled = proportion(overall.ref_correct + overall.focal_correct, n_ref + n_focal);
    let statistic = chi_square_term(overall.ref_correct, pooled * n_ref)
        + chi_square_term(overall.focal_correct, pooled * n_focal);
    let p_value = if statistic > CHI2_CRITICAL_01 {
        P_SIGNIFICANT
    } else {
        P_NOT_SIGNIFICANT
    };

    let common_odds_ratio = common_odds_ratio(strata.values());
    let ets_delta = common_odds_ratio.map(|alpha| ETS_DELTA_SCALE * alpha.ln());

    DifResult {
        item_id: responses.item_ids()[item].clone(),
        method: DifMethod::MantelHaenszel,
        statistic,
        p_value,
        effect_size,
        severity: DifSeverity::classify(effect_size),
        flagged: p_value < FLAG_ALPHA && effect_size.abs() >= FLAG_EFFECT,
        p_reference,
        p_focal,
        common_odds_ratio,
        ets_delta,
    }
}

fn proportion(count: f64, n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        count / n
    }
}

fn chi_square_term(observed: f64, expected: f64) -> f64 {
    if expected <= 0.0 {
        0.0
    } else {
        (observed - expected).powi(2) / expected
    }
}

/// α_MH = Σ(A·D/T) / Σ(B·C/T) over score strata.
fn common_odds_ratio<'a>(strata: impl Iterator<Item = &'a Table>) -> Option<f64> {
    let (num, den) = strata
        .filter(|t| t.total() > 0.0)
        .fold((0.0, 0.0), |(num, den), t| {
            let n = t.total();
            (
                num + t.ref_correct * t.focal_wrong / n,
                den + t.ref_wrong * t.focal_correct / n,
            )
        });
    if num > 0.0 && den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(labels: &[&str]) -> GroupLabels {
        GroupLabels::new(labels.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    /// 40 students: item 1 strongly favours group "a", item 2 is fair.
    fn biased_data() -> (ResponseMatrix, GroupLabels) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.push(vec![1, i % 2, (i / 2) % 2]);
            labels.push("a");
        }
        for i in 0..20 {
            rows.push(vec![u8::from(i < 4), i % 2, (i / 2) % 2]);
            labels.push("b");
        }
        (ResponseMatrix::new(&rows).unwrap(), groups(&labels))
    }

    #[test]
    fn flags_strongly_biased_item() {
        let (m, g) = biased_data();
        let results = detect_dif(&m, &g, DifMethod::MantelHaenszel).unwrap();

        let biased = &results[0];
        assert!((biased.effect_size - 0.8).abs() < 1e-12);
        assert!(biased.statistic > CHI2_CRITICAL_01);
        assert_eq!(biased.p_value, 0.001);
        assert_eq!(biased.severity, DifSeverity::Large);
        assert!(biased.flagged);

        let fair = &results[1];
        assert_eq!(fair.effect_size, 0.0);
        assert_eq!(fair.statistic, 0.0);
        assert_eq!(fair.p_value, 0.20);
        assert!(!fair.flagged);
    }

    #[test]
    fn swapping_groups_negates_effect_only() {
        let (m, g) = biased_data();
        let forward = detect_dif(&m, &g, DifMethod::MantelHaenszel).unwrap();
        let backward = detect_dif(&m, &g.swapped(), DifMethod::MantelHaenszel).unwrap();

        for (f, b) in forward.iter().zip(&backward) {
            assert!((f.effect_size + b.effect_size).abs() < 1e-12);
            assert!((f.statistic - b.statistic).abs() < 1e-12);
            assert_eq!(f.flagged, b.flagged);
            assert_eq!(f.severity, b.severity);
        }
    }

    #[test]
    fn large_effect_without_significance_is_not_flagged() {
        // Six students: effect 2/3 but chi-square well below 6.63.
        let m = ResponseMatrix::new(&[vec![1], vec![1], vec![1], vec![0], vec![0], vec![1]])
            .unwrap();
        let g = groups(&["a", "a", "a", "b", "b", "b"]);
        let r = &detect_dif(&m, &g, DifMethod::MantelHaenszel).unwrap()[0];
        assert!(r.effect_size.abs() >= 0.10);
        assert!(r.statistic < CHI2_CRITICAL_01);
        assert!(!r.flagged);
    }

    #[test]
    fn severity_boundaries() {
        assert_eq!(DifSeverity::classify(0.049), DifSeverity::Negligible);
        assert_eq!(DifSeverity::classify(-0.05), DifSeverity::Slight);
        assert_eq!(DifSeverity::classify(0.10), DifSeverity::Moderate);
        assert_eq!(DifSeverity::classify(-0.15), DifSeverity::Large);
    }

    #[test]
    fn unimplemented_method_is_neutral() {
        let (m, g) = biased_data();
        let results = detect_dif(&m, &g, DifMethod::LogisticRegression).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.flagged && r.statistic == 0.0));
    }

    #[test]
    fn unknown_method_and_mismatched_labels_are_errors() {
        let (m, g) = biased_data();
        assert!(matches!(
            detect_dif_named(&m, &g, "sibtest"),
            Err(AnalysisError::UnknownMethod { .. })
        ));
        let short = groups(&["a", "b"]);
        assert!(matches!(
            detect_dif(&m, &short, DifMethod::MantelHaenszel),
            Err(AnalysisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn odds_ratio_matches_direction_of_effect() {
        let (m, g) = biased_data();
        let results = detect_dif(&m, &g, DifMethod::MantelHaenszel).unwrap();
        if let Some(alpha) = results[0].common_odds_ratio {
            assert!(alpha > 1.0);
            assert!(results[0].ets_delta.unwrap() < 0.0);
        }
        let fair = results[1].common_odds_ratio.unwrap();
        assert!(fair > 0.0);
    }
}
