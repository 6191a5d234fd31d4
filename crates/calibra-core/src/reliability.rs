//! Internal-consistency reliability and the standard error of measurement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::model::ResponseMatrix;
use crate::statistics::{clip, mean, pearson, std_dev, variance};

/// z for a two-sided 95% interval.
const Z_95: f64 = 1.96;

/// Which reliability estimate drives the SEM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ReliabilityMethod {
    #[default]
    CronbachAlpha,
    Kr20,
    SplitHalf,
}

impl fmt::Display for ReliabilityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReliabilityMethod::CronbachAlpha => write!(f, "cronbach_alpha"),
            ReliabilityMethod::Kr20 => write!(f, "kr20"),
            ReliabilityMethod::SplitHalf => write!(f, "split_half"),
        }
    }
}

impl FromStr for ReliabilityMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cronbach_alpha" | "alpha" | "cronbach" => Ok(ReliabilityMethod::CronbachAlpha),
            "kr20" | "kr_20" => Ok(ReliabilityMethod::Kr20),
            "split_half" | "splithalf" => Ok(ReliabilityMethod::SplitHalf),
            other => Err(AnalysisError::UnknownMethod {
                kind: "reliability",
                method: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ReliabilityMethod {
    type Error = AnalysisError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Test-level reliability evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityResult {
    pub method: ReliabilityMethod,
    /// Cronbach's alpha, clipped to [0, 1].
    pub cronbach_alpha: f64,
    /// Kuder-Richardson 20, clipped to [0, 1].
    pub kr20: f64,
    /// Spearman-Brown corrected odd/even split-half, clipped to [0, 1].
    pub split_half: f64,
    /// The estimate selected by `method`.
    pub reliability: f64,
    /// Standard error of measurement.
    pub sem: f64,
    /// 1.96 × SEM.
    pub ci_half_width: f64,
    /// Symmetric 95% band around a true score: (-half-width, +half-width).
    pub confidence_interval: (f64, f64),
    pub mean_total: f64,
    pub sd_total: f64,
    pub n_items: usize,
    pub n_students: usize,
    /// Total scores have no variance; coefficients were reported as 0.
    pub degenerate: bool,
}

/// Compute all reliability coefficients and the SEM for the chosen method.
pub fn compute_reliability(
    responses: &ResponseMatrix,
    method: ReliabilityMethod,
) -> ReliabilityResult {
    let totals = responses.total_scores();
    let total_var = variance(&totals);
    let sd_total = std_dev(&totals);
    let degenerate = total_var == 0.0;
    if degenerate {
        tracing::debug!("total scores have zero variance, reliability reported as 0");
    }

    let cronbach_alpha = cronbach_alpha(responses);
    let kr20 = kr20(responses);
    let split_half = split_half(responses);
    let reliability = match method {
        ReliabilityMethod::CronbachAlpha => cronbach_alpha,
        ReliabilityMethod::Kr20 => kr20,
        ReliabilityMethod::SplitHalf => split_half,
    };

    let sem = sd_total * (1.0 - reliability).max(0.0).sqrt();
    let ci_half_width = Z_95 * sem;

    ReliabilityResult {
        method,
        cronbach_alpha,
        kr20,
        split_half,
        reliability,
        sem,
        ci_half_width,
        confidence_interval: (-ci_half_width, ci_half_width),
        mean_total: mean(&totals),
        sd_total,
        n_items: responses.n_items(),
        n_students: responses.n_students(),
        degenerate,
    }
}

/// α = k/(k−1) × (1 − Σσ²ᵢ / σ²ₜ), clipped to [0, 1].
pub fn cronbach_alpha(responses: &ResponseMatrix) -> f64 {
    let items: Vec<usize> = (0..responses.n_items()).collect();
    alpha_over(responses, &items)
}

/// KR-20 = k/(k−1) × (1 − Σpq / σ²ₜ), clipped to [0, 1].
pub fn kr20(responses: &ResponseMatrix) -> f64 {
    let k = responses.n_items();
    let total_var = variance(&responses.total_scores());
    if k < 2 || total_var == 0.0 {
        return 0.0;
    }
    let sum_pq: f64 = responses.p_values().iter().map(|p| p * (1.0 - p)).sum();
    let k = k as f64;
    clip(k / (k - 1.0) * (1.0 - sum_pq / total_var), 0.0, 1.0)
}

/// Odd/even split by column position with the Spearman-Brown correction.
pub fn split_half(responses: &ResponseMatrix) -> f64 {
    let (odd, even): (Vec<f64>, Vec<f64>) = (0..responses.n_students())
        .map(|i| {
            responses
                .row(i)
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(a, b), (j, &v)| {
                    if j % 2 == 0 {
                        (a + v as f64, b)
                    } else {
                        (a, b + v as f64)
                    }
                })
        })
        .unzip();

    let r = pearson(&odd, &even);
    if r <= -1.0 {
        return 0.0;
    }
    clip(2.0 * r / (1.0 + r), 0.0, 1.0)
}

/// Cronbach's alpha recomputed with each item removed in turn.
pub fn alpha_if_item_deleted(responses: &ResponseMatrix) -> Vec<f64> {
    let k = responses.n_items();
    (0..k)
        .map(|dropped| {
            let kept: Vec<usize> = (0..k).filter(|&j| j != dropped).collect();
            alpha_over(responses, &kept)
        })
        .collect()
}

fn alpha_over(responses: &ResponseMatrix, items: &[usize]) -> f64 {
    let k = items.len();
    if k < 2 {
        return 0.0;
    }
    let totals: Vec<f64> = (0..responses.n_students())
        .map(|i| items.iter().map(|&j| responses.get(i, j) as f64).sum())
        .collect();
    let total_var = variance(&totals);
    if total_var == 0.0 {
        return 0.0;
    }
    let item_var: f64 = items
        .iter()
        .map(|&j| variance(&responses.item_column(j)))
        .sum();
    let k = k as f64;
    clip(k / (k - 1.0) * (1.0 - item_var / total_var), 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_matrix() -> ResponseMatrix {
        ResponseMatrix::new(&[
            vec![1, 1, 1, 0, 0],
            vec![1, 1, 0, 0, 0],
            vec![0, 0, 1, 1, 1],
            vec![0, 0, 0, 1, 1],
        ])
        .unwrap()
    }

    fn consistent_matrix() -> ResponseMatrix {
        ResponseMatrix::new(&[
            vec![1, 1, 1, 1, 1, 1],
            vec![1, 1, 1, 1, 1, 0],
            vec![1, 1, 1, 1, 0, 0],
            vec![1, 1, 1, 0, 0, 0],
            vec![1, 1, 0, 0, 0, 0],
            vec![1, 0, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0, 0],
        ])
        .unwrap()
    }

    #[test]
    fn block_matrix_alpha_is_deterministic() {
        let m = block_matrix();
        let first = compute_reliability(&m, ReliabilityMethod::CronbachAlpha);
        let second = compute_reliability(&m, ReliabilityMethod::CronbachAlpha);
        assert_eq!(first.cronbach_alpha, second.cronbach_alpha);
        // Totals are [3, 2, 3, 2]: raw alpha is negative and clips to 0.
        assert_eq!(first.cronbach_alpha, 0.0);
        assert!((first.sd_total - 0.5).abs() < 1e-12);
        assert!((first.sem - 0.5).abs() < 1e-12);
    }

    #[test]
    fn coefficients_stay_in_unit_interval() {
        for m in [block_matrix(), consistent_matrix()] {
            let r = compute_reliability(&m, ReliabilityMethod::SplitHalf);
            for value in [r.cronbach_alpha, r.kr20, r.split_half] {
                assert!((0.0..=1.0).contains(&value), "out of range: {value}");
            }
        }
    }

    #[test]
    fn guttman_pattern_is_highly_reliable() {
        let r = compute_reliability(&consistent_matrix(), ReliabilityMethod::CronbachAlpha);
        assert!(r.cronbach_alpha > 0.85, "alpha = {}", r.cronbach_alpha);
        assert!((r.cronbach_alpha - r.kr20).abs() < 1e-12);
        assert!(r.split_half > 0.8);
    }

    #[test]
    fn sem_and_interval_follow_selected_method() {
        let m = consistent_matrix();
        let r = compute_reliability(&m, ReliabilityMethod::SplitHalf);
        let expected = r.sd_total * (1.0 - r.split_half).sqrt();
        assert!((r.sem - expected).abs() < 1e-12);
        assert!((r.ci_half_width - 1.96 * r.sem).abs() < 1e-12);
        assert_eq!(r.confidence_interval, (-r.ci_half_width, r.ci_half_width));
        assert_eq!(r.reliability, r.split_half);
    }

    #[test]
    fn zero_variance_test_reports_zero() {
        let m = ResponseMatrix::new(&[vec![1, 0, 1], vec![1, 0, 1]]).unwrap();
        let r = compute_reliability(&m, ReliabilityMethod::CronbachAlpha);
        assert!(r.degenerate);
        assert_eq!(r.cronbach_alpha, 0.0);
        assert_eq!(r.split_half, 0.0);
        assert_eq!(r.sem, 0.0);
    }

    #[test]
    fn single_item_has_no_alpha() {
        let m = ResponseMatrix::new(&[vec![1], vec![0]]).unwrap();
        assert_eq!(cronbach_alpha(&m), 0.0);
        assert_eq!(split_half(&m), 0.0);
    }

    #[test]
    fn alpha_if_deleted_has_one_entry_per_item() {
        let m = consistent_matrix();
        let deleted = alpha_if_item_deleted(&m);
        assert_eq!(deleted.len(), 6);
        assert!(deleted.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn method_parsing() {
        assert_eq!(
            "alpha".parse::<ReliabilityMethod>().unwrap(),
            ReliabilityMethod::CronbachAlpha
        );
        assert_eq!(
            "split-half".parse::<ReliabilityMethod>().unwrap(),
            ReliabilityMethod::SplitHalf
        );
        assert_eq!(ReliabilityMethod::Kr20.to_string(), "kr20");
        assert!(matches!(
            "omega".parse::<ReliabilityMethod>(),
            Err(AnalysisError::UnknownMethod { .. })
        ));
    }
}
