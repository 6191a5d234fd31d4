//! Classical test theory item statistics.
//!
//! Per item: proportion correct, point-biserial against the corrected total
//! (the item's own score removed), an upper–lower discrimination index, and
//! the distribution of selected options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{OptionResponses, ResponseMatrix};
use crate::statistics::{mean, pearson, rank_ascending, variance};

/// Share of students in each tail for the upper–lower index.
const TAIL_FRACTION: f64 = 0.27;

/// Option label used for the keyed answer when only binary data is available.
pub const CORRECT_OPTION: &str = "correct";
/// Option label used for all wrong answers when only binary data is available.
pub const INCORRECT_OPTION: &str = "incorrect";
/// Option label for omitted items in option-level data.
pub const OMITTED_OPTION: &str = "omit";

/// Classical statistics for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CttItemMetrics {
    pub item_id: String,
    /// Proportion correct.
    pub p_value: f64,
    /// Item vs. corrected total correlation.
    pub point_biserial: f64,
    /// p in the top 27% minus p in the bottom 27% by total score.
    pub discrimination_index: f64,
    /// The item has the same response from every student.
    pub zero_variance: bool,
    /// Proportion of students per option; sums to 1.0.
    pub distractors: BTreeMap<String, f64>,
}

/// Compute CTT metrics from binary responses.
///
/// Without option-level data the distractor distribution is the two-entry
/// placeholder `{correct: p, incorrect: 1 - p}`.
pub fn compute_ctt(responses: &ResponseMatrix) -> Vec<CttItemMetrics> {
    let totals = responses.total_scores();
    let order = rank_ascending(&totals);

    (0..responses.n_items())
        .map(|j| {
            let p = responses.proportion_correct(j);
            let mut distractors = BTreeMap::new();
            distractors.insert(CORRECT_OPTION.to_string(), p);
            distractors.insert(INCORRECT_OPTION.to_string(), 1.0 - p);
            item_metrics(responses, j, &totals, &order, distractors)
        })
        .collect()
}

/// Compute CTT metrics from option-level selections.
///
/// The keyed option's share equals the item's p-value.
pub fn compute_ctt_with_options(options: &OptionResponses) -> Result<Vec<CttItemMetrics>> {
    let responses = options.score()?;
    let totals = responses.total_scores();
    let order = rank_ascending(&totals);
    let n = options.n_students() as f64;

    Ok((0..responses.n_items())
        .map(|j| {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            counts.insert(options.keys()[j].clone(), 0);
            for i in 0..options.n_students() {
                let selection = options.selection(i, j);
                let label = if selection.is_empty() {
                    OMITTED_OPTION
                } else {
                    selection
                };
                *counts.entry(label.to_string()).or_default() += 1;
            }
            let distractors = counts
                .into_iter()
                .map(|(option, count)| (option, count as f64 / n))
                .collect();
            item_metrics(&responses, j, &totals, &order, distractors)
        })
        .collect())
}

fn item_metrics(
    responses: &ResponseMatrix,
    item: usize,
    totals: &[f64],
    order: &[usize],
    distractors: BTreeMap<String, f64>,
) -> CttItemMetrics {
    let scores = responses.item_column(item);
    let corrected: Vec<f64> = totals.iter().zip(&scores).map(|(t, s)| t - s).collect();
    let zero_variance = variance(&scores) == 0.0;
    if zero_variance {
        tracing::debug!(
            item = %responses.item_ids()[item],
            "zero-variance item, point-biserial reported as 0"
        );
    }

    CttItemMetrics {
        item_id: responses.item_ids()[item].clone(),
        p_value: mean(&scores),
        point_biserial: pearson(&scores, &corrected),
        discrimination_index: upper_lower_index(&scores, order),
        zero_variance,
        distractors,
    }
}

fn upper_lower_index(scores: &[f64], order: &[usize]) -> f64 {
    let n = order.len();
    let tail = ((n as f64 * TAIL_FRACTION).round() as usize).clamp(1, n);
    let p_of = |idx: &[usize]| idx.iter().map(|&i| scores[i]).sum::<f64>() / idx.len() as f64;
    p_of(&order[n - tail..]) - p_of(&order[..tail])
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

    #[test]
    fn block_matrix_p_values() {
        let metrics = compute_ctt(&block_matrix());
        let p: Vec<f64> = metrics.iter().map(|m| m.p_value).collect();
        assert_eq!(p, vec![0.5, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn p_values_bounded_and_distractors_sum_to_one() {
        let m = ResponseMatrix::new(&[
            vec![1, 0, 1, 1],
            vec![1, 1, 0, 1],
            vec![0, 0, 0, 1],
            vec![1, 0, 1, 1],
            vec![0, 1, 1, 1],
        ])
        .unwrap();
        for item in compute_ctt(&m) {
            assert!((0.0..=1.0).contains(&item.p_value));
            let sum: f64 = item.distractors.values().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert_eq!(item.distractors[CORRECT_OPTION], item.p_value);
        }
    }

    #[test]
    fn zero_variance_item_reports_zero_correlation() {
        let m = ResponseMatrix::new(&[vec![1, 1, 0], vec![1, 0, 0], vec![1, 1, 1]]).unwrap();
        let metrics = compute_ctt(&m);
        assert!(metrics[0].zero_variance);
        assert_eq!(metrics[0].point_biserial, 0.0);
        assert!(!metrics[0].point_biserial.is_nan());
    }

    #[test]
    fn point_biserial_uses_corrected_total() {
        // Item 1 tracks the rest of the test perfectly.
        let m = ResponseMatrix::new(&[
            vec![1, 1, 1],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![0, 0, 0],
        ])
        .unwrap();
        let metrics = compute_ctt(&m);
        assert!((metrics[0].point_biserial - 1.0).abs() < 1e-12);
        assert!((metrics[0].discrimination_index - 1.0).abs() < 1e-12);
    }

    #[test]
    fn option_level_distractors() {
        let keys = vec!["A".to_string(), "B".to_string()];
        let sel = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
        let options = OptionResponses::new(
            keys,
            vec![sel("A", "B"), sel("C", "B"), sel("A", ""), sel("D", "A")],
        )
        .unwrap();
        let metrics = compute_ctt_with_options(&options).unwrap();

        assert_eq!(metrics[0].p_value, 0.5);
        assert_eq!(metrics[0].distractors["A"], 0.5);
        assert_eq!(metrics[0].distractors["C"], 0.25);
        assert_eq!(metrics[1].distractors["B"], metrics[1].p_value);
        assert_eq!(metrics[1].distractors[OMITTED_OPTION], 0.25);
        for item in &metrics {
            let sum: f64 = item.distractors.values().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }
}
