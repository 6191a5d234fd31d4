//! Item response theory calibration for dichotomous items.
//!
//! This is a simplified estimator, not marginal maximum likelihood:
//!
//! - 1PL difficulty is the log-odds of an incorrect response, computed from
//!   the clipped proportion correct.
//! - 2PL starts from the 1PL difficulties with a constant discrimination of
//!   1.2 and iterates a bounded loop that rescales total scores into an
//!   ability proxy and re-estimates difficulty until the largest change
//!   drops below the convergence threshold. Discrimination is never
//!   re-estimated.
//! - 3PL adds a guessing asymptote equal to the proportion correct in the
//!   lowest-scoring tenth of students, clipped to [0, 0.35].
//!
//! Standard errors are a fixed typical value and infit/outfit are reported
//! at their ideal value of 1.0; neither is derived from the data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::model::ResponseMatrix;
use crate::statistics::{clip, rank_ascending, sigmoid};

const P_MIN: f64 = 0.01;
const P_MAX: f64 = 0.99;
const INITIAL_DISCRIMINATION: f64 = 1.2;
const TYPICAL_STANDARD_ERROR: f64 = 0.08;
const GUESSING_MAX: f64 = 0.35;
const LOW_ABILITY_FRACTION: f64 = 0.1;
const IDEAL_FIT: f64 = 1.0;

/// The IRT model to calibrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum IrtModel {
    #[serde(rename = "1pl")]
    OnePl,
    #[default]
    #[serde(rename = "2pl")]
    TwoPl,
    #[serde(rename = "3pl")]
    ThreePl,
}

impl fmt::Display for IrtModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrtModel::OnePl => write!(f, "1PL"),
            IrtModel::TwoPl => write!(f, "2PL"),
            IrtModel::ThreePl => write!(f, "3PL"),
        }
    }
}

impl FromStr for IrtModel {
    type Err = AnalysisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1pl" | "rasch" => Ok(IrtModel::OnePl),
            "2pl" => Ok(IrtModel::TwoPl),
            "3pl" => Ok(IrtModel::ThreePl),
            other => Err(AnalysisError::UnknownModel {
                model: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for IrtModel {
    type Error = AnalysisError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// Calibrated parameters for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemParameters {
    pub item_id: String,
    /// Ability at which P(correct) is halfway between guessing and 1.
    pub difficulty: f64,
    /// Slope; fixed at 1.0 under 1PL.
    pub discrimination: f64,
    /// Lower asymptote in [0, 0.35]; 0.0 unless 3PL.
    pub guessing: f64,
    pub difficulty_se: f64,
    pub discrimination_se: f64,
    pub infit: f64,
    pub outfit: f64,
}

impl ItemParameters {
    /// Probability of a correct response at ability `theta`.
    pub fn probability(&self, theta: f64) -> f64 {
        let p = sigmoid(self.discrimination * (theta - self.difficulty));
        self.guessing + (1.0 - self.guessing) * p
    }

    /// Fisher information of the item at ability `theta`.
    pub fn information(&self, theta: f64) -> f64 {
        let p = self.probability(theta);
        let c = self.guessing;
        if p <= c || p >= 1.0 {
            return 0.0;
        }
        let a = self.discrimination;
        a * a * ((1.0 - p) / p) * ((p - c) / (1.0 - c)).powi(2)
    }
}

/// Sum of item information at `theta`.
pub fn test_information(items: &[ItemParameters], theta: f64) -> f64 {
    items.iter().map(|item| item.information(theta)).sum()
}

/// Settings for a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrtConfig {
    #[serde(default)]
    pub model: IrtModel,
    /// Hard ceiling on estimation iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Stop once the largest difficulty change falls below this.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
}

fn default_max_iterations() -> usize {
    100
}

fn default_convergence_threshold() -> f64 {
    0.001
}

impl Default for IrtConfig {
    fn default() -> Self {
        Self {
            model: IrtModel::default(),
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
        }
    }
}

/// Output of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub model: IrtModel,
    pub items: Vec<ItemParameters>,
    /// Iterations actually run (0 for 1PL).
    pub iterations: usize,
    pub converged: bool,
    /// Largest difficulty change in the final iteration.
    pub max_change: f64,
    /// Per-student ability proxy from the rescaled total score.
    pub abilities: Vec<f64>,
}

/// Runs calibrations with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    config: IrtConfig,
}

impl Calibrator {
    pub fn new(config: IrtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IrtConfig {
        &self.config
    }

    /// Calibrate every item in `responses`.
    pub fn run(&self, responses: &ResponseMatrix) -> Calibration {
        let item_ids = responses.item_ids();
        let p_values = responses.p_values();
        let totals = responses.total_scores();
        let mut difficulties: Vec<f64> = p_values.iter().map(|&p| rasch_difficulty(p)).collect();

        let (iterations, converged, max_change, abilities) = match self.config.model {
            IrtModel::OnePl => (0, true, 0.0, ability_proxy(&totals, responses.n_items())),
            IrtModel::TwoPl | IrtModel::ThreePl => {
                self.iterate(responses, &totals, &mut difficulties)
            }
        };

        let guessing: Vec<f64> = match self.config.model {
            IrtModel::ThreePl => low_ability_guessing(responses, &totals),
            IrtModel::OnePl | IrtModel::TwoPl => vec![0.0; responses.n_items()],
        };
        let (discrimination, discrimination_se) = match self.config.model {
            IrtModel::OnePl => (1.0, 0.0),
            IrtModel::TwoPl | IrtModel::ThreePl => {
                (INITIAL_DISCRIMINATION, TYPICAL_STANDARD_ERROR)
            }
        };

        let items = difficulties
            .iter()
            .zip(&guessing)
            .zip(item_ids)
            .map(|((&difficulty, &guessing), id)| ItemParameters {
                item_id: id.clone(),
                difficulty,
                discrimination,
                guessing,
                difficulty_se: TYPICAL_STANDARD_ERROR,
                discrimination_se,
                infit: IDEAL_FIT,
                outfit: IDEAL_FIT,
            })
            .collect();

        tracing::debug!(
            model = %self.config.model,
            iterations,
            converged,
            "calibration finished"
        );

        Calibration {
            model: self.config.model,
            items,
            iterations,
            converged,
            max_change,
            abilities,
        }
    }

    /// Bounded re-estimation loop shared by 2PL and 3PL.
    fn iterate(
        &self,
        responses: &ResponseMatrix,
        totals: &[f64],
        difficulties: &mut [f64],
    ) -> (usize, bool, f64, Vec<f64>) {
        let n_items = responses.n_items();
        let mut abilities = ability_proxy(totals, n_items);
        let mut iterations = 0;
        let mut max_change = f64::INFINITY;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            abilities = ability_proxy(totals, n_items);

            max_change = 0.0;
            for (j, difficulty) in difficulties.iter_mut().enumerate() {
                let updated = rasch_difficulty(responses.proportion_correct(j));
                max_change = f64::max(max_change, (updated - *difficulty).abs());
                *difficulty = updated;
            }

            tracing::trace!(iterations, max_change, "calibration iteration");
            if max_change < self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::debug!(
                iterations,
                max_change,
                "calibration stopped at iteration cap without converging"
            );
        }
        let max_change = if max_change.is_finite() { max_change } else { 0.0 };
        (iterations, converged, max_change, abilities)
    }
}

/// Calibrate `responses` under `model` and return one parameter record per item.
pub fn calibrate(
    responses: &ResponseMatrix,
    model: IrtModel,
    max_iterations: usize,
    convergence_threshold: f64,
) -> Vec<ItemParameters> {
    Calibrator::new(IrtConfig {
        model,
        max_iterations,
        convergence_threshold,
    })
    .run(responses)
    .items
}

/// Like [`calibrate`], but resolves the model from its name first.
pub fn calibrate_named(
    responses: &ResponseMatrix,
    model: &str,
    max_iterations: usize,
    convergence_threshold: f64,
) -> Result<Vec<ItemParameters>> {
    let model: IrtModel = model.parse()?;
    Ok(calibrate(
        responses,
        model,
        max_iterations,
        convergence_threshold,
    ))
}

/// ln((1 − p) / p) with p clipped away from 0 and 1.
pub fn rasch_difficulty(p: f64) -> f64 {
    let p = clip(p, P_MIN, P_MAX);
    ((1.0 - p) / p).ln()
}

/// (total − M/2) / (M/4).
fn ability_proxy(totals: &[f64], n_items: usize) -> Vec<f64> {
    let half = n_items as f64 / 2.0;
    let quarter = n_items as f64 / 4.0;
    totals.iter().map(|t| (t - half) / quarter).collect()
}

fn low_ability_guessing(responses: &ResponseMatrix, totals: &[f64]) -> Vec<f64> {
    let n = responses.n_students();
    let n_low = ((n as f64 * LOW_ABILITY_FRACTION).floor() as usize).max(1);
    let low = &rank_ascending(totals)[..n_low];

    (0..responses.n_items())
        .map(|j| {
            let correct: f64 = low.iter().map(|&i| responses.get(i, j) as f64).sum();
            clip(correct / n_low as f64, 0.0, GUESSING_MAX)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> ResponseMatrix {
        ResponseMatrix::new(&[
            vec![1, 1, 1, 1, 0],
            vec![1, 1, 1, 0, 0],
            vec![1, 1, 0, 0, 0],
            vec![1, 0, 1, 0, 0],
            vec![1, 1, 1, 1, 1],
            vec![0, 1, 0, 0, 0],
            vec![1, 0, 0, 1, 0],
            vec![1, 1, 1, 0, 1],
            vec![0, 0, 0, 0, 0],
            vec![1, 1, 0, 1, 0],
        ])
        .unwrap()
    }

    #[test]
    fn rasch_difficulty_at_half_is_zero() {
        assert_eq!(rasch_difficulty(0.5), 0.0);
        assert!(rasch_difficulty(0.8) < 0.0);
        assert!(rasch_difficulty(0.2) > 0.0);
    }

    #[test]
    fn rasch_difficulty_is_finite_at_extremes() {
        let easy = rasch_difficulty(1.0);
        let hard = rasch_difficulty(0.0);
        assert!(easy.is_finite() && hard.is_finite());
        assert!((easy - (0.01f64 / 0.99).ln()).abs() < 1e-12);
        assert!((hard + easy).abs() < 1e-12);
    }

    #[test]
    fn one_pl_fixes_slope_and_asymptote() {
        let items = calibrate(&sample_matrix(), IrtModel::OnePl, 50, 0.001);
        assert_eq!(items.len(), 5);
        for item in &items {
            assert_eq!(item.discrimination, 1.0);
            assert_eq!(item.guessing, 0.0);
            assert_eq!(item.difficulty_se, 0.08);
            assert_eq!(item.infit, 1.0);
            assert_eq!(item.outfit, 1.0);
        }
        // Item 1 has p = 0.8, item 5 has p = 0.2.
        assert!(items[0].difficulty < items[4].difficulty);
    }

    #[test]
    fn two_pl_converges_within_budget() {
        let calibrator = Calibrator::new(IrtConfig {
            model: IrtModel::TwoPl,
            max_iterations: 25,
            convergence_threshold: 0.001,
        });
        let result = calibrator.run(&sample_matrix());
        assert!(result.converged);
        assert!(result.iterations >= 1 && result.iterations <= 25);
        assert!(result.items.iter().all(|i| i.discrimination == 1.2));
        assert_eq!(result.abilities.len(), 10);
        // Full score on 5 items: (5 - 2.5) / 1.25.
        assert!((result.abilities[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn iteration_cap_is_a_hard_ceiling() {
        let calibrator = Calibrator::new(IrtConfig {
            model: IrtModel::TwoPl,
            max_iterations: 1,
            convergence_threshold: -1.0,
        });
        let result = calibrator.run(&sample_matrix());
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);

        let zero = Calibrator::new(IrtConfig {
            model: IrtModel::TwoPl,
            max_iterations: 0,
            convergence_threshold: 0.001,
        })
        .run(&sample_matrix());
        assert_eq!(zero.iterations, 0);
        assert!(!zero.converged);
        assert_eq!(zero.items.len(), 5);
    }

    #[test]
    fn three_pl_guessing_from_lowest_scorers() {
        let items = calibrate(&sample_matrix(), IrtModel::ThreePl, 50, 0.001);
        // Lowest 10% of 10 students is the single all-zero row.
        assert!(items.iter().all(|i| i.guessing == 0.0));

        let m = ResponseMatrix::new(&[
            vec![1, 1, 1],
            vec![1, 1, 0],
            vec![1, 0, 1],
            vec![0, 1, 1],
            vec![1, 1, 1],
        ])
        .unwrap();
        let items = calibrate(&m, IrtModel::ThreePl, 50, 0.001);
        // One low-ability student (row 1, first of the ties) answered items 1 and 2.
        assert_eq!(items[0].guessing, 0.35);
        assert_eq!(items[2].guessing, 0.0);
        assert!(items.iter().all(|i| (0.0..=0.35).contains(&i.guessing)));
    }

    #[test]
    fn unknown_model_is_an_error() {
        let err = calibrate_named(&sample_matrix(), "4pl", 10, 0.01).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UnknownModel {
                model: "4pl".into()
            }
        );
        assert_eq!("Rasch".parse::<IrtModel>().unwrap(), IrtModel::OnePl);
        assert_eq!(IrtModel::ThreePl.to_string(), "3PL");
    }

    #[test]
    fn item_response_function() {
        let item = ItemParameters {
            item_id: "q".into(),
            difficulty: 0.5,
            discrimination: 1.2,
            guessing: 0.2,
            difficulty_se: 0.08,
            discrimination_se: 0.08,
            infit: 1.0,
            outfit: 1.0,
        };
        assert!((item.probability(0.5) - 0.6).abs() < 1e-12);
        assert!(item.probability(-10.0) > 0.2);
        assert!(item.information(0.5) > item.information(4.0));
        assert!(test_information(&[item.clone(), item], 0.5) > 0.0);
    }

    #[test]
    fn calibration_is_deterministic() {
        let m = sample_matrix();
        let a = calibrate(&m, IrtModel::ThreePl, 100, 0.001);
        let b = calibrate(&m, IrtModel::ThreePl, 100, 0.001);
        assert_eq!(a, b);
    }
}
