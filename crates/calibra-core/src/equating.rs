//! Observed-score equating of Form B raw scores onto the Form A scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::statistics::{interpolate, mean, percentile, round1, std_dev};

/// Upper bound on the raw score points in a linear conversion table.
const MAX_LINEAR_TABLE_ROWS: u64 = 100_000;

/// Equating method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum EquatingMethod {
    #[default]
    Linear,
    Equipercentile,
}

impl fmt::Display for EquatingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquatingMethod::Linear => write!(f, "linear"),
            EquatingMethod::Equipercentile => write!(f, "equipercentile"),
        }
    }
}

impl FromStr for EquatingMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(EquatingMethod::Linear),
            "equipercentile" => Ok(EquatingMethod::Equipercentile),
            other => Err(AnalysisError::UnknownMethod {
                kind: "equating",
                method: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EquatingMethod {
    type Error = AnalysisError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// One row of the raw → equated lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreConversion {
    /// Form B raw score.
    pub raw: f64,
    /// Form A equivalent, rounded to one decimal.
    pub equated: f64,
}

/// Method-specific parameters of an equating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum EquatingParameters {
    Linear {
        slope: f64,
        intercept: f64,
    },
    Equipercentile {
        /// 1st..=99th percentiles of Form A.
        form_a_percentiles: Vec<f64>,
        /// 1st..=99th percentiles of Form B.
        form_b_percentiles: Vec<f64>,
    },
}

/// Result of equating Form B onto Form A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquatingResult {
    pub parameters: EquatingParameters,
    pub conversions: Vec<ScoreConversion>,
}

impl EquatingResult {
    pub fn method(&self) -> EquatingMethod {
        match self.parameters {
            EquatingParameters::Linear { .. } => EquatingMethod::Linear,
            EquatingParameters::Equipercentile { .. } => EquatingMethod::Equipercentile,
        }
    }

    /// Form A equivalent of any Form B raw score.
    ///
    /// Linear equating applies the line directly; equipercentile
    /// interpolates along the lookup table, clamping at its ends.
    pub fn convert(&self, raw: f64) -> f64 {
        match &self.parameters {
            EquatingParameters::Linear { slope, intercept } => round1(slope * raw + intercept),
            EquatingParameters::Equipercentile { .. } => {
                let xs: Vec<f64> = self.conversions.iter().map(|c| c.raw).collect();
                let ys: Vec<f64> = self.conversions.iter().map(|c| c.equated).collect();
                round1(interpolate(raw, &xs, &ys))
            }
        }
    }
}

/// Equate Form B raw scores onto the Form A scale.
pub fn equate(form_a: &[f64], form_b: &[f64], method: EquatingMethod) -> Result<EquatingResult> {
    if form_a.is_empty() {
        return Err(AnalysisError::EmptyScores { form: "A" });
    }
    if form_b.is_empty() {
        return Err(AnalysisError::EmptyScores { form: "B" });
    }
    check_finite(form_a, "A")?;
    check_finite(form_b, "B")?;

    let result = match method {
        EquatingMethod::Linear => linear(form_a, form_b)?,
        EquatingMethod::Equipercentile => equipercentile(form_a, form_b),
    };
    tracing::debug!(
        %method,
        conversions = result.conversions.len(),
        "equating finished"
    );
    Ok(result)
}

/// Like [`equate`], but resolves the method from its name first.
pub fn equate_named(form_a: &[f64], form_b: &[f64], method: &str) -> Result<EquatingResult> {
    equate(form_a, form_b, method.parse()?)
}

fn check_finite(scores: &[f64], form: &'static str) -> Result<()> {
    match scores.iter().position(|s| !s.is_finite()) {
        Some(index) => Err(AnalysisError::NonFiniteScore { form, index }),
        None => Ok(()),
    }
}

fn linear(form_a: &[f64], form_b: &[f64]) -> Result<EquatingResult> {
    let sd_b = std_dev(form_b);
    let slope = if sd_b == 0.0 {
        1.0
    } else {
        std_dev(form_a) / sd_b
    };
    let intercept = mean(form_a) - slope * mean(form_b);

    let min = form_b.iter().copied().fold(f64::INFINITY, f64::min).floor();
    let max = form_b.iter().copied().fold(f64::NEG_INFINITY, f64::max).ceil();
    let points = max - min + 1.0;
    if points > MAX_LINEAR_TABLE_ROWS as f64 {
        return Err(AnalysisError::ScoreRangeTooWide {
            form: "B",
            points: points.min(u64::MAX as f64) as u64,
            max: MAX_LINEAR_TABLE_ROWS,
        });
    }
    let conversions = (min as i64..=max as i64)
        .map(|raw| {
            let raw = raw as f64;
            ScoreConversion {
                raw,
                equated: round1(slope * raw + intercept),
            }
        })
        .collect();

    Ok(EquatingResult {
        parameters: EquatingParameters::Linear { slope, intercept },
        conversions,
    })
}

fn equipercentile(form_a: &[f64], form_b: &[f64]) -> EquatingResult {
    let sorted_a = sorted(form_a);
    let sorted_b = sorted(form_b);
    let levels: Vec<f64> = (1..=99).map(f64::from).collect();
    let form_a_percentiles: Vec<f64> = levels.iter().map(|&q| percentile(&sorted_a, q)).collect();
    let form_b_percentiles: Vec<f64> = levels.iter().map(|&q| percentile(&sorted_b, q)).collect();

    let mut unique_b = sorted_b.clone();
    unique_b.dedup();
    let n_b = sorted_b.len() as f64;

    let conversions = unique_b
        .into_iter()
        .map(|raw| {
            let below = sorted_b.partition_point(|&s| s < raw) as f64;
            let rank = below / n_b * 100.0;
            ScoreConversion {
                raw,
                equated: round1(interpolate(rank, &levels, &form_a_percentiles)),
            }
        })
        .collect();

    EquatingResult {
        parameters: EquatingParameters::Equipercentile {
            form_a_percentiles,
            form_b_percentiles,
        },
        conversions,
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}
