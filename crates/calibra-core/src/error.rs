//! Analysis error types.
//!
//! These errors represent contract violations in the input handed to an
//! analyzer: an unsupported model or method name, a malformed response
//! matrix, or group labels that do not describe exactly two groups.
//! Numerically degenerate but valid input (constant columns, zero variance)
//! is never an error; analyzers report a conservative 0 instead.

use thiserror::Error;

/// Errors raised by the analyzers in this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The requested IRT model is not one of 1PL, 2PL or 3PL.
    #[error("unknown IRT model: '{model}' (expected 1pl, 2pl or 3pl)")]
    UnknownModel { model: String },

    /// The requested method for an analysis is not supported.
    #[error("unknown {kind} method: '{method}'")]
    UnknownMethod { kind: &'static str, method: String },

    /// DIF analysis needs exactly two distinct group labels.
    #[error("DIF analysis requires exactly 2 groups, found {found}: {labels:?}")]
    InvalidGroupCount { found: usize, labels: Vec<String> },

    /// A group label named as the reference group does not occur in the data.
    #[error("reference group '{label}' not present in group labels")]
    UnknownGroup { label: String },

    /// Two inputs that must agree in length do not.
    #[error("{what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The response matrix has no students or no items.
    #[error("response matrix is empty")]
    EmptyMatrix,

    /// A response row has a different length than the first row.
    #[error("response row {row} has {found} items, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A response cell is not 0 or 1.
    #[error("response for student {student}, item {item} must be 0 or 1, got {value}")]
    InvalidResponse {
        student: usize,
        item: usize,
        value: i64,
    },

    /// A score vector handed to the equating engine is empty.
    #[error("form {form} has no scores")]
    EmptyScores { form: &'static str },

    /// A score handed to the equating engine is NaN or infinite.
    #[error("form {form} score at index {index} is not a finite number")]
    NonFiniteScore { form: &'static str, index: usize },

    /// Form B spans more raw score points than a linear table may hold.
    #[error("form {form} spans {points} raw score points, at most {max} are supported")]
    ScoreRangeTooWide {
        form: &'static str,
        points: u64,
        max: u64,
    },

    /// The answer key for an item is blank.
    #[error("answer key for item {item} is empty")]
    MissingKey { item: usize },
}

impl AnalysisError {
    /// Returns `true` for errors caused by an unsupported model or method name.
    pub fn is_unsupported_selector(&self) -> bool {
        matches!(
            self,
            AnalysisError::UnknownModel { .. } | AnalysisError::UnknownMethod { .. }
        )
    }
}

/// Result alias for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = AnalysisError::UnknownModel {
            model: "4pl".into(),
        };
        assert!(err.to_string().contains("'4pl'"));

        let err = AnalysisError::InvalidGroupCount {
            found: 3,
            labels: vec!["a".into(), "b".into(), "c".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("found 3"));
        assert!(msg.contains("\"c\""));
    }

    #[test]
    fn unsupported_selector_classification() {
        assert!(AnalysisError::UnknownMethod {
            kind: "equating",
            method: "kernel".into()
        }
        .is_unsupported_selector());
        assert!(!AnalysisError::EmptyMatrix.is_unsupported_selector());
    }
}
