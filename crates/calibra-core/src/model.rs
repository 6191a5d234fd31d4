//! Core data model types for calibra.
//!
//! These are the inputs every analyzer shares: the validated binary
//! response matrix, option-level selections that score into one, and the
//! two-group labelling used by DIF analysis. All of them are immutable once
//! constructed; analyzers only ever borrow them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// A students × items matrix of dichotomous responses (1 = correct).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMatrix {
    n_students: usize,
    n_items: usize,
    cells: Vec<u8>,
    student_ids: Vec<String>,
    item_ids: Vec<String>,
}

impl ResponseMatrix {
    /// Build a matrix from rows of 0/1 values.
    ///
    /// Rejects an empty matrix, ragged rows and any value other than 0 or 1.
    pub fn new<T>(rows: &[Vec<T>]) -> Result<Self>
    where
        T: Copy + Into<i64>,
    {
        let n_students = rows.len();
        let n_items = rows.first().map(|r| r.len()).unwrap_or(0);
        if n_students == 0 || n_items == 0 {
            return Err(AnalysisError::EmptyMatrix);
        }

        let mut cells = Vec::with_capacity(n_students * n_items);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_items {
                return Err(AnalysisError::RaggedMatrix {
                    row: i,
                    expected: n_items,
                    found: row.len(),
                });
            }
            for (j, &value) in row.iter().enumerate() {
                match Into::<i64>::into(value) {
                    0 => cells.push(0),
                    1 => cells.push(1),
                    other => {
                        return Err(AnalysisError::InvalidResponse {
                            student: i,
                            item: j,
                            value: other,
                        })
                    }
                }
            }
        }

        Ok(Self {
            n_students,
            n_items,
            cells,
            student_ids: (1..=n_students).map(|i| format!("s{i}")).collect(),
            item_ids: (1..=n_items).map(|j| format!("item{j}")).collect(),
        })
    }

    /// Attach student and item identifiers.
    pub fn with_ids(mut self, student_ids: Vec<String>, item_ids: Vec<String>) -> Result<Self> {
        if student_ids.len() != self.n_students {
            return Err(AnalysisError::DimensionMismatch {
                what: "student ids",
                expected: self.n_students,
                found: student_ids.len(),
            });
        }
        if item_ids.len() != self.n_items {
            return Err(AnalysisError::DimensionMismatch {
                what: "item ids",
                expected: self.n_items,
                found: item_ids.len(),
            });
        }
        self.student_ids = student_ids;
        self.item_ids = item_ids;
        Ok(self)
    }

    pub fn n_students(&self) -> usize {
        self.n_students
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn student_ids(&self) -> &[String] {
        &self.student_ids
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    /// Response of `student` to `item`.
    pub fn get(&self, student: usize, item: usize) -> u8 {
        self.cells[student * self.n_items + item]
    }

    /// All responses of one student.
    pub fn row(&self, student: usize) -> &[u8] {
        let start = student * self.n_items;
        &self.cells[start..start + self.n_items]
    }

    /// Responses to one item as floats, one per student.
    pub fn item_column(&self, item: usize) -> Vec<f64> {
        (0..self.n_students)
            .map(|i| self.get(i, item) as f64)
            .collect()
    }

    /// Number correct per student.
    pub fn total_scores(&self) -> Vec<f64> {
        (0..self.n_students)
            .map(|i| self.row(i).iter().map(|&v| v as f64).sum())
            .collect()
    }

    /// Proportion of students answering `item` correctly.
    pub fn proportion_correct(&self, item: usize) -> f64 {
        let correct: usize = (0..self.n_students)
            .map(|i| self.get(i, item) as usize)
            .sum();
        correct as f64 / self.n_students as f64
    }

    /// Proportion correct for every item.
    pub fn p_values(&self) -> Vec<f64> {
        (0..self.n_items)
            .map(|j| self.proportion_correct(j))
            .collect()
    }
}

/// Option-level multiple-choice selections with one answer key per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResponses {
    keys: Vec<String>,
    selections: Vec<Vec<String>>,
    #[serde(default)]
    item_ids: Option<Vec<String>>,
}

impl OptionResponses {
    /// An empty selection string records an omitted item.
    pub fn new(keys: Vec<String>, selections: Vec<Vec<String>>) -> Result<Self> {
        if keys.is_empty() || selections.is_empty() {
            return Err(AnalysisError::EmptyMatrix);
        }
        if let Some(item) = keys.iter().position(|k| k.is_empty()) {
            return Err(AnalysisError::MissingKey { item });
        }
        for (i, row) in selections.iter().enumerate() {
            if row.len() != keys.len() {
                return Err(AnalysisError::RaggedMatrix {
                    row: i,
                    expected: keys.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            keys,
            selections,
            item_ids: None,
        })
    }

    /// Attach item identifiers carried over to the scored matrix.
    pub fn with_item_ids(mut self, item_ids: Vec<String>) -> Result<Self> {
        if item_ids.len() != self.keys.len() {
            return Err(AnalysisError::DimensionMismatch {
                what: "item ids",
                expected: self.keys.len(),
                found: item_ids.len(),
            });
        }
        self.item_ids = Some(item_ids);
        Ok(self)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The option `student` chose on `item`.
    pub fn selection(&self, student: usize, item: usize) -> &str {
        &self.selections[student][item]
    }

    pub fn n_students(&self) -> usize {
        self.selections.len()
    }

    pub fn n_items(&self) -> usize {
        self.keys.len()
    }

    /// Score against the keys: a selection equal to the key is correct.
    pub fn score(&self) -> Result<ResponseMatrix> {
        let rows: Vec<Vec<u8>> = self
            .selections
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.keys)
                    .map(|(sel, key)| u8::from(sel == key))
                    .collect()
            })
            .collect();
        let matrix = ResponseMatrix::new(&rows)?;
        match &self.item_ids {
            Some(ids) => {
                let students = matrix.student_ids().to_vec();
                matrix.with_ids(students, ids.clone())
            }
            None => Ok(matrix),
        }
    }
}

/// Assignment of every student to one of exactly two groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLabels {
    labels: Vec<String>,
    reference: String,
    focal: String,
}

impl GroupLabels {
    /// Build labels; the lexicographically first label is the reference group.
    pub fn new(labels: Vec<String>) -> Result<Self> {
        let distinct = distinct_labels(&labels)?;
        let reference = distinct[0].clone();
        let focal = distinct[1].clone();
        Ok(Self {
            labels,
            reference,
            focal,
        })
    }

    /// Build labels with an explicitly chosen reference group.
    pub fn with_reference(labels: Vec<String>, reference: &str) -> Result<Self> {
        let distinct = distinct_labels(&labels)?;
        let focal = match distinct.iter().position(|l| l == reference) {
            Some(0) => distinct[1].clone(),
            Some(_) => distinct[0].clone(),
            None => {
                return Err(AnalysisError::UnknownGroup {
                    label: reference.to_string(),
                })
            }
        };
        Ok(Self {
            labels,
            reference: reference.to_string(),
            focal,
        })
    }

    /// The same labelling with reference and focal roles exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            labels: self.labels.clone(),
            reference: self.focal.clone(),
            focal: self.reference.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn focal(&self) -> &str {
        &self.focal
    }

    pub fn is_reference(&self, student: usize) -> bool {
        self.labels[student] == self.reference
    }
}

fn distinct_labels(labels: &[String]) -> Result<Vec<String>> {
    let distinct: BTreeSet<&String> = labels.iter().collect();
    if distinct.len() != 2 {
        return Err(AnalysisError::InvalidGroupCount {
            found: distinct.len(),
            labels: distinct.into_iter().cloned().collect(),
        });
    }
    Ok(distinct.into_iter().cloned().collect())
}

/// One assessment's response data as loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Unique identifier for this assessment.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of the assessment.
    pub description: String,
    /// Scored responses.
    pub responses: ResponseMatrix,
    /// Option-level selections, when the source recorded them.
    pub options: Option<OptionResponses>,
    /// One group label per student, when the source recorded them.
    pub group_labels: Option<Vec<String>>,
    /// Explicit reference group for DIF analysis.
    pub reference_group: Option<String>,
}

impl Dataset {
    /// Group labels for DIF, or `None` if the dataset has none.
    pub fn groups(&self) -> Option<Result<GroupLabels>> {
        let labels = self.group_labels.clone()?;
        Some(match &self.reference_group {
            Some(reference) => GroupLabels::with_reference(labels, reference),
            None => GroupLabels::new(labels),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matrix_accessors() {
        let m = ResponseMatrix::new(&[vec![1, 0, 1], vec![0, 0, 1]]).unwrap();
        assert_eq!(m.n_students(), 2);
        assert_eq!(m.n_items(), 3);
        assert_eq!(m.row(1), &[0, 0, 1]);
        assert_eq!(m.total_scores(), vec![2.0, 1.0]);
        assert_eq!(m.p_values(), vec![0.5, 0.0, 1.0]);
        assert_eq!(m.item_ids()[2], "item3");
    }

    #[test]
    fn matrix_rejects_bad_input() {
        let empty: Vec<Vec<i32>> = vec![];
        assert_eq!(ResponseMatrix::new(&empty), Err(AnalysisError::EmptyMatrix));
        assert!(matches!(
            ResponseMatrix::new(&[vec![1, 0], vec![1]]),
            Err(AnalysisError::RaggedMatrix { row: 1, .. })
        ));
        assert!(matches!(
            ResponseMatrix::new(&[vec![1, 2]]),
            Err(AnalysisError::InvalidResponse {
                item: 1,
                value: 2,
                ..
            })
        ));
    }

    #[test]
    fn matrix_ids_must_match_dimensions() {
        let m = ResponseMatrix::new(&[vec![1, 0]]).unwrap();
        assert!(m
            .clone()
            .with_ids(labels(&["a"]), labels(&["q1"]))
            .is_err());
        let m = m.with_ids(labels(&["a"]), labels(&["q1", "q2"])).unwrap();
        assert_eq!(m.student_ids(), &["a".to_string()]);
    }

    #[test]
    fn options_score_against_keys() {
        let options = OptionResponses::new(
            labels(&["A", "C"]),
            vec![labels(&["A", "B"]), labels(&["D", "C"]), labels(&["A", ""])],
        )
        .unwrap();
        let m = options.score().unwrap();
        assert_eq!(m.row(0), &[1, 0]);
        assert_eq!(m.row(1), &[0, 1]);
        assert_eq!(m.row(2), &[1, 0]);
    }

    #[test]
    fn blank_key_is_rejected() {
        let err = OptionResponses::new(labels(&["A", ""]), vec![labels(&["A", "B"])]).unwrap_err();
        assert_eq!(err, AnalysisError::MissingKey { item: 1 });
    }

    #[test]
    fn groups_require_exactly_two_labels() {
        assert!(matches!(
            GroupLabels::new(labels(&["a", "a"])),
            Err(AnalysisError::InvalidGroupCount { found: 1, .. })
        ));
        assert!(matches!(
            GroupLabels::new(labels(&["a", "b", "c"])),
            Err(AnalysisError::InvalidGroupCount { found: 3, .. })
        ));
        let g = GroupLabels::new(labels(&["focal", "control", "focal"])).unwrap();
        assert_eq!(g.reference(), "control");
        assert_eq!(g.focal(), "focal");
        assert!(g.is_reference(1));
    }

    #[test]
    fn explicit_reference_and_swap() {
        let g = GroupLabels::with_reference(labels(&["x", "y"]), "y").unwrap();
        assert_eq!(g.reference(), "y");
        assert_eq!(g.focal(), "x");
        let s = g.swapped();
        assert_eq!(s.reference(), "x");
        assert!(matches!(
            GroupLabels::with_reference(labels(&["x", "y"]), "z"),
            Err(AnalysisError::UnknownGroup { .. })
        ));
    }
}
