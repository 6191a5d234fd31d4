//! TOML dataset parser.
//!
//! Loads assessment response datasets and equating inputs from TOML files
//! and directories, and validates datasets for common issues.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Dataset, OptionResponses, ResponseMatrix};
use crate::statistics::variance;

/// Intermediate TOML structure for parsing dataset files.
#[derive(Debug, Deserialize)]
struct TomlDatasetFile {
    assessment: TomlAssessmentHeader,
    #[serde(default)]
    students: Vec<TomlStudent>,
}

#[derive(Debug, Deserialize)]
struct TomlAssessmentHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    items: Option<Vec<String>>,
    #[serde(default)]
    keys: Option<Vec<String>>,
    #[serde(default)]
    reference_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlStudent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    responses: Option<Vec<i64>>,
    #[serde(default)]
    selections: Option<Vec<String>>,
}

/// Two score distributions to equate, as read from an equating file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquatingInput {
    pub id: String,
    #[serde(default)]
    pub method: Option<String>,
    pub form_a: Vec<f64>,
    pub form_b: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlEquatingFile {
    equating: EquatingInput,
}

/// Parse a single TOML file into a `Dataset`.
pub fn parse_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file: {}", path.display()))?;

    parse_dataset_str(&content, path)
}

/// Parse a TOML string into a `Dataset` (useful for testing).
pub fn parse_dataset_str(content: &str, source_path: &Path) -> Result<Dataset> {
    let parsed: TomlDatasetFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    let header = parsed.assessment;

    anyhow::ensure!(
        !parsed.students.is_empty(),
        "dataset '{}' has no students",
        header.id
    );

    let student_ids: Vec<String> = parsed
        .students
        .iter()
        .enumerate()
        .map(|(i, s)| s.id.clone().unwrap_or_else(|| format!("s{}", i + 1)))
        .collect();

    let options = match &header.keys {
        Some(keys) => {
            let selections = parsed
                .students
                .iter()
                .zip(&student_ids)
                .map(|(s, id)| {
                    s.selections
                        .clone()
                        .with_context(|| format!("student '{id}' has no selections"))
                })
                .collect::<Result<Vec<_>>>()?;
            let mut options = OptionResponses::new(keys.clone(), selections)
                .with_context(|| format!("invalid selections in '{}'", header.id))?;
            if let Some(items) = &header.items {
                options = options.with_item_ids(items.clone())?;
            }
            Some(options)
        }
        None => None,
    };

    let responses = match &options {
        Some(options) => options.score()?,
        None => {
            let rows = parsed
                .students
                .iter()
                .zip(&student_ids)
                .map(|(s, id)| {
                    s.responses
                        .clone()
                        .with_context(|| format!("student '{id}' has no responses"))
                })
                .collect::<Result<Vec<_>>>()?;
            ResponseMatrix::new(&rows)
                .with_context(|| format!("invalid responses in '{}'", header.id))?
        }
    };

    let item_ids = header
        .items
        .clone()
        .unwrap_or_else(|| responses.item_ids().to_vec());
    let responses = responses.with_ids(student_ids, item_ids)?;

    let labelled = parsed.students.iter().filter(|s| s.group.is_some()).count();
    let group_labels = if labelled == 0 {
        None
    } else if labelled == parsed.students.len() {
        Some(
            parsed
                .students
                .iter()
                .filter_map(|s| s.group.clone())
                .collect(),
        )
    } else {
        anyhow::bail!(
            "dataset '{}': {} of {} students have a group label; label all or none",
            header.id,
            labelled,
            parsed.students.len()
        );
    };

    Ok(Dataset {
        id: header.id,
        name: header.name,
        description: header.description,
        responses,
        options,
        group_labels,
        reference_group: header.reference_group,
    })
}

/// Recursively load all `.toml` dataset files from a directory.
pub fn load_dataset_directory(dir: &Path) -> Result<Vec<Dataset>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_dataset_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_dataset(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load a dataset file, or every dataset under a directory.
pub fn load_datasets(path: &Path) -> Result<Vec<Dataset>> {
    if path.is_dir() {
        load_dataset_directory(path)
    } else {
        Ok(vec![parse_dataset(path)?])
    }
}

/// Parse an equating file.
pub fn parse_equating(path: &Path) -> Result<EquatingInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read equating file: {}", path.display()))?;
    parse_equating_str(&content, path)
}

/// Parse an equating TOML string.
pub fn parse_equating_str(content: &str, source_path: &Path) -> Result<EquatingInput> {
    let parsed: TomlEquatingFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    Ok(parsed.equating)
}

/// A warning from dataset validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item or student the warning concerns (if applicable).
    pub subject: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a dataset for conditions that weaken or disable an analysis.
pub fn validate_dataset(set: &Dataset) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let m = &set.responses;

    if m.n_items() < 2 {
        warnings.push(ValidationWarning {
            subject: None,
            message: "fewer than 2 items; reliability will be reported as 0".into(),
        });
    }

    // Duplicate ids
    let mut seen = HashSet::new();
    for id in m.student_ids() {
        if !seen.insert(id) {
            warnings.push(ValidationWarning {
                subject: Some(id.clone()),
                message: format!("duplicate student ID: {id}"),
            });
        }
    }
    let mut seen = HashSet::new();
    for id in m.item_ids() {
        if !seen.insert(id) {
            warnings.push(ValidationWarning {
                subject: Some(id.clone()),
                message: format!("duplicate item ID: {id}"),
            });
        }
    }

    // Items everyone got right or wrong
    for (j, id) in m.item_ids().iter().enumerate() {
        if variance(&m.item_column(j)) == 0.0 {
            warnings.push(ValidationWarning {
                subject: Some(id.clone()),
                message: "item has zero variance; point-biserial will be 0".into(),
            });
        }
    }

    // Perfect and zero scores
    for (i, id) in m.student_ids().iter().enumerate() {
        let total: usize = m.row(i).iter().map(|&v| v as usize).sum();
        if total == 0 || total == m.n_items() {
            warnings.push(ValidationWarning {
                subject: Some(id.clone()),
                message: format!("student has an extreme score ({total}/{})", m.n_items()),
            });
        }
    }

    match &set.group_labels {
        None => warnings.push(ValidationWarning {
            subject: None,
            message: "no group labels; DIF analysis will be skipped".into(),
        }),
        Some(labels) => {
            let distinct: BTreeSet<&String> = labels.iter().collect();
            if distinct.len() != 2 {
                warnings.push(ValidationWarning {
                    subject: None,
                    message: format!(
                        "DIF analysis needs exactly 2 groups, found {}",
                        distinct.len()
                    ),
                });
            } else if let Some(reference) = &set.reference_group {
                if !distinct.contains(reference) {
                    warnings.push(ValidationWarning {
                        subject: None,
                        message: format!("reference group '{reference}' does not occur"),
                    });
                }
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[assessment]
id = "algebra-quiz"
name = "Algebra Quiz"
description = "Five-item quiz"
items = ["q1", "q2", "q3"]

[[students]]
id = "s001"
group = "control"
responses = [1, 0, 1]

[[students]]
id = "s002"
group = "treatment"
responses = [0, 0, 1]

[[students]]
id = "s003"
group = "control"
responses = [1, 1, 1]
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_dataset_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.id, "algebra-quiz");
        assert_eq!(set.responses.n_students(), 3);
        assert_eq!(set.responses.n_items(), 3);
        assert_eq!(set.responses.item_ids()[1], "q2");
        assert_eq!(set.responses.student_ids()[2], "s003");
        let groups = set.groups().unwrap().unwrap();
        assert_eq!(groups.reference(), "control");
    }

    #[test]
    fn parse_option_level_data() {
        let toml = r#"
[assessment]
id = "mc"
name = "Multiple choice"
keys = ["A", "C"]

[[students]]
selections = ["A", "B"]

[[students]]
selections = ["D", "C"]
"#;
        let set = parse_dataset_str(toml, &PathBuf::from("mc.toml")).unwrap();
        assert!(set.options.is_some());
        assert_eq!(set.responses.row(0), &[1, 0]);
        assert_eq!(set.responses.row(1), &[0, 1]);
        assert_eq!(set.responses.student_ids()[0], "s1");
        assert!(set.group_labels.is_none());
    }

    #[test]
    fn partial_group_labels_are_rejected() {
        let toml = r#"
[assessment]
id = "partial"
name = "Partial"

[[students]]
group = "a"
responses = [1, 0]

[[students]]
responses = [0, 1]
"#;
        let err = parse_dataset_str(toml, &PathBuf::from("p.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("label all or none"));
    }

    #[test]
    fn invalid_response_value_is_rejected() {
        let toml = r#"
[assessment]
id = "bad"
name = "Bad"

[[students]]
responses = [1, 3]
"#;
        let err = parse_dataset_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("must be 0 or 1"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_dataset_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_reports_degenerate_data() {
        let set = parse_dataset_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_dataset(&set);
        // q3 is answered correctly by everyone; s003 has a perfect score.
        assert!(warnings
            .iter()
            .any(|w| w.subject.as_deref() == Some("q3") && w.message.contains("zero variance")));
        assert!(warnings
            .iter()
            .any(|w| w.subject.as_deref() == Some("s003") && w.message.contains("extreme")));
        assert!(!warnings.iter().any(|w| w.message.contains("groups")));
    }

    #[test]
    fn parse_equating_file() {
        let toml = r#"
[equating]
id = "spring-forms"
method = "equipercentile"
form_a = [10.0, 12.0, 15.0]
form_b = [9.0, 11.0, 16.0]
"#;
        let input = parse_equating_str(toml, &PathBuf::from("eq.toml")).unwrap();
        assert_eq!(input.id, "spring-forms");
        assert_eq!(input.method.as_deref(), Some("equipercentile"));
        assert_eq!(input.form_b.len(), 3);
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("quiz.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not toml {").unwrap();

        let sets = load_dataset_directory(dir.path()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, "algebra-quiz");
    }
}
