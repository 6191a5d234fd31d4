//! Markdown report generator.

use std::path::Path;

use anyhow::{Context, Result};

use calibra_core::report::AnalysisReport;

/// Generate a Markdown summary of an analysis report.
pub fn generate_markdown(report: &AnalysisReport) -> String {
    let mut md = String::new();

    md.push_str("# calibra report\n\n");
    md.push_str(&format!(
        "{} assessments, {} certified, {} failed. Model {}, generated {}.\n\n",
        report.assessments.len(),
        report.certified_count(),
        report.failures.len(),
        report.model,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    md.push_str("| Assessment | Students | Items | Alpha | SEM | DIF Flags | Certified |\n");
    md.push_str("|------------|----------|-------|-------|-----|-----------|-----------|\n");
    for a in &report.assessments {
        md.push_str(&format!(
            "| {} | {} | {} | {:.3} | {:.3} | {} | {} |\n",
            a.assessment_id,
            a.n_students,
            a.n_items,
            a.reliability.cronbach_alpha,
            a.reliability.sem,
            a.flagged_count(),
            if a.certification.certified { "yes" } else { "no" }
        ));
    }
    md.push('\n');

    for a in &report.assessments {
        // The narrative opens with its own level-2 heading.
        md.push_str(&a.certification.narrative);
        if !a.certification.narrative.ends_with('\n') {
            md.push('\n');
        }
        md.push('\n');

        md.push_str("| Item | p | r_pb | b | a | c |\n");
        md.push_str("|------|---|------|---|---|---|\n");
        for (ctt, params) in a.ctt.iter().zip(&a.calibration.items) {
            md.push_str(&format!(
                "| {} | {:.3} | {:.3} | {:.3} | {:.2} | {:.2} |\n",
                ctt.item_id,
                ctt.p_value,
                ctt.point_biserial,
                params.difficulty,
                params.discrimination,
                params.guessing
            ));
        }
        md.push('\n');
    }

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        for f in &report.failures {
            md.push_str(&format!("- **{}**: {}\n", f.assessment_id, f.error));
        }
    }

    md
}

/// Write a Markdown report to a file.
pub fn write_markdown_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let md = generate_markdown(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, md)
        .with_context(|| format!("failed to write Markdown report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::make_test_report;

    #[test]
    fn markdown_lists_assessments_and_items() {
        let md = generate_markdown(&make_test_report());
        assert!(md.starts_with("# calibra report"));
        assert!(md.contains("| algebra-1 | 6 | 5 |"));
        assert!(md.contains("## Certification:"));
        assert!(md.contains("| item3 |"));
        assert!(md.contains("## Failures"));
        assert!(md.contains("**broken**"));
    }

    #[test]
    fn markdown_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_markdown_report(&make_test_report(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("algebra-1"));
    }
}
