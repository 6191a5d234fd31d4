//! The `calibra compare` command.

use std::path::PathBuf;

use anyhow::Result;

use calibra_core::report::AnalysisReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_drift: bool,
    format: String,
) -> Result<()> {
    anyhow::ensure!(
        threshold.is_finite() && threshold >= 0.0,
        "threshold must be a non-negative number"
    );

    let baseline = AnalysisReport::load_json(&baseline_path)?;
    let current = AnalysisReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            // text format
            println!(
                "Comparison: {} drifted, {} stable, {} new, {} removed",
                report.drifted.len(),
                report.stable,
                report.new_items.len(),
                report.removed_items.len()
            );

            if !report.drifted.is_empty() {
                println!("\nDrifted items:");
                for d in &report.drifted {
                    println!(
                        "  {}/{} b {:.3} -> {:.3} ({:+.3})",
                        d.assessment_id,
                        d.item_id,
                        d.baseline_difficulty,
                        d.current_difficulty,
                        d.delta
                    );
                }
            }

            if !report.reliability_changes.is_empty() {
                println!("\nReliability:");
                for r in &report.reliability_changes {
                    let note = if r.lost_certification() {
                        " LOST CERTIFICATION"
                    } else {
                        ""
                    };
                    println!(
                        "  {} alpha {:.3} -> {:.3} ({:+.3}){note}",
                        r.assessment_id, r.baseline_alpha, r.current_alpha, r.delta
                    );
                }
            }
        }
    }

    if fail_on_drift && report.has_drift() {
        std::process::exit(1);
    }

    Ok(())
}
