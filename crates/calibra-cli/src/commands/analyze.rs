//! The `calibra analyze` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use calibra_core::config::load_config_from;
use calibra_core::engine::{AssessmentAnalysis, BatchEngine, ProgressReporter};
use calibra_core::parser;
use calibra_core::report::AnalysisReport;
use calibra_report::{write_html_report, write_markdown_report};

/// Command-line options; every `Some` overrides the loaded config.
pub struct AnalyzeArgs {
    pub dataset: PathBuf,
    pub model: Option<String>,
    pub reliability: Option<String>,
    pub dif: Option<String>,
    pub max_iterations: Option<usize>,
    pub convergence_threshold: Option<f64>,
    pub parallelism: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_assessment_start(&self, assessment_id: &str) {
        eprintln!("  Queued: {assessment_id}");
    }

    fn on_assessment_complete(&self, analysis: &AssessmentAnalysis) {
        eprintln!(
            "  Done: {} alpha {:.3} SEM {:.3} [{}] ({}ms)",
            analysis.assessment_id,
            analysis.reliability.cronbach_alpha,
            analysis.reliability.sem,
            if analysis.certification.certified {
                "CERTIFIED"
            } else {
                "NOT CERTIFIED"
            },
            analysis.duration_ms,
        );
    }

    fn on_assessment_error(&self, assessment_id: &str, error: &str) {
        eprintln!("  ERROR: {assessment_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} analyzed, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;

    if let Some(model) = &args.model {
        config.irt.model = model.parse().context("invalid --model")?;
    }
    if let Some(method) = &args.reliability {
        config.reliability.method = method.parse().context("invalid --reliability")?;
    }
    if let Some(method) = &args.dif {
        config.dif.method = method.parse().context("invalid --dif")?;
    }
    if let Some(n) = args.max_iterations {
        config.irt.max_iterations = n;
    }
    if let Some(threshold) = args.convergence_threshold {
        anyhow::ensure!(
            threshold.is_finite() && threshold >= 0.0,
            "convergence threshold must be a non-negative number"
        );
        config.irt.convergence_threshold = threshold;
    }
    if let Some(parallelism) = args.parallelism {
        anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
        config.parallelism = parallelism;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    tracing::debug!(
        model = %config.irt.model,
        reliability = %config.reliability.method,
        dif = %config.dif.method,
        parallelism = config.parallelism,
        "resolved analysis config"
    );

    let formats: Vec<&str> = if args.format == "all" {
        vec!["json", "html", "markdown"]
    } else {
        args.format.split(',').map(str::trim).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            matches!(*fmt, "json" | "html" | "markdown" | "md"),
            "unknown format: '{fmt}' (expected json, html, markdown or all)"
        );
    }

    let datasets = parser::load_datasets(&args.dataset)?;
    anyhow::ensure!(
        !datasets.is_empty(),
        "no datasets found in {}",
        args.dataset.display()
    );

    eprintln!(
        "calibra v{}: analyzing {} assessment(s) with the {} model",
        env!("CARGO_PKG_VERSION"),
        datasets.len(),
        config.irt.model
    );
    eprintln!();

    let output_dir = config.output_dir.clone();
    let engine = BatchEngine::new(config);
    let report = engine.run(datasets, &ConsoleReporter).await?;

    print_summary(&report);

    anyhow::ensure!(
        !report.assessments.is_empty(),
        "no assessment could be analyzed"
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output_dir.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "html" => {
                let path = output_dir.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            _ => {
                let path = output_dir.join(format!("report-{timestamp}.md"));
                write_markdown_report(&report, &path)?;
                eprintln!("Markdown report: {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Assessment",
        "Students",
        "Items",
        "Alpha",
        "SEM",
        "DIF Flags",
        "Certified",
    ]);

    for a in &report.assessments {
        table.add_row(vec![
            Cell::new(&a.assessment_id),
            Cell::new(a.n_students),
            Cell::new(a.n_items),
            Cell::new(format!("{:.3}", a.reliability.cronbach_alpha)),
            Cell::new(format!("{:.3}", a.reliability.sem)),
            Cell::new(a.flagged_count()),
            Cell::new(if a.certification.certified { "yes" } else { "no" }),
        ]);
    }

    eprintln!("\n{table}");
}
