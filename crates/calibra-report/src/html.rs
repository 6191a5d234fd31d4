//! Single-page HTML rendering of an analysis report.
//!
//! The page needs no network access: styles, the table-sorting script and
//! the reliability chart are embedded in the document itself.

use anyhow::{Context, Result};
use std::path::Path;

use calibra_core::engine::AssessmentAnalysis;
use calibra_core::report::AnalysisReport;

/// Replace the five HTML-significant characters with entities.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Render the whole report, one section per assessment.
pub fn generate_html(report: &AnalysisReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>calibra report {}</title>\n",
        report.created_at.format("%Y-%m-%d")
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>calibra report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">{} assessments | {} certified | {} failed | {} model | {}</p>\n",
        report.assessments.len(),
        report.certified_count(),
        report.failures.len(),
        report.model,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Summary dashboard
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary sortable\" id=\"summary\">\n");
    html.push_str(&format!(
        "<thead><tr>{}</tr></thead>\n",
        ["Assessment", "Students", "Items", "Alpha", "SEM", "DIF Flags", "Certified"]
            .iter()
            .map(|h| format!("<th>{h}</th>"))
            .collect::<String>()
    ));
    html.push_str("<tbody>\n");
    for a in &report.assessments {
        let class = if a.certification.certified {
            "pass"
        } else {
            "fail"
        };
        let text = if a.certification.certified {
            "YES"
        } else {
            "NO"
        };
        html.push_str(&format!(
            "<tr><td><a href=\"#{}\">{}</a></td><td>{}</td><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{}</td><td class=\"{}\">{}</td></tr>\n",
            html_escape(&a.assessment_id),
            html_escape(&a.name),
            a.n_students,
            a.n_items,
            a.reliability.cronbach_alpha,
            a.reliability.sem,
            a.flagged_count(),
            class,
            text,
        ));
    }
    html.push_str("</tbody></table>\n");

    if !report.assessments.is_empty() {
        html.push_str(&generate_alpha_chart(&report.assessments));
    }

    html.push_str("</section>\n");

    // Per-assessment detail
    for a in &report.assessments {
        html.push_str(&assessment_section(a));
    }

    if !report.failures.is_empty() {
        html.push_str("<section class=\"failures\">\n<h2>Failures</h2>\n<ul>\n");
        for f in &report.failures {
            html.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>\n",
                html_escape(&f.assessment_id),
                html_escape(&f.error)
            ));
        }
        html.push_str("</ul>\n</section>\n");
    }

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Render the report and save it to `path`.
pub fn write_html_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn assessment_section(a: &AssessmentAnalysis) -> String {
    let table_id = format!("items-{}", html_escape(&a.assessment_id));
    let mut html = format!(
        "<section class=\"assessment\" id=\"{}\">\n<h2>{}</h2>\n",
        html_escape(&a.assessment_id),
        html_escape(&a.name)
    );

    let c = &a.certification;
    html.push_str("<ul class=\"criteria\">\n");
    for (label, criterion, cmp) in [
        ("Reliability (alpha)", &c.reliability, "&ge;"),
        ("Precision (SEM)", &c.precision, "&lt;"),
        ("Fairness (DIF proportion)", &c.fairness, "&lt;"),
    ] {
        html.push_str(&format!(
            "<li class=\"{}\">{}: {:.3} {} {:.3}</li>\n",
            if criterion.passed { "pass" } else { "fail" },
            label,
            criterion.value,
            cmp,
            criterion.threshold
        ));
    }
    html.push_str("</ul>\n");

    html.push_str(&format!(
        "<p class=\"meta\">KR-20 {:.3} | split-half {:.3} | 95% band &plusmn;{:.2} | calibration {} after {} iterations</p>\n",
        a.reliability.kr20,
        a.reliability.split_half,
        a.reliability.ci_half_width,
        if a.calibration.converged { "converged" } else { "stopped" },
        a.calibration.iterations,
    ));

    html.push_str(&format!("<table class=\"items sortable\" id=\"{table_id}\">\n"));
    html.push_str(&format!(
        "<thead><tr>{}</tr></thead>\n",
        ["Item", "p", "r_pb", "D", "b", "a", "c", "Alpha if deleted", "DIF"]
            .iter()
            .map(|h| format!("<th>{h}</th>"))
            .collect::<String>()
    ));
    html.push_str("<tbody>\n");

    for (j, ctt) in a.ctt.iter().enumerate() {
        let params = a.calibration.items.get(j);
        let dif = a.dif.as_ref().and_then(|d| d.get(j));
        let (dif_class, dif_text) = match dif {
            Some(d) if d.flagged => ("fail", format!("{} ({:+.2})", d.severity, d.effect_size)),
            Some(d) => ("", d.severity.to_string()),
            None => ("", "-".to_string()),
        };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>\n",
            html_escape(&ctt.item_id),
            ctt.p_value,
            ctt.point_biserial,
            ctt.discrimination_index,
            params.map(|p| format!("{:.3}", p.difficulty)).unwrap_or_default(),
            params.map(|p| format!("{:.2}", p.discrimination)).unwrap_or_default(),
            params.map(|p| format!("{:.2}", p.guessing)).unwrap_or_default(),
            a.alpha_if_deleted.get(j).map(|v| format!("{v:.3}")).unwrap_or_default(),
            dif_class,
            html_escape(&dif_text),
        ));
    }
    html.push_str("</tbody></table>\n");

    html.push_str("<details>\n<summary>Certification narrative</summary>\n<pre>");
    html.push_str(&html_escape(&c.narrative));
    html.push_str("</pre>\n</details>\n</section>\n");
    html
}

fn generate_alpha_chart(assessments: &[AssessmentAnalysis]) -> String {
    const ROW: usize = 28;
    const GAP: usize = 8;
    const LABEL: usize = 180;
    const SCALE: f64 = 420.0;

    let height = assessments.len() * (ROW + GAP) + GAP + 20;
    let mut svg = format!(
        "<svg class=\"alpha-chart\" viewBox=\"0 0 {} {height}\" xmlns=\"http://www.w3.org/2000/svg\" role=\"img\" aria-label=\"Cronbach's alpha by assessment\">\n",
        LABEL + SCALE as usize + 70,
    );

    // Alpha axis ticks at 0, 0.5 and 1.
    for tick in [0.0, 0.5, 1.0] {
        let x = LABEL as f64 + tick * SCALE;
        svg.push_str(&format!(
            "  <line x1=\"{x:.1}\" y1=\"0\" x2=\"{x:.1}\" y2=\"{}\" class=\"tick\"/>\n  <text x=\"{x:.1}\" y=\"{}\" class=\"axis\">{tick:.1}</text>\n",
            height - 18,
            height - 4
        ));
    }

    for (i, a) in assessments.iter().enumerate() {
        let alpha = a.reliability.cronbach_alpha.clamp(0.0, 1.0);
        let threshold = a.certification.reliability.threshold;
        let top = GAP + i * (ROW + GAP);
        let middle = top + ROW / 2;
        let band = if alpha >= threshold {
            "ok"
        } else if alpha >= threshold - 0.15 {
            "near"
        } else {
            "low"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{middle}\" class=\"label\">{}</text>\n",
            LABEL - 8,
            html_escape(&a.assessment_id)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{LABEL}\" y=\"{top}\" width=\"{:.1}\" height=\"{ROW}\" class=\"bar {band}\"/>\n",
            alpha * SCALE
        ));
        let marker = LABEL as f64 + threshold.clamp(0.0, 1.0) * SCALE;
        svg.push_str(&format!(
            "  <line x1=\"{marker:.1}\" y1=\"{}\" x2=\"{marker:.1}\" y2=\"{}\" class=\"threshold\"/>\n",
            top.saturating_sub(2),
            top + ROW + 2
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{middle}\" class=\"value\">{alpha:.3}</text>\n",
            LABEL as f64 + alpha * SCALE + 6.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root {
  --paper: #fbfaf7; --ink: #22252b; --muted: #6f7480; --rule: #dcd8cf;
  --ok: #2f8f5b; --near: #c08a1e; --low: #b8403a;
  --ok-bg: #e4f2e9; --low-bg: #f6e1df;
}
@media (prefers-color-scheme: dark) {
  :root {
    --paper: #171a1f; --ink: #e7e5e0; --muted: #9aa0aa; --rule: #343a44;
    --ok-bg: #1d3a2a; --low-bg: #43201e;
  }
}
body { font: 15px/1.5 system-ui, sans-serif; max-width: 1100px; margin: 0 auto; padding: 1.5rem 2rem 4rem; background: var(--paper); color: var(--ink); }
header { border-bottom: 2px solid var(--rule); padding-bottom: 0.75rem; }
section { margin-top: 2.5rem; }
.meta { color: var(--muted); font-size: 0.9rem; }
table { border-collapse: collapse; width: 100%; margin: 0.75rem 0 1.25rem; font-size: 0.9rem; }
thead th { text-align: left; border-bottom: 2px solid var(--rule); padding: 0.35rem 0.6rem; cursor: pointer; user-select: none; }
tbody td { border-bottom: 1px solid var(--rule); padding: 0.3rem 0.6rem; }
td:not(:first-child) { font-variant-numeric: tabular-nums; }
.pass { background: var(--ok-bg); }
.fail { background: var(--low-bg); }
.criteria { list-style: none; padding: 0; display: grid; gap: 0.3rem; }
.criteria li { padding: 0.35rem 0.75rem; border-left: 4px solid var(--rule); }
.criteria li.pass { border-left-color: var(--ok); }
.criteria li.fail { border-left-color: var(--low); }
pre { overflow-x: auto; padding: 0.75rem 1rem; border: 1px solid var(--rule); font: 0.8rem/1.4 ui-monospace, monospace; }
details > summary { cursor: pointer; color: var(--muted); }
.alpha-chart { width: 100%; max-width: 680px; margin: 0.5rem 0 1rem; }
.alpha-chart .bar.ok { fill: var(--ok); }
.alpha-chart .bar.near { fill: var(--near); }
.alpha-chart .bar.low { fill: var(--low); }
.alpha-chart .tick { stroke: var(--rule); }
.alpha-chart .threshold { stroke: var(--ink); stroke-width: 2; stroke-dasharray: 3 2; }
.alpha-chart text { fill: currentColor; font-size: 12px; dominant-baseline: middle; }
.alpha-chart .label { text-anchor: end; font-size: 13px; }
.alpha-chart .axis { text-anchor: middle; fill: var(--muted); }
"#;

const JS: &str = r#"
document.querySelectorAll('table.sortable').forEach(table => {
  table.querySelectorAll('thead th').forEach((th, col) => {
    th.addEventListener('click', () => {
      const body = table.tBodies[0];
      const descending = th.dataset.order === 'asc';
      table.querySelectorAll('thead th').forEach(h => delete h.dataset.order);
      th.dataset.order = descending ? 'desc' : 'asc';
      const key = row => {
        const text = row.cells[col].textContent.trim();
        const n = Number(text);
        return Number.isNaN(n) || text === '' ? text : n;
      };
      Array.from(body.rows)
        .sort((r1, r2) => {
          const k1 = key(r1), k2 = key(r2);
          const order = typeof k1 === 'number' && typeof k2 === 'number'
            ? k1 - k2
            : String(k1).localeCompare(String(k2));
          return descending ? -order : order;
        })
        .forEach(row => body.appendChild(row));
    });
  });
});
"#;
