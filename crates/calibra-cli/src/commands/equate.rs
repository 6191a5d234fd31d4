//! The `calibra equate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use calibra_core::equating::{equate, EquatingMethod, EquatingParameters, EquatingResult};
use calibra_core::parser::parse_equating;

#[derive(Serialize)]
struct EquatingOutput<'a> {
    id: &'a str,
    n_form_a: usize,
    n_form_b: usize,
    #[serde(flatten)]
    result: &'a EquatingResult,
}

pub fn execute(input_path: PathBuf, method: Option<String>, format: String) -> Result<()> {
    let input = parse_equating(&input_path)?;

    let method: EquatingMethod = match method.as_deref().or(input.method.as_deref()) {
        Some(name) => name.parse().context("invalid equating method")?,
        None => EquatingMethod::default(),
    };

    let result = equate(&input.form_a, &input.form_b, method)
        .with_context(|| format!("equating '{}' failed", input.id))?;

    match format.as_str() {
        "json" => {
            let output = EquatingOutput {
                id: &input.id,
                n_form_a: input.form_a.len(),
                n_form_b: input.form_b.len(),
                result: &result,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!(
                "Equating: {} ({} method, {} Form A / {} Form B scores)",
                input.id,
                result.method(),
                input.form_a.len(),
                input.form_b.len()
            );
            match &result.parameters {
                EquatingParameters::Linear { slope, intercept } => {
                    println!("  A = {slope:.4} x B + {intercept:.4}");
                }
                EquatingParameters::Equipercentile {
                    form_a_percentiles,
                    form_b_percentiles,
                } => {
                    // Index 49 is the 50th percentile.
                    if let (Some(a), Some(b)) =
                        (form_a_percentiles.get(49), form_b_percentiles.get(49))
                    {
                        println!("  medians: Form A {a:.2}, Form B {b:.2}");
                    }
                }
            }

            let mut table = comfy_table::Table::new();
            table.set_header(vec!["Form B raw", "Form A equivalent"]);
            for c in &result.conversions {
                table.add_row(vec![format!("{}", c.raw), format!("{:.1}", c.equated)]);
            }
            println!("{table}");
        }
    }

    Ok(())
}
