//! The `calibra validate` command.

use std::path::PathBuf;

use anyhow::Result;

use calibra_core::parser::{load_datasets, validate_dataset};

pub fn execute(dataset_path: PathBuf) -> Result<()> {
    let sets = load_datasets(&dataset_path)?;

    let mut total_warnings = 0;

    for set in &sets {
        println!(
            "Dataset: {} ({} students, {} items)",
            set.name,
            set.responses.n_students(),
            set.responses.n_items()
        );

        let warnings = validate_dataset(set);
        for w in &warnings {
            let prefix = w
                .subject
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All datasets valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
