//! The `calibra init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("calibra.toml").exists() {
        println!("calibra.toml already exists, skipping.");
    } else {
        std::fs::write("calibra.toml", SAMPLE_CONFIG)?;
        println!("Created calibra.toml");
    }

    std::fs::create_dir_all("datasets")?;
    let example_path = std::path::Path::new("datasets/example.toml");
    if example_path.exists() {
        println!("datasets/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_DATASET)?;
        println!("Created datasets/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Replace datasets/example.toml with your scored responses");
    println!("  2. Run: calibra validate --dataset datasets/example.toml");
    println!("  3. Run: calibra analyze --dataset datasets --format all");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# calibra configuration

parallelism = 4
output_dir = "./calibra-results"

[irt]
model = "2pl"
max_iterations = 100
convergence_threshold = 0.001

[reliability]
method = "cronbach_alpha"

[dif]
method = "mantel_haenszel"

[certification]
min_alpha = 0.85
max_sem = 4.0
max_dif_proportion = 0.05
"#;

const EXAMPLE_DATASET: &str = r#"[assessment]
id = "example"
name = "Example Quiz"
description = "Eight students, five items, two groups"
items = ["q1", "q2", "q3", "q4", "q5"]
reference_group = "control"

[[students]]
id = "s1"
group = "control"
responses = [1, 1, 1, 1, 0]

[[students]]
id = "s2"
group = "treatment"
responses = [1, 1, 1, 0, 0]

[[students]]
id = "s3"
group = "control"
responses = [1, 1, 0, 0, 0]

[[students]]
id = "s4"
group = "treatment"
responses = [1, 0, 0, 0, 0]

[[students]]
id = "s5"
group = "control"
responses = [1, 1, 1, 0, 1]

[[students]]
id = "s6"
group = "treatment"
responses = [0, 1, 0, 0, 0]

[[students]]
id = "s7"
group = "control"
responses = [1, 0, 1, 1, 0]

[[students]]
id = "s8"
group = "treatment"
responses = [1, 1, 0, 1, 0]
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn sample_config_parses() {
        let config = calibra_core::config::parse_config_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.parallelism, 4);
    }

    #[test]
    fn example_dataset_is_clean() {
        let set =
            calibra_core::parser::parse_dataset_str(EXAMPLE_DATASET, Path::new("example.toml"))
                .unwrap();
        assert_eq!(set.responses.n_students(), 8);
        assert!(calibra_core::parser::validate_dataset(&set).is_empty());
    }
}
