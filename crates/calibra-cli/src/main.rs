//! calibra CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "calibra",
    version,
    about = "Psychometric analysis of assessment response data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze assessments: CTT, reliability, IRT, DIF and certification
    Analyze {
        /// Path to a dataset .toml file or a directory of them
        #[arg(long)]
        dataset: PathBuf,

        /// IRT model: 1pl, 2pl, 3pl
        #[arg(long)]
        model: Option<String>,

        /// Reliability method: cronbach_alpha, kr20, split_half
        #[arg(long)]
        reliability: Option<String>,

        /// DIF method: mantel_haenszel, logistic_regression
        #[arg(long)]
        dif: Option<String>,

        /// Calibration iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Calibration convergence threshold
        #[arg(long)]
        convergence_threshold: Option<f64>,

        /// Max concurrent assessment analyses
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, markdown, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Equate Form B raw scores onto the Form A scale
    Equate {
        /// Path to an equating .toml file
        #[arg(long)]
        input: PathBuf,

        /// Equating method: linear, equipercentile (overrides the file)
        #[arg(long)]
        method: Option<String>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compare two analysis reports for item parameter drift
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Difficulty drift threshold in logits
        #[arg(long, default_value = "0.3")]
        threshold: f64,

        /// Exit code 1 if any item drifted
        #[arg(long)]
        fail_on_drift: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate dataset TOML files
    Validate {
        /// Path to dataset file or directory
        #[arg(long)]
        dataset: PathBuf,
    },

    /// Create starter config and example dataset
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calibra=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            dataset,
            model,
            reliability,
            dif,
            max_iterations,
            convergence_threshold,
            parallelism,
            output,
            format,
            config,
        } => {
            commands::analyze::execute(commands::analyze::AnalyzeArgs {
                dataset,
                model,
                reliability,
                dif,
                max_iterations,
                convergence_threshold,
                parallelism,
                output,
                format,
                config,
            })
            .await
        }
        Commands::Equate {
            input,
            method,
            format,
        } => commands::equate::execute(input, method, format),
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_drift,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_drift, format),
        Commands::Validate { dataset } => commands::validate::execute(dataset),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
