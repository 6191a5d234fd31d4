//! Analysis configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::certification::CertificationThresholds;
use crate::dif::DifMethod;
use crate::irt::IrtConfig;
use crate::reliability::ReliabilityMethod;

/// Reliability settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default)]
    pub method: ReliabilityMethod,
}

/// DIF settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifConfig {
    #[serde(default)]
    pub method: DifMethod,
}

/// Top-level calibra configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Max concurrent assessment analyses.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub irt: IrtConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub dif: DifConfig,
    #[serde(default)]
    pub certification: CertificationThresholds,
}

fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./calibra-results")
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            irt: IrtConfig::default(),
            reliability: ReliabilityConfig::default(),
            dif: DifConfig::default(),
            certification: CertificationThresholds::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `calibra.toml` in the current directory
/// 2. `~/.config/calibra/config.toml`
///
/// Environment variable overrides: `CALIBRA_IRT_MODEL`, `CALIBRA_PARALLELISM`.
pub fn load_config() -> Result<AnalysisConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AnalysisConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("calibra.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };

    // Apply env var overrides
    if let Ok(model) = std::env::var("CALIBRA_IRT_MODEL") {
        config.irt.model = model
            .parse()
            .context("invalid CALIBRA_IRT_MODEL")?;
    }
    if let Ok(parallelism) = std::env::var("CALIBRA_PARALLELISM") {
        config.parallelism = parallelism
            .parse()
            .with_context(|| format!("invalid CALIBRA_PARALLELISM: '{parallelism}'"))?;
    }

    config.output_dir = PathBuf::from(resolve_env_vars(&config.output_dir.to_string_lossy()));

    Ok(config)
}

/// Parse a configuration document.
pub fn parse_config_str(content: &str) -> Result<AnalysisConfig> {
    let config: AnalysisConfig = toml::from_str(content)?;
    anyhow::ensure!(config.parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        config.irt.convergence_threshold.is_finite(),
        "convergence_threshold must be finite"
    );
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("calibra"))
}
