//! Experiment configuration merging.
//!
//! Applies command-line overrides on top of the TOML config file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracker::io::config::ExperimentConfig;

/// Flags accepted by `eval run`. Every flag is optional and wins over the file.
#[derive(Debug, Clone, Default, Args)]
pub struct RunOverrides {
    /// Scenario set (JSON).
    #[arg(long)]
    pub scenarios: Option<PathBuf>,
    /// Result artifact path.
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub trials: Option<u32>,
    /// Comma-separated sampling temperatures.
    #[arg(long, value_delimiter = ',')]
    pub temperatures: Option<Vec<f64>>,
    /// Comma-separated model aliases.
    #[arg(long, value_delimiter = ',')]
    pub models: Option<Vec<String>>,
    /// Scenario key to run; repeat for several. Default: every key.
    #[arg(long = "scenario")]
    pub scenario: Vec<String>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub strength: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub call_delay_ms: Option<u64>,
    #[arg(long)]
    pub retry: Option<u32>,
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
    /// Wall-clock budget for the whole run.
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

/// Merge `overrides` into `base` and validate the result.
pub fn apply_overrides(mut base: ExperimentConfig, overrides: &RunOverrides) -> Result<ExperimentConfig> {
    if let Some(path) = &overrides.scenarios {
        base.scenarios_path = path.clone();
    }
    if let Some(path) = &overrides.out {
        base.output_path = path.clone();
    }
    if let Some(trials) = overrides.trials {
        base.trials = trials;
    }
    if let Some(temperatures) = &overrides.temperatures {
        base.temperatures = temperatures.clone();
    }
    if let Some(models) = &overrides.models {
        base.models = models.clone();
    }
    if !overrides.scenario.is_empty() {
        base.scenarios = overrides.scenario.clone();
    }
    if let Some(max_tokens) = overrides.max_tokens {
        base.max_tokens = max_tokens;
    }
    if let Some(strength) = overrides.strength {
        base.strength = strength;
    }
    if let Some(seed) = overrides.seed {
        base.seed = seed;
    }
    if let Some(call_delay_ms) = overrides.call_delay_ms {
        base.call_delay_ms = call_delay_ms;
    }
    if let Some(retry) = overrides.retry {
        base.retry = retry;
    }
    if let Some(retry_delay_ms) = overrides.retry_delay_ms {
        base.retry_delay_ms = retry_delay_ms;
    }
    if let Some(deadline_secs) = overrides.deadline_secs {
        base.deadline_secs = Some(deadline_secs);
    }
    base.validate()?;
    Ok(base)
}
