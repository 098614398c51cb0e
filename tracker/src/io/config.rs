//! Experiment configuration (TOML).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::models::{ModelSpec, known_aliases, resolve_model};
use crate::io::scenario::ScenarioSet;

/// Pre-flight configuration failure. Raised before any task runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown model '{alias}' (known: {known})")]
    UnknownModel { alias: String, known: String },
    #[error("scenario '{key}' not found in {source_path}")]
    MissingScenario { key: String, source_path: String },
    #[error("{0}")]
    Invalid(String),
}

/// Experiment configuration.
///
/// Missing fields default to the reference run's values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Scenario set (JSON) to load.
    pub scenarios_path: PathBuf,

    /// Result artifact path; rewritten after every task.
    pub output_path: PathBuf,

    /// Scenario keys to run. Empty runs every key in the scenario set.
    pub scenarios: Vec<String>,

    /// Repeated trials per (scenario, model, temperature).
    pub trials: u32,

    pub temperatures: Vec<f64>,

    /// Model aliases; each must be in the known registry.
    pub models: Vec<String>,

    /// Completion length cap per call.
    pub max_tokens: u32,

    /// Operator magnitude, in (0, 1).
    pub strength: f64,

    /// Seed for shuffling task order. Not used for anything else.
    pub seed: u64,

    /// Pause after each successful completion call.
    pub call_delay_ms: u64,

    /// Attempts per turn before recording a provider failure.
    pub retry: u32,

    /// Fixed pause between attempts.
    pub retry_delay_ms: u64,

    /// Per-call HTTP timeout.
    pub request_timeout_secs: u64,

    /// Wall-clock budget for the whole run. Unset means no deadline.
    pub deadline_secs: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            scenarios_path: PathBuf::from("scenarios.json"),
            output_path: PathBuf::from("results.json"),
            scenarios: Vec::new(),
            trials: 3,
            temperatures: vec![0.3, 0.0],
            models: vec!["claude".to_string(), "gpt".to_string(), "gemini".to_string()],
            max_tokens: 200,
            strength: 0.4,
            seed: 20260208,
            call_delay_ms: 300,
            retry: 5,
            retry_delay_ms: 1500,
            request_timeout_secs: 60,
            deadline_secs: None,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for alias in &self.models {
            if resolve_model(alias).is_none() {
                return Err(ConfigError::UnknownModel {
                    alias: alias.clone(),
                    known: known_aliases().join(", "),
                });
            }
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("models must be non-empty".to_string()));
        }
        if self.trials == 0 {
            return Err(ConfigError::Invalid("trials must be > 0".to_string()));
        }
        if self.retry == 0 {
            return Err(ConfigError::Invalid("retry must be > 0".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be > 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.temperatures.is_empty() {
            return Err(ConfigError::Invalid(
                "temperatures must be non-empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .temperatures
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0 || **t > 2.0)
        {
            return Err(ConfigError::Invalid(format!(
                "temperature {bad} must be within [0, 2]"
            )));
        }
        if !(self.strength > 0.0 && self.strength < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "strength {} must be within (0, 1)",
                self.strength
            )));
        }
        Ok(())
    }

    /// Resolve configured aliases against the registry.
    pub fn model_specs(&self) -> Result<Vec<&'static ModelSpec>, ConfigError> {
        self.models
            .iter()
            .map(|alias| {
                resolve_model(alias).ok_or_else(|| ConfigError::UnknownModel {
                    alias: alias.clone(),
                    known: known_aliases().join(", "),
                })
            })
            .collect()
    }

    /// Scenario keys to run: the configured list, or every key in the set.
    ///
    /// A configured key absent from `set` is a [`ConfigError::MissingScenario`].
    pub fn check_scenarios(&self, set: &ScenarioSet) -> Result<Vec<String>, ConfigError> {
        if self.scenarios.is_empty() {
            return Ok(set.keys());
        }
        for key in &self.scenarios {
            if set.get(key).is_none() {
                return Err(ConfigError::MissingScenario {
                    key: key.clone(),
                    source_path: self.scenarios_path.display().to_string(),
                });
            }
        }
        Ok(self.scenarios.clone())
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExperimentConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    if !path.exists() {
        return Ok(ExperimentConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExperimentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Where a run stores the effective config next to its artifact:
/// `results.json` gives `results.config.toml`.
pub fn snapshot_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("config.toml")
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ExperimentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
