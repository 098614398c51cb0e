//! Result artifact: metadata, per-task records, and aggregated statistics.
//!
//! The artifact is rewritten wholesale after every task so that an
//! interrupted run still leaves a readable file behind.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::trial::TrialResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Interrupted => "interrupted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// RFC 3339 UTC timestamp of run start.
    pub created_at: String,
    /// Model alias to pinned provider model id.
    pub models: BTreeMap<String, String>,
    pub trials: u32,
    pub temperatures: Vec<f64>,
    pub max_tokens: u32,
    pub strength: f64,
    pub seed: u64,
    pub task_count: usize,
    pub completed_tasks: usize,
    pub scenario_file: PathBuf,
    pub scenario_sha256: String,
    /// Effective config (file plus CLI overrides) written for this run.
    pub config_snapshot: PathBuf,
    pub scenarios: Vec<String>,
    pub status: RunStatus,
}

/// One finished (or interrupted) task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub model: String,
    pub temperature: f64,
    pub trial: u32,
    pub scenario: String,
    pub result: TrialResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub metadata: ArtifactMetadata,
    pub records: Vec<TaskRecord>,
    pub aggregation: Aggregation,
}

/// Pretty JSON with a trailing newline, replaced atomically.
pub fn write_artifact(path: &Path, artifact: &ResultArtifact) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(artifact).context("serialize result artifact")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

pub fn load_artifact(path: &Path) -> Result<ResultArtifact> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse artifact {}", path.display()))
}
