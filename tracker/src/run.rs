//! Experiment execution: plan, run every task, persist after each one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use crate::aggregate::aggregate;
use crate::control::RunControl;
use crate::core::store::StateStore;
use crate::io::artifact::{
    ArtifactMetadata, ResultArtifact, RunStatus, TaskRecord, load_artifact, write_artifact,
};
use crate::io::config::{ConfigError, ExperimentConfig, snapshot_path, write_config};
use crate::io::models::ModelSpec;
use crate::io::prompt::PromptBuilder;
use crate::io::provider::CompletionClient;
use crate::io::scenario::ScenarioSet;
use crate::schedule::{Task, plan_tasks};
use crate::trial::{TrialResult, TrialSettings, TrialSpec, run_trial};

/// Validated inputs for a run.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    pub scenarios: Vec<String>,
    pub models: Vec<&'static ModelSpec>,
    /// Shuffled task order.
    pub tasks: Vec<Task>,
}

impl ExperimentPlan {
    fn model(&self, alias: &str) -> Option<&'static ModelSpec> {
        self.models.iter().copied().find(|spec| spec.alias == alias)
    }
}

/// Passed to the per-task callback after each task is persisted.
#[derive(Debug)]
pub struct TaskProgress<'a> {
    /// 1-based position in the shuffled order.
    pub index: usize,
    pub total: usize,
    pub task: &'a Task,
    pub result: &'a TrialResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub artifact_path: PathBuf,
    pub completed_tasks: usize,
    pub task_count: usize,
    pub status: RunStatus,
}

/// Check the configuration against the scenario set and build the task list.
///
/// Every failure here happens before any provider call or file write.
pub fn prepare(cfg: &ExperimentConfig, set: &ScenarioSet) -> Result<ExperimentPlan, ConfigError> {
    cfg.validate()?;
    let models = cfg.model_specs()?;
    let scenarios = cfg.check_scenarios(set)?;
    if scenarios.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "no scenarios to run in {}",
            cfg.scenarios_path.display()
        )));
    }
    for key in &scenarios {
        if let Some(scenario) = set.get(key) {
            StateStore::new()
                .create_state(scenario.initial_state.iter())
                .map_err(|err| ConfigError::Invalid(format!("scenario '{key}': {err}")))?;
        }
    }
    let tasks = plan_tasks(&cfg.models, &cfg.temperatures, cfg.trials, &scenarios, cfg.seed);
    Ok(ExperimentPlan {
        scenarios,
        models,
        tasks,
    })
}

/// Run every planned task, rewriting the artifact at `cfg.output_path` after each.
///
/// Stops early, with status [`RunStatus::Interrupted`], when `control` fires.
/// Returns `Err` for configuration problems (as a [`ConfigError`]) and for
/// artifact write failures.
#[instrument(skip_all, fields(output = %cfg.output_path.display()))]
pub fn run_experiment<C, F>(
    cfg: &ExperimentConfig,
    set: &ScenarioSet,
    client: &C,
    control: &RunControl,
    mut on_task: F,
) -> Result<RunOutcome>
where
    C: CompletionClient,
    F: FnMut(&TaskProgress<'_>),
{
    let plan = prepare(cfg, set)?;
    let prompts = PromptBuilder::new()?;
    let settings = TrialSettings::from_config(cfg);
    let total = plan.tasks.len();
    info!(tasks = total, scenarios = plan.scenarios.len(), "experiment started");

    let snapshot = snapshot_path(&cfg.output_path);
    write_config(&snapshot, cfg).context("write config snapshot")?;

    let mut artifact = ResultArtifact {
        metadata: metadata(cfg, set, &plan, snapshot),
        records: Vec::with_capacity(total),
        aggregation: Default::default(),
    };
    write_artifact(&cfg.output_path, &artifact).context("write initial artifact")?;

    let mut status = RunStatus::Completed;
    for (position, task) in plan.tasks.iter().enumerate() {
        if let Err(reason) = control.check() {
            warn!(reason = %reason, remaining = total - position, "run stopped before task");
            status = RunStatus::Interrupted;
            break;
        }

        let scenario = set
            .get(&task.scenario)
            .with_context(|| format!("scenario {} vanished from set", task.scenario))?;
        let model = plan
            .model(&task.model)
            .with_context(|| format!("model {} missing from plan", task.model))?;
        let spec = TrialSpec {
            scenario_key: &task.scenario,
            scenario,
            model,
            temperature: task.temperature,
        };
        let result = run_trial(client, &prompts, &spec, &settings, control)
            .with_context(|| format!("trial {}", task.label()))?;
        let interrupted = result.interrupted;
        info!(
            task = %task.label(),
            index = position + 1,
            total,
            success_rate = result.success_rate,
            tokens = result.total_tokens,
            interrupted,
            "task finished"
        );

        artifact.records.push(TaskRecord {
            model: task.model.clone(),
            temperature: task.temperature,
            trial: task.trial,
            scenario: task.scenario.clone(),
            result,
        });
        artifact.aggregation = aggregate(&artifact.records);
        artifact.metadata.completed_tasks = artifact.records.len();
        if interrupted {
            artifact.metadata.status = RunStatus::Interrupted;
        }
        write_artifact(&cfg.output_path, &artifact).context("rewrite artifact")?;

        if let Some(record) = artifact.records.last() {
            on_task(&TaskProgress {
                index: position + 1,
                total,
                task,
                result: &record.result,
            });
        }

        if interrupted {
            status = RunStatus::Interrupted;
            break;
        }
    }

    artifact.metadata.status = status;
    write_artifact(&cfg.output_path, &artifact).context("write final artifact")?;
    info!(status = %status, completed = artifact.records.len(), total, "experiment finished");

    Ok(RunOutcome {
        artifact_path: cfg.output_path.clone(),
        completed_tasks: artifact.records.len(),
        task_count: total,
        status,
    })
}

/// Recompute `aggregation` from an artifact's records and rewrite it in place.
pub fn reaggregate(path: &Path) -> Result<ResultArtifact> {
    let mut artifact = load_artifact(path)?;
    artifact.aggregation = aggregate(&artifact.records);
    write_artifact(path, &artifact)?;
    Ok(artifact)
}

fn metadata(
    cfg: &ExperimentConfig,
    set: &ScenarioSet,
    plan: &ExperimentPlan,
    config_snapshot: PathBuf,
) -> ArtifactMetadata {
    let models: BTreeMap<String, String> = plan
        .models
        .iter()
        .map(|spec| (spec.alias.to_string(), spec.model_id.to_string()))
        .collect();
    ArtifactMetadata {
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        models,
        trials: cfg.trials,
        temperatures: cfg.temperatures.clone(),
        max_tokens: cfg.max_tokens,
        strength: cfg.strength,
        seed: cfg.seed,
        task_count: plan.tasks.len(),
        completed_tasks: 0,
        scenario_file: cfg.scenarios_path.clone(),
        scenario_sha256: set.sha256().to_string(),
        config_snapshot,
        scenarios: plan.scenarios.clone(),
        status: RunStatus::Running,
    }
}
