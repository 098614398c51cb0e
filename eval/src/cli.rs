//! CLI command implementations.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracker::control::RunControl;
use tracker::io::artifact::RunStatus;
use tracker::io::config::ExperimentConfig;
use tracker::io::models::KNOWN_MODELS;
use tracker::io::provider::HttpCompletionClient;
use tracker::io::scenario::ScenarioSet;
use tracker::run::{TaskProgress, reaggregate, run_experiment};

/// Run the configured experiment against the live providers.
pub fn run(cfg: &ExperimentConfig) -> Result<RunStatus> {
    let set = ScenarioSet::load(&cfg.scenarios_path)?;
    let client = HttpCompletionClient::from_env()?;

    let mut control = RunControl::new();
    if let Some(secs) = cfg.deadline_secs {
        control = control.with_deadline(Instant::now() + Duration::from_secs(secs));
    }
    let handle = control.clone();
    ctrlc::set_handler(move || handle.cancel()).context("install interrupt handler")?;
    debug!(scenarios = set.len(), deadline_secs = ?cfg.deadline_secs, "inputs ready");

    let outcome = run_experiment(cfg, &set, &client, &control, print_progress)?;
    info!(status = %outcome.status, "run finished");
    println!(
        "run: status={} tasks={}/{} artifact={}",
        outcome.status,
        outcome.completed_tasks,
        outcome.task_count,
        outcome.artifact_path.display()
    );
    Ok(outcome.status)
}

fn print_progress(progress: &TaskProgress<'_>) {
    let result = progress.result;
    let interrupted = if result.interrupted { " interrupted" } else { "" };
    println!(
        "[{}/{}] {} success={:.2} tokens={}{}",
        progress.index,
        progress.total,
        progress.task.label(),
        result.success_rate,
        result.total_tokens,
        interrupted
    );
}

/// Recompute aggregation for an existing artifact and print it.
pub fn aggregate(artifact_path: &Path) -> Result<()> {
    let artifact = reaggregate(artifact_path)?;
    println!(
        "aggregate: records={} conditions={}",
        artifact.records.len(),
        artifact.aggregation.by_condition.len()
    );
    for row in &artifact.aggregation.by_condition {
        println!(
            "aggregate: temp={:?} model={} scenario={} n={} tokens/turn={:.1}±{:.1} success={:.2}±{:.2} consistency={:.2} sigma={} delta={}",
            row.temperature,
            row.model,
            row.scenario,
            row.n_trials,
            row.avg_tokens_per_turn_mean,
            row.avg_tokens_per_turn_std,
            row.success_rate_mean,
            row.success_rate_std,
            row.trial_turn_consistency,
            row.sigma_count,
            row.delta_count
        );
    }
    Ok(())
}

/// List known models and the scenarios in a scenario set.
pub fn list(scenarios_path: &Path) -> Result<()> {
    for spec in KNOWN_MODELS {
        println!("model: {} provider={} id={}", spec.alias, spec.provider, spec.model_id);
    }
    let set = ScenarioSet::load(scenarios_path)?;
    for key in set.keys() {
        if let Some(scenario) = set.get(&key) {
            println!(
                "scenario: {} domain={} items={} turns={}",
                key,
                scenario.domain,
                scenario.initial_state.len(),
                scenario.turns.len()
            );
        }
    }
    println!("sha256: {}", set.sha256());
    Ok(())
}
