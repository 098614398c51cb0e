//! Cross-trial statistics per condition.
//!
//! A condition is a (scenario, model, temperature) triple. Only complete
//! trials are bucketed; interrupted ones stay in the records but are skipped
//! here.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::types::Operator;
use crate::io::artifact::TaskRecord;
use crate::trial::TrialResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub by_condition: Vec<ConditionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStats {
    pub scenario: String,
    pub model: String,
    pub temperature: f64,
    pub n_trials: usize,
    pub avg_tokens_per_turn_mean: f64,
    pub avg_tokens_per_turn_std: f64,
    pub success_rate_mean: f64,
    pub success_rate_std: f64,
    pub trial_turn_consistency: f64,
    pub sigma_count: u32,
    pub delta_count: u32,
}

struct Bucket<'a> {
    scenario: &'a str,
    model: &'a str,
    temperature: f64,
    trials: Vec<&'a TrialResult>,
}

/// Bucket complete trials by condition and summarize each bucket.
///
/// Rows are ordered by temperature, then model, then scenario.
pub fn aggregate(records: &[TaskRecord]) -> Aggregation {
    let mut buckets: Vec<Bucket<'_>> = Vec::new();
    for record in records.iter().filter(|record| !record.result.interrupted) {
        let existing = buckets.iter_mut().find(|bucket| {
            bucket.scenario == record.scenario
                && bucket.model == record.model
                && bucket.temperature.total_cmp(&record.temperature) == Ordering::Equal
        });
        match existing {
            Some(bucket) => bucket.trials.push(&record.result),
            None => buckets.push(Bucket {
                scenario: &record.scenario,
                model: &record.model,
                temperature: record.temperature,
                trials: vec![&record.result],
            }),
        }
    }

    buckets.sort_by(|a, b| {
        a.temperature
            .total_cmp(&b.temperature)
            .then_with(|| a.model.cmp(b.model))
            .then_with(|| a.scenario.cmp(b.scenario))
    });

    Aggregation {
        by_condition: buckets.iter().map(summarize).collect(),
    }
}

fn summarize(bucket: &Bucket<'_>) -> ConditionStats {
    let tokens: Vec<f64> = bucket.trials.iter().map(|t| t.avg_tokens_per_turn).collect();
    let rates: Vec<f64> = bucket.trials.iter().map(|t| t.success_rate).collect();
    ConditionStats {
        scenario: bucket.scenario.to_string(),
        model: bucket.model.to_string(),
        temperature: bucket.temperature,
        n_trials: bucket.trials.len(),
        avg_tokens_per_turn_mean: round4(mean(&tokens)),
        avg_tokens_per_turn_std: round4(population_std(&tokens)),
        success_rate_mean: round4(mean(&rates)),
        success_rate_std: round4(population_std(&rates)),
        trial_turn_consistency: round4(consistency(&bucket.trials)),
        sigma_count: bucket.trials.iter().map(|t| t.sigma_count).sum(),
        delta_count: bucket.trials.iter().map(|t| t.delta_count).sum(),
    }
}

/// Fraction of turn positions where every trial chose the same
/// (operator, target) pair. Zero with fewer than two trials.
pub fn consistency(trials: &[&TrialResult]) -> f64 {
    let Some(first) = trials.first() else {
        return 0.0;
    };
    if trials.len() < 2 {
        return 0.0;
    }
    let positions = first.turns.len();
    if positions == 0 {
        return 0.0;
    }

    let consistent = (0..positions)
        .filter(|&index| {
            let choices: HashSet<(Option<Operator>, Option<&str>)> = trials
                .iter()
                .map(|trial| match trial.turns.get(index) {
                    Some(turn) => (turn.operator, turn.target.as_deref()),
                    None => (None, None),
                })
                .collect();
            choices.len() == 1
        })
        .count();
    consistent as f64 / positions as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
