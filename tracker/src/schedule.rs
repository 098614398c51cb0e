//! Task list construction and seeded shuffling.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// One trial to run: a point in the (model, temperature, trial, scenario) grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub model: String,
    pub temperature: f64,
    /// 1-based repetition index.
    pub trial: u32,
    pub scenario: String,
}

impl Task {
    /// Human-readable label used in progress output and logs.
    pub fn label(&self) -> String {
        format!(
            "{}|temp={:?}|trial={}|{}",
            self.model, self.temperature, self.trial, self.scenario
        )
    }
}

/// Full cartesian product, ordered model, temperature, trial, scenario.
pub fn build_tasks(models: &[String], temperatures: &[f64], trials: u32, scenarios: &[String]) -> Vec<Task> {
    let mut tasks =
        Vec::with_capacity(models.len() * temperatures.len() * trials as usize * scenarios.len());
    for model in models {
        for &temperature in temperatures {
            for trial in 1..=trials {
                for scenario in scenarios {
                    tasks.push(Task {
                        model: model.clone(),
                        temperature,
                        trial,
                        scenario: scenario.clone(),
                    });
                }
            }
        }
    }
    tasks
}

/// Shuffle in place; the same seed and input always give the same order.
pub fn shuffle_tasks(tasks: &mut [Task], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    tasks.shuffle(&mut rng);
}

/// Build then shuffle.
pub fn plan_tasks(
    models: &[String],
    temperatures: &[f64],
    trials: u32,
    scenarios: &[String],
    seed: u64,
) -> Vec<Task> {
    let mut tasks = build_tasks(models, temperatures, trials, scenarios);
    shuffle_tasks(&mut tasks, seed);
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn builds_full_product_in_nesting_order() {
        let tasks = build_tasks(&strings(&["claude", "gpt"]), &[0.3, 0.0], 2, &strings(&["a", "b", "c"]));
        assert_eq!(tasks.len(), 24);
        assert_eq!(tasks[0].label(), "claude|temp=0.3|trial=1|a");
        assert_eq!(tasks[1].label(), "claude|temp=0.3|trial=1|b");
        assert_eq!(tasks[3].label(), "claude|temp=0.3|trial=2|a");
        assert_eq!(tasks[6].label(), "claude|temp=0.0|trial=1|a");
        assert_eq!(tasks[23].label(), "gpt|temp=0.0|trial=2|c");
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let models = strings(&["claude", "gpt", "gemini"]);
        let scenarios = strings(&["a", "b", "c", "d"]);
        let first = plan_tasks(&models, &[0.3, 0.0], 3, &scenarios, 20260208);
        let second = plan_tasks(&models, &[0.3, 0.0], 3, &scenarios, 20260208);
        assert_eq!(first, second);

        let other = plan_tasks(&models, &[0.3, 0.0], 3, &scenarios, 7);
        assert_ne!(first, other);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let scenarios = strings(&["a", "b"]);
        let mut expected: Vec<String> = build_tasks(&strings(&["claude"]), &[0.0, 1.0], 2, &scenarios)
            .iter()
            .map(Task::label)
            .collect();
        let mut shuffled: Vec<String> = plan_tasks(&strings(&["claude"]), &[0.0, 1.0], 2, &scenarios, 1)
            .iter()
            .map(Task::label)
            .collect();
        expected.sort();
        shuffled.sort();
        assert_eq!(expected, shuffled);
    }

    #[test]
    fn empty_axis_yields_no_tasks() {
        assert!(build_tasks(&strings(&["claude"]), &[0.3], 3, &[]).is_empty());
        assert!(build_tasks(&[], &[0.3], 3, &strings(&["a"])).is_empty());
    }
}
