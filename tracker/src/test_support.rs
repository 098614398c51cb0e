//! Test-only helpers: a scripted completion client and scenario builders.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use crate::core::types::Weights;
use crate::io::config::ExperimentConfig;
use crate::io::provider::{Completion, CompletionClient, CompletionRequest, ProviderError};
use crate::io::scenario::{Domain, Scenario, ScenarioSet, Turn};

type Reply = Result<Completion, ProviderError>;

/// Returns queued replies in order and records every request it receives.
///
/// Once the queue is empty it repeats the fallback reply, or fails with a
/// transport error when there is none.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: RefCell<VecDeque<Reply>>,
    fallback: Option<Reply>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            ..Self::default()
        }
    }

    /// Answer every call with `reply`.
    pub fn always(reply: Reply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Queue `replies`, then repeat `fallback`.
    pub fn then_always(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            fallback: Some(fallback),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            return reply;
        }
        match &self.fallback {
            Some(reply) => reply.clone(),
            None => Err(ProviderError::Transport("script exhausted".to_string())),
        }
    }
}

/// Successful completion with the given text and token usage.
pub fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> Reply {
    Ok(Completion::new(text, input_tokens, output_tokens))
}

/// IME scenario over `financial`, `river`, `memory` (equal weights) with
/// turns `"turn 1"` .. `"turn {turns}"`.
pub fn simple_scenario(turns: usize) -> Scenario {
    let initial_state: Weights = [("financial", 1.0), ("river", 1.0), ("memory", 1.0)]
        .into_iter()
        .collect();
    Scenario {
        domain: Domain::Ime,
        initial_state,
        turns: (1..=turns)
            .map(|index| Turn {
                text: format!("turn {index}"),
            })
            .collect(),
    }
}

pub fn scenario_set(scenarios: Vec<(&str, Scenario)>) -> ScenarioSet {
    let map: BTreeMap<String, Scenario> = scenarios
        .into_iter()
        .map(|(key, scenario)| (key.to_string(), scenario))
        .collect();
    ScenarioSet::from_scenarios(map)
}

/// Single model, single temperature, no pauses, output under `dir`.
pub fn test_config(dir: &Path) -> ExperimentConfig {
    ExperimentConfig {
        scenarios_path: dir.join("scenarios.json"),
        output_path: dir.join("results.json"),
        trials: 2,
        temperatures: vec![0.0],
        models: vec!["claude".to_string()],
        call_delay_ms: 0,
        retry: 2,
        retry_delay_ms: 0,
        ..ExperimentConfig::default()
    }
}
