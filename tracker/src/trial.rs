//! Orchestration for a single trial: one scenario, one model, one temperature.
//!
//! Turns run strictly in order because each prompt is built from the state
//! left by the previous turn. Per turn:
//!
//! 1. Read the current item names and render the domain prompt.
//! 2. Call the provider, retrying with a fixed pause on failure.
//! 3. Extract a decision; when complete, apply it and advance the state.
//! 4. Record the turn whether or not anything changed.
//!
//! Provider failures are recorded on the turn and never abort the trial.
//! Cancellation stops the trial at the next call boundary and keeps every
//! turn recorded so far.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::control::{Interrupted, RunControl};
use crate::core::extract::extract;
use crate::core::store::StateStore;
use crate::core::types::{Operator, State, StateId};
use crate::io::config::ExperimentConfig;
use crate::io::models::ModelSpec;
use crate::io::prompt::PromptBuilder;
use crate::io::provider::{Completion, CompletionClient, CompletionRequest, ProviderError};
use crate::io::scenario::{Domain, Scenario};

/// Experiment phase tag carried into result artifacts.
pub const PHASE: &str = "1.5";

/// Per-trial knobs taken from the experiment config.
#[derive(Debug, Clone)]
pub struct TrialSettings {
    pub max_tokens: u32,
    pub strength: f64,
    pub retry: u32,
    pub retry_delay: Duration,
    pub call_delay: Duration,
    pub request_timeout: Duration,
}

impl TrialSettings {
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self {
            max_tokens: cfg.max_tokens,
            strength: cfg.strength,
            retry: cfg.retry,
            retry_delay: cfg.retry_delay(),
            call_delay: cfg.call_delay(),
            request_timeout: cfg.request_timeout(),
        }
    }
}

/// What to run.
#[derive(Debug, Clone, Copy)]
pub struct TrialSpec<'a> {
    pub scenario_key: &'a str,
    pub scenario: &'a Scenario,
    pub model: &'a ModelSpec,
    pub temperature: f64,
}

/// One processed turn. Append-only within a [`TrialResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based turn index.
    pub turn: usize,
    pub text: String,
    /// True only when both operator and target were extracted.
    pub success: bool,
    pub operator: Option<Operator>,
    pub target: Option<String>,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Set when the provider call never succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Belief state current after this turn.
    pub state_id: StateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub scenario: String,
    pub domain: Domain,
    pub phase: String,
    pub model: String,
    pub model_id: String,
    pub temperature: f64,
    pub turns: Vec<TurnRecord>,
    pub total_tokens: u64,
    pub sigma_count: u32,
    pub delta_count: u32,
    #[serde(rename = "avg_per_turn")]
    pub avg_tokens_per_turn: f64,
    pub success_rate: f64,
    /// Stopped by cancellation or deadline before finishing.
    #[serde(default)]
    pub interrupted: bool,
    /// Every snapshot the trial's store produced, in id order.
    #[serde(default)]
    pub states: Vec<State>,
}

impl TrialResult {
    fn new(spec: &TrialSpec<'_>) -> Self {
        Self {
            scenario: spec.scenario_key.to_string(),
            domain: spec.scenario.domain,
            phase: PHASE.to_string(),
            model: spec.model.alias.to_string(),
            model_id: spec.model.model_id.to_string(),
            temperature: spec.temperature,
            turns: Vec::new(),
            total_tokens: 0,
            sigma_count: 0,
            delta_count: 0,
            avg_tokens_per_turn: 0.0,
            success_rate: 0.0,
            interrupted: false,
            states: Vec::new(),
        }
    }

    fn count(&mut self, operator: Operator) {
        match operator {
            Operator::Strengthen => self.sigma_count += 1,
            Operator::Dampen => self.delta_count += 1,
        }
    }

    /// Derive per-turn averages over the scenario's full turn count.
    fn finish(&mut self, turn_count: usize, history: &[State]) {
        let successes = self.turns.iter().filter(|turn| turn.success).count();
        if turn_count > 0 {
            self.avg_tokens_per_turn = self.total_tokens as f64 / turn_count as f64;
            self.success_rate = successes as f64 / turn_count as f64;
        }
        self.states = history.to_vec();
    }
}

enum CallOutcome {
    Completed(Completion),
    Failed(ProviderError),
    Interrupted {
        reason: Interrupted,
        last_error: Option<ProviderError>,
    },
}

/// Run every turn of one trial against `client`.
///
/// Errors only on defects (unrenderable prompt, store inconsistency); provider
/// failures and extraction misses are recorded on the turn instead.
#[instrument(skip_all, fields(scenario = spec.scenario_key, model = spec.model.alias, temperature = spec.temperature))]
pub fn run_trial<C: CompletionClient>(
    client: &C,
    prompts: &PromptBuilder,
    spec: &TrialSpec<'_>,
    settings: &TrialSettings,
    control: &RunControl,
) -> Result<TrialResult> {
    let mut store = StateStore::new();
    let mut current = store
        .create_state(spec.scenario.initial_state.iter())
        .with_context(|| format!("initial state for scenario {}", spec.scenario_key))?;
    let mut result = TrialResult::new(spec);
    let turn_count = spec.scenario.turns.len();
    let mut stop: Option<Interrupted> = None;

    for (index, turn) in spec.scenario.turns.iter().enumerate() {
        let turn_no = index + 1;
        if let Err(reason) = control.check() {
            stop = Some(reason);
            break;
        }

        let items = store.get_state(current)?.item_names();
        let prompt = prompts.build(spec.scenario.domain, &items, &turn.text)?;
        let request = CompletionRequest {
            provider: spec.model.provider,
            model_id: spec.model.model_id.to_string(),
            prompt,
            temperature: spec.temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.request_timeout,
        };

        match call_with_retry(client, &request, settings, control) {
            CallOutcome::Completed(completion) => {
                let extraction = extract(&completion.text, &items);
                let decision = extraction.decision();
                if let Some(decision) = &decision {
                    current = store.apply(current, decision.operator, &decision.target, settings.strength)?;
                    result.count(decision.operator);
                }
                debug!(
                    turn = turn_no,
                    operator = ?extraction.operator,
                    target = ?extraction.target,
                    success = decision.is_some(),
                    state = %current,
                    tokens = completion.total_tokens,
                    "turn recorded"
                );
                result.total_tokens += completion.total_tokens;
                result.turns.push(TurnRecord {
                    turn: turn_no,
                    text: turn.text.clone(),
                    success: decision.is_some(),
                    operator: extraction.operator,
                    target: extraction.target,
                    total_tokens: completion.total_tokens,
                    input_tokens: completion.input_tokens,
                    output_tokens: completion.output_tokens,
                    response: Some(completion.text),
                    error: None,
                    state_id: current,
                });
                if let Err(reason) = control.sleep(settings.call_delay)
                    && turn_no < turn_count
                {
                    stop = Some(reason);
                    break;
                }
            }
            CallOutcome::Failed(err) => {
                warn!(turn = turn_no, error = %err, "turn failed after retries");
                result.turns.push(failed_turn(turn_no, &turn.text, err.to_string(), current));
            }
            CallOutcome::Interrupted { reason, last_error } => {
                let message = match last_error {
                    Some(err) => format!("{reason}; last provider error: {err}"),
                    None => reason.to_string(),
                };
                result.turns.push(failed_turn(turn_no, &turn.text, message, current));
                stop = Some(reason);
                break;
            }
        }
    }

    if let Some(reason) = stop {
        warn!(reason = %reason, recorded = result.turns.len(), turn_count, "trial interrupted");
        result.interrupted = true;
    }
    result.finish(turn_count, store.history());
    Ok(result)
}

fn failed_turn(turn: usize, text: &str, error: String, state_id: StateId) -> TurnRecord {
    TurnRecord {
        turn,
        text: text.to_string(),
        success: false,
        operator: None,
        target: None,
        total_tokens: 0,
        input_tokens: 0,
        output_tokens: 0,
        response: None,
        error: Some(error),
        state_id,
    }
}

/// Up to `settings.retry` attempts with a fixed pause between them.
///
/// Cancellation is checked before every attempt and every pause.
fn call_with_retry<C: CompletionClient>(
    client: &C,
    request: &CompletionRequest,
    settings: &TrialSettings,
    control: &RunControl,
) -> CallOutcome {
    let mut last_error: Option<ProviderError> = None;
    for attempt in 1..=settings.retry {
        if let Err(reason) = control.check() {
            return CallOutcome::Interrupted { reason, last_error };
        }
        let attempt_request = CompletionRequest {
            timeout: control.cap(settings.request_timeout),
            ..request.clone()
        };
        match client.complete(&attempt_request) {
            Ok(completion) => return CallOutcome::Completed(completion),
            Err(err) => {
                warn!(attempt, retry = settings.retry, error = %err, "completion attempt failed");
                last_error = Some(err);
            }
        }
        if attempt < settings.retry
            && let Err(reason) = control.sleep(settings.retry_delay)
        {
            return CallOutcome::Interrupted { reason, last_error };
        }
    }
    CallOutcome::Failed(
        last_error.unwrap_or_else(|| ProviderError::Transport("no attempts made".to_string())),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::io::models::resolve_model;
    use crate::test_support::{ScriptedClient, reply, simple_scenario};

    fn settings(retry: u32) -> TrialSettings {
        TrialSettings {
            max_tokens: 200,
            strength: 0.4,
            retry,
            retry_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn run<C: CompletionClient>(
        client: &C,
        scenario: &Scenario,
        retry: u32,
        control: &RunControl,
    ) -> TrialResult {
        let spec = TrialSpec {
            scenario_key: "demo",
            scenario,
            model: resolve_model("claude").expect("claude"),
            temperature: 0.3,
        };
        let prompts = PromptBuilder::new().expect("prompts");
        run_trial(client, &prompts, &spec, &settings(retry), control).expect("trial")
    }

    #[test]
    fn applies_decisions_and_counts_operators() {
        let scenario = simple_scenario(3);
        let client = ScriptedClient::new(vec![
            reply("operator: sigma\ntarget: financial", 10, 5),
            reply("operator: delta\ntarget: river", 10, 5),
            reply("operator: sigma\ntarget: memory", 12, 6),
        ]);
        let result = run(&client, &scenario, 3, &RunControl::new());

        assert_eq!(result.turns.len(), 3);
        assert!(result.turns.iter().all(|turn| turn.success));
        assert_eq!((result.sigma_count, result.delta_count), (2, 1));
        assert_eq!(result.total_tokens, 48);
        assert!((result.avg_tokens_per_turn - 16.0).abs() < 1e-9);
        assert!((result.success_rate - 1.0).abs() < 1e-9);
        assert_eq!(result.states.len(), 4);
        assert_eq!(result.turns[2].state_id.to_string(), "S0003");
        assert!(!result.interrupted);
    }

    #[test]
    fn prompts_follow_the_evolving_state() {
        let scenario = simple_scenario(2);
        let client = ScriptedClient::new(vec![
            reply("operator: sigma\ntarget: financial", 1, 1),
            reply("operator: sigma\ntarget: financial", 1, 1),
        ]);
        let result = run(&client, &scenario, 1, &RunControl::new());
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].prompt.contains("[financial, river, memory]"));
        assert!(requests[1].prompt.contains("turn 2"));
        assert_eq!(requests[0].model_id, "claude-sonnet-4-20250514");
        assert!((requests[0].temperature - 0.3).abs() < 1e-12);

        let last = result.states.last().expect("state");
        let financial = last.items.get("financial").expect("financial");
        assert!((financial - 0.95).abs() < 1e-9);
    }

    #[test]
    fn incomplete_extraction_keeps_state_but_counts_tokens() {
        let scenario = simple_scenario(2);
        let client = ScriptedClient::new(vec![
            reply("I am not sure", 20, 4),
            reply("operator: sigma but no item", 20, 4),
        ]);
        let result = run(&client, &scenario, 2, &RunControl::new());

        assert_eq!(result.turns.len(), 2);
        assert!(result.turns.iter().all(|turn| !turn.success && turn.error.is_none()));
        assert_eq!(result.turns[1].operator, Some(Operator::Strengthen));
        assert_eq!(result.turns[1].target, None);
        assert_eq!(result.total_tokens, 48);
        assert_eq!(result.success_rate, 0.0);
        assert_eq!(result.states.len(), 1);
        assert_eq!(result.turns[1].state_id.to_string(), "S0000");
    }

    #[test]
    fn retries_then_succeeds() {
        let scenario = simple_scenario(1);
        let client = ScriptedClient::new(vec![
            Err(ProviderError::Transport("reset".to_string())),
            Err(ProviderError::Quota {
                status: 429,
                body: "slow".to_string(),
            }),
            reply("operator: delta\ntarget: memory", 8, 2),
        ]);
        let result = run(&client, &scenario, 3, &RunControl::new());
        assert_eq!(client.calls(), 3);
        assert!(result.turns[0].success);
        assert_eq!(result.turns[0].error, None);
    }

    #[test]
    fn exhausted_retries_record_error_and_continue() {
        let scenario = simple_scenario(3);
        let client = ScriptedClient::always(Err(ProviderError::Transport("down".to_string())));
        let result = run(&client, &scenario, 2, &RunControl::new());

        assert_eq!(client.calls(), 6);
        assert_eq!(result.turns.len(), 3);
        for turn in &result.turns {
            assert!(!turn.success);
            assert_eq!(turn.total_tokens, 0);
            assert!(turn.error.as_deref().expect("error").contains("down"));
        }
        assert_eq!(result.total_tokens, 0);
        assert_eq!(result.success_rate, 0.0);
        assert!(!result.interrupted);
    }

    #[test]
    fn cancelled_before_start_records_nothing() {
        let scenario = simple_scenario(2);
        let client = ScriptedClient::always(reply("sigma financial", 1, 1));
        let control = RunControl::new();
        control.cancel();
        let result = run(&client, &scenario, 2, &control);
        assert!(result.interrupted);
        assert!(result.turns.is_empty());
        assert_eq!(client.calls(), 0);
        assert_eq!(result.states.len(), 1);
    }

    /// Succeeds for the first `succeed` calls, then fails and cancels `control`.
    struct FailAndCancel {
        control: RunControl,
        succeed: usize,
        calls: Cell<usize>,
    }

    impl CompletionClient for FailAndCancel {
        fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            if calls <= self.succeed {
                return Ok(Completion::new("operator: sigma\ntarget: river", 4, 2));
            }
            self.control.cancel();
            Err(ProviderError::Transport("reset".to_string()))
        }
    }

    #[test]
    fn cancel_during_retries_records_turn_with_last_error() {
        let scenario = simple_scenario(3);
        let control = RunControl::new();
        let client = FailAndCancel {
            control: control.clone(),
            succeed: 0,
            calls: Cell::new(0),
        };
        let result = run(&client, &scenario, 3, &control);

        assert_eq!(client.calls.get(), 1);
        assert!(result.interrupted);
        assert_eq!(result.turns.len(), 1);
        let turn = &result.turns[0];
        assert!(!turn.success);
        assert_eq!(turn.total_tokens, 0);
        assert_eq!(
            turn.error.as_deref(),
            Some("run cancelled; last provider error: transport error: reset")
        );
        assert_eq!(turn.state_id.to_string(), "S0000");
    }

    #[test]
    fn cancel_during_retries_keeps_earlier_turns() {
        let scenario = simple_scenario(3);
        let control = RunControl::new();
        let client = FailAndCancel {
            control: control.clone(),
            succeed: 1,
            calls: Cell::new(0),
        };
        let result = run(&client, &scenario, 2, &control);

        assert_eq!(client.calls.get(), 2);
        assert!(result.interrupted);
        assert_eq!(result.turns.len(), 2);
        assert!(result.turns[0].success);
        assert_eq!(result.turns[0].target.as_deref(), Some("river"));
        let cut = &result.turns[1];
        assert!(!cut.success);
        assert!(
            cut.error
                .as_deref()
                .expect("error")
                .starts_with("run cancelled; last provider error")
        );
        assert_eq!(cut.state_id, result.turns[0].state_id);
        assert_eq!(result.sigma_count, 1);
        assert!((result.success_rate - 1.0 / 3.0).abs() < 1e-9);
    }
}
