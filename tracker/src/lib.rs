//! Belief-state tracking engine and LLM experiment orchestrator.
//!
//! A trial walks a scenario turn by turn. Each turn asks a completion model
//! to pick an operator (σ strengthen, δ dampen) and a target item, and the
//! choice is applied to a normalized belief distribution. Runs repeat trials
//! across models and temperatures and aggregate how consistently the models
//! choose.
//!
//! - **[`core`]**: Pure, deterministic logic (state store, operator engine,
//!   decision extraction). No I/O.
//! - **[`io`]**: Side-effecting operations (config, scenarios, prompts,
//!   provider HTTP calls, result artifacts).
//!
//! Orchestration modules ([`trial`], [`run`], [`schedule`], [`aggregate`],
//! [`control`]) combine the two to implement the CLI commands.

pub mod aggregate;
pub mod control;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
pub mod schedule;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod trial;
