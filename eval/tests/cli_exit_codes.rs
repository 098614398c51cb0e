//! CLI tests for `eval` exit codes.
//!
//! Spawns the eval binary for commands that never reach a provider and
//! checks exit codes and artifact side effects.

use std::fs;
use std::process::Command;

use tracker::control::RunControl;
use tracker::exit_codes;
use tracker::io::artifact::{load_artifact, write_artifact};
use tracker::run::run_experiment;
use tracker::test_support::{ScriptedClient, reply, scenario_set, simple_scenario, test_config};

const SCENARIOS: &str = r#"{
  "bank": {
    "domain": "IME",
    "initial_state": {"financial": 0.6, "river": 0.4},
    "turns": [{"text": "deposit a check"}, {"text": "open an account"}]
  }
}"#;

#[test]
fn list_prints_models_and_scenarios() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("scenarios.json");
    fs::write(&path, SCENARIOS).expect("write scenarios");

    let output = Command::new(env!("CARGO_BIN_EXE_eval"))
        .arg("list")
        .arg("--scenarios")
        .arg(&path)
        .output()
        .expect("eval list");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("model: claude"));
    assert!(stdout.contains("scenario: bank domain=IME items=2 turns=2"));
}

#[test]
fn run_with_unknown_model_exits_invalid_without_artifact() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scenarios = temp.path().join("scenarios.json");
    let out = temp.path().join("results.json");
    fs::write(&scenarios, SCENARIOS).expect("write scenarios");

    let status = Command::new(env!("CARGO_BIN_EXE_eval"))
        .arg("run")
        .arg("--config")
        .arg(temp.path().join("missing.toml"))
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(&out)
        .arg("--models")
        .arg("claude,llama")
        .status()
        .expect("eval run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert!(!out.exists());
}

#[test]
fn run_with_invalid_scenarios_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scenarios = temp.path().join("scenarios.json");
    fs::write(&scenarios, SCENARIOS.replace("\"IME\"", "\"Finance\"")).expect("write scenarios");

    let status = Command::new(env!("CARGO_BIN_EXE_eval"))
        .arg("run")
        .arg("--config")
        .arg(temp.path().join("missing.toml"))
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(temp.path().join("results.json"))
        .status()
        .expect("eval run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn aggregate_rewrites_statistics() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = test_config(temp.path());
    let set = scenario_set(vec![("bank", simple_scenario(2))]);
    let client = ScriptedClient::always(reply("operator: sigma\ntarget: river", 4, 2));
    run_experiment(&cfg, &set, &client, &RunControl::new(), |_| {}).expect("run");

    let mut artifact = load_artifact(&cfg.output_path).expect("artifact");
    artifact.aggregation.by_condition.clear();
    write_artifact(&cfg.output_path, &artifact).expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_eval"))
        .arg("aggregate")
        .arg(&cfg.output_path)
        .output()
        .expect("eval aggregate");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("aggregate: records=2 conditions=1"));

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cfg.output_path).expect("read")).expect("json");
    assert_eq!(raw["aggregation"]["by_condition"][0]["n_trials"], 2);
    assert_eq!(raw["aggregation"]["by_condition"][0]["trial_turn_consistency"], 1.0);
}

#[test]
fn aggregate_missing_artifact_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_eval"))
        .arg("aggregate")
        .arg(temp.path().join("absent.json"))
        .status()
        .expect("eval aggregate");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
