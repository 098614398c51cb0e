//! Live provider checks.
//!
//! These call the real completion APIs and are excluded from regular runs
//! because they need network access and API credentials. Each test skips
//! itself when its key is missing.
//!
//! Run with: `cargo test --test provider_live -- --ignored`

use std::env;
use std::time::Duration;

use tracker::core::extract::extract;
use tracker::io::models::{ModelSpec, resolve_model};
use tracker::io::prompt::PromptBuilder;
use tracker::io::provider::{CompletionClient, CompletionRequest, HttpCompletionClient};
use tracker::io::scenario::Domain;

fn live_round_trip(alias: &str, key_vars: &[&str]) {
    if key_vars.iter().all(|var| env::var(var).is_err()) {
        eprintln!("skipping {alias}: none of {key_vars:?} set");
        return;
    }
    let model: &ModelSpec = resolve_model(alias).expect("known model");
    let items = vec!["financial".to_string(), "river".to_string()];
    let prompt = PromptBuilder::new()
        .expect("prompts")
        .build(Domain::Ime, &items, "I need to deposit a check at the bank")
        .expect("render");

    let client = HttpCompletionClient::from_env().expect("client");
    let completion = client
        .complete(&CompletionRequest {
            provider: model.provider,
            model_id: model.model_id.to_string(),
            prompt,
            temperature: 0.0,
            max_tokens: 200,
            timeout: Duration::from_secs(60),
        })
        .expect("completion");

    assert!(!completion.text.is_empty());
    assert!(completion.input_tokens > 0);
    assert_eq!(
        completion.total_tokens,
        completion.input_tokens + completion.output_tokens
    );
    let extraction = extract(&completion.text, &items);
    eprintln!("{alias}: {:?} from {:?}", extraction, completion.text);
}

#[test]
#[ignore]
fn anthropic_round_trip() {
    live_round_trip("claude", &["ANTHROPIC_API_KEY"]);
}

#[test]
#[ignore]
fn openai_round_trip() {
    live_round_trip("gpt", &["OPENAI_API_KEY"]);
}

#[test]
#[ignore]
fn gemini_round_trip() {
    live_round_trip("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
}
