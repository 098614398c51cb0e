//! Scenario set loading with schema validation.
//!
//! A scenario set is a JSON object mapping scenario key to
//! `{domain, initial_state, turns}`. The document is validated against
//! `schemas/scenario_set.schema.json` before it is deserialized, so malformed
//! input never reaches the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::types::Weights;

const SCENARIO_SET_SCHEMA: &str = include_str!("../../../schemas/scenario_set.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "IME")]
    Ime,
    #[serde(rename = "RAG")]
    Rag,
    Agent,
    Planning,
    #[serde(rename = "Multi-agent")]
    MultiAgent,
    Multimodal,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Ime => "IME",
            Domain::Rag => "RAG",
            Domain::Agent => "Agent",
            Domain::Planning => "Planning",
            Domain::MultiAgent => "Multi-agent",
            Domain::Multimodal => "Multimodal",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of new information presented to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(alias = "query", alias = "situation")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub domain: Domain,
    /// Unnormalized starting weights, in declaration order.
    pub initial_state: Weights,
    pub turns: Vec<Turn>,
}

/// Validated scenarios keyed by scenario key, plus the source digest.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    scenarios: BTreeMap<String, Scenario>,
    sha256: String,
}

impl ScenarioSet {
    /// Load and validate a scenario set from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read scenarios {}", path.display()))?;
        let contents = String::from_utf8(bytes)
            .with_context(|| format!("scenarios {} is not UTF-8", path.display()))?;
        let set =
            Self::parse_str(&contents).with_context(|| format!("load scenarios {}", path.display()))?;
        debug!(path = %path.display(), count = set.len(), sha256 = %set.sha256, "scenarios loaded");
        Ok(set)
    }

    /// Parse and validate a scenario set from a JSON string.
    pub fn parse_str(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents).context("parse scenario json")?;
        validate_schema(&value)?;
        // From the text, not `value`: a `Value` map collapses repeated keys.
        let UniqueScenarios(scenarios) =
            serde_json::from_str(contents).context("deserialize scenarios")?;
        Ok(Self {
            scenarios,
            sha256: hex::encode(Sha256::digest(contents.as_bytes())),
        })
    }

    /// Build a set from already-typed scenarios (no schema pass).
    pub fn from_scenarios(scenarios: BTreeMap<String, Scenario>) -> Self {
        let digest = serde_json::to_vec(&scenarios)
            .map(|bytes| hex::encode(Sha256::digest(bytes)))
            .unwrap_or_default();
        Self {
            scenarios,
            sha256: digest,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Scenario> {
        self.scenarios.get(key)
    }

    /// Scenario keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Hex SHA-256 of the source document.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Scenario map that rejects a repeated scenario key.
struct UniqueScenarios(BTreeMap<String, Scenario>);

impl<'de> Deserialize<'de> for UniqueScenarios {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScenariosVisitor;

        impl<'de> Visitor<'de> for ScenariosVisitor {
            type Value = UniqueScenarios;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping scenario keys to scenarios")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<UniqueScenarios, A::Error> {
                let mut scenarios = BTreeMap::new();
                while let Some((key, scenario)) = access.next_entry::<String, Scenario>()? {
                    if scenarios.contains_key(&key) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate scenario '{key}'"
                        )));
                    }
                    scenarios.insert(key, scenario);
                }
                Ok(UniqueScenarios(scenarios))
            }
        }

        deserializer.deserialize_map(ScenariosVisitor)
    }
}

fn validate_schema(document: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(SCENARIO_SET_SCHEMA).context("parse scenario set schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(document) {
        let messages = compiled
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "scenario schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
  "bank": {
    "domain": "IME",
    "initial_state": {"financial": 0.5, "river": 0.3, "memory": 0.2},
    "turns": [
      {"text": "I need to deposit a check"},
      {"query": "what are the opening hours"},
      {"situation": "the teller is busy"}
    ]
  }
}"#;

    #[test]
    fn parses_valid_set_and_keeps_item_order() {
        let set = ScenarioSet::parse_str(BANK).expect("parses");
        let bank = set.get("bank").expect("bank");
        assert_eq!(bank.domain, Domain::Ime);
        assert_eq!(bank.initial_state.names(), vec!["financial", "river", "memory"]);
        assert_eq!(bank.turns.len(), 3);
        assert_eq!(bank.turns[1].text, "what are the opening hours");
        assert_eq!(bank.turns[2].text, "the teller is busy");
        assert_eq!(set.sha256().len(), 64);
    }

    #[test]
    fn digest_tracks_source_bytes() {
        let a = ScenarioSet::parse_str(BANK).expect("a");
        let b = ScenarioSet::parse_str(&BANK.replace("busy", "away")).expect("b");
        assert_ne!(a.sha256(), b.sha256());
    }

    #[test]
    fn rejects_unknown_domain() {
        let input = BANK.replace("\"IME\"", "\"Finance\"");
        let err = ScenarioSet::parse_str(&input).expect_err("bad domain");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_non_positive_weight() {
        let input = BANK.replace("0.2", "0");
        ScenarioSet::parse_str(&input).expect_err("zero weight");
        let input = BANK.replace("0.2", "-1");
        ScenarioSet::parse_str(&input).expect_err("negative weight");
    }

    #[test]
    fn rejects_missing_turn_text_and_empty_turns() {
        let input = BANK.replace("{\"text\": \"I need to deposit a check\"}", "{\"note\": \"x\"}");
        ScenarioSet::parse_str(&input).expect_err("turn without text");

        let input = r#"{"s": {"domain": "RAG", "initial_state": {"a": 1}, "turns": []}}"#;
        ScenarioSet::parse_str(input).expect_err("no turns");
    }

    #[test]
    fn rejects_unexpected_scenario_fields() {
        let input = r#"{"s": {"domain": "RAG", "initial_state": {"a": 1}, "turns": [{"text": "t"}], "code": "print()"}}"#;
        ScenarioSet::parse_str(input).expect_err("extra field");
    }

    #[test]
    fn rejects_repeated_item_name() {
        let input = r#"{"s": {"domain": "IME", "initial_state": {"a": 1, "b": 1, "a": 5}, "turns": [{"text": "t"}]}}"#;
        let err = ScenarioSet::parse_str(input).expect_err("repeated item");
        assert!(format!("{err:#}").contains("duplicate item 'a'"), "{err:#}");
    }

    #[test]
    fn rejects_repeated_scenario_key() {
        let input = r#"{
  "s": {"domain": "IME", "initial_state": {"a": 1}, "turns": [{"text": "t"}]},
  "s": {"domain": "RAG", "initial_state": {"b": 1}, "turns": [{"text": "u"}]}
}"#;
        let err = ScenarioSet::parse_str(input).expect_err("repeated scenario");
        assert!(format!("{err:#}").contains("duplicate scenario 's'"), "{err:#}");
    }

    #[test]
    fn load_reads_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scenarios.json");
        fs::write(&path, BANK).expect("write");
        let set = ScenarioSet::load(&path).expect("load");
        assert_eq!(set.keys(), vec!["bank"]);
        assert_eq!(set.sha256(), ScenarioSet::parse_str(BANK).expect("parse").sha256());
    }
}
