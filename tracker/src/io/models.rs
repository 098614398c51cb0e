//! Fixed registry of models an experiment may target.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Completion provider backing a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        })
    }
}

/// A model alias pinned to a provider and a concrete model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub alias: &'static str,
    pub provider: ProviderKind,
    pub model_id: &'static str,
}

pub const KNOWN_MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "claude",
        provider: ProviderKind::Anthropic,
        model_id: "claude-sonnet-4-20250514",
    },
    ModelSpec {
        alias: "gpt",
        provider: ProviderKind::OpenAi,
        model_id: "gpt-4o-mini-2024-07-18",
    },
    ModelSpec {
        alias: "gemini",
        provider: ProviderKind::Gemini,
        model_id: "gemini-2.0-flash",
    },
];

pub fn resolve_model(alias: &str) -> Option<&'static ModelSpec> {
    KNOWN_MODELS.iter().find(|spec| spec.alias == alias)
}

pub fn known_aliases() -> Vec<&'static str> {
    KNOWN_MODELS.iter().map(|spec| spec.alias).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_aliases() {
        let spec = resolve_model("gpt").expect("gpt");
        assert_eq!(spec.provider, ProviderKind::OpenAi);
        assert_eq!(spec.model_id, "gpt-4o-mini-2024-07-18");
        assert!(resolve_model("llama").is_none());
        assert_eq!(known_aliases(), vec!["claude", "gpt", "gemini"]);
    }
}
