//! Domain prompt rendering.
//!
//! One template per [`Domain`]. Each presents the current item names and the
//! turn text, and asks for an `operator:` / `target:` answer.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::io::scenario::Domain;

const IME_TEMPLATE: &str = include_str!("prompts/ime.md");
const RAG_TEMPLATE: &str = include_str!("prompts/rag.md");
const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");
const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");
const MULTI_AGENT_TEMPLATE: &str = include_str!("prompts/multi_agent.md");
const MULTIMODAL_TEMPLATE: &str = include_str!("prompts/multimodal.md");

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (domain, source) in [
            (Domain::Ime, IME_TEMPLATE),
            (Domain::Rag, RAG_TEMPLATE),
            (Domain::Agent, AGENT_TEMPLATE),
            (Domain::Planning, PLANNING_TEMPLATE),
            (Domain::MultiAgent, MULTI_AGENT_TEMPLATE),
            (Domain::Multimodal, MULTIMODAL_TEMPLATE),
        ] {
            env.add_template(template_name(domain), source)
                .with_context(|| format!("register {domain} template"))?;
        }
        Ok(Self { env })
    }

    pub fn build(&self, domain: Domain, items: &[String], text: &str) -> Result<String> {
        let template = self
            .env
            .get_template(template_name(domain))
            .with_context(|| format!("lookup {domain} template"))?;
        let rendered = template
            .render(context! { items => items, text => text })
            .with_context(|| format!("render {domain} prompt"))?;
        Ok(rendered)
    }
}

fn template_name(domain: Domain) -> &'static str {
    match domain {
        Domain::Ime => "ime",
        Domain::Rag => "rag",
        Domain::Agent => "agent",
        Domain::Planning => "planning",
        Domain::MultiAgent => "multi_agent",
        Domain::Multimodal => "multimodal",
    }
}
