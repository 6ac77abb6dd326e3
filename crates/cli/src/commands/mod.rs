pub mod agent;
pub mod config_cmd;
pub mod doctor;
pub mod tools;

use anyhow::Context;
use policy_agent_agent::AgentLoop;
use policy_agent_config::AppConfig;
use policy_agent_providers::OpenAiCompatProvider;
use std::sync::Arc;

/// Wire the provider, the tool registry and the loop from config.
pub fn build_agent(config: &AppConfig) -> anyhow::Result<AgentLoop> {
    config.require_llm_key()?;

    let provider = OpenAiCompatProvider::from_config(&config.llm)
        .context("Failed to initialize the language model provider")?;
    let tools = policy_agent_tools::default_registry(config).context("Failed to register tools")?;

    Ok(AgentLoop::from_config(Arc::new(provider), Arc::new(tools), config))
}
