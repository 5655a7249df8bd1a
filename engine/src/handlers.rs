//! Command handlers for CLI operations
//!
//! This module wires configuration, the Gemini provider, the tool registry,
//! and the agent loop together for a single `warden <PROMPT>` invocation,
//! and renders the outcome as text or JSON.

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sdk::types::{ToolCall, ToolResponse};
use serde_json::json;
use std::sync::Arc;

use crate::agent::{AgentCore, AgentObserver, RunOutcome};
use crate::config::Config;
use crate::llm::gemini::GeminiProvider;
use crate::llm::{LLMProvider, Usage};
use crate::tools::ToolRegistry;

/// Environment variable holding the Gemini API key
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Prints usage and every call as it happens
#[derive(Debug, Default)]
pub struct VerboseObserver;

impl AgentObserver for VerboseObserver {
    fn on_usage(&self, usage: &Usage) {
        println!("Prompt tokens: {}", usage.prompt_tokens);
        println!("Response tokens: {}", usage.response_tokens);
    }

    fn on_call(&self, call: &ToolCall) {
        println!("Calling function: {}({})", call.name, call.args);
    }

    fn on_response(&self, response: &ToolResponse) {
        println!("-> {}", response.body());
    }
}

/// Read the API key from the environment.
///
/// Call after `.env` has been loaded.
pub fn api_key_from_env() -> Result<String, EngineError> {
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(EngineError::MissingCredential(API_KEY_VAR.to_string())),
    }
}

/// Assemble an agent from config around the given provider
pub fn build_agent(
    config: &Config,
    provider: Arc<dyn LLMProvider>,
    verbose: bool,
) -> Result<AgentCore> {
    let tools = ToolRegistry::from_config(config).context("Failed to prepare the workspace")?;

    let agent = AgentCore::new(provider, Arc::new(tools))
        .with_max_iterations(config.llm.max_iterations)
        .with_llm_timeout(config.llm.request_timeout());

    Ok(if verbose {
        agent.with_observer(Arc::new(VerboseObserver))
    } else {
        agent
    })
}

/// Run one prompt to completion
///
/// Prints the final answer (or the run summary in JSON) to stdout.
pub async fn handle_run(
    prompt: &str,
    config: &Config,
    api_key: String,
    format: OutputFormat,
    verbose: bool,
) -> Result<RunOutcome> {
    let provider = Arc::new(GeminiProvider::new(config.llm.gemini.clone(), api_key));
    let agent = build_agent(config, provider, verbose)?;

    tracing::info!(
        "Running in {} with model {}",
        config.core.workspace.display(),
        config.llm.gemini.model
    );

    if verbose && format == OutputFormat::Text {
        println!("User prompt: {}\n", prompt);
    }

    let outcome = agent.run(prompt).await?;

    match format {
        OutputFormat::Text => println!("{}", render_text(&outcome, agent.max_iterations())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render_json(&outcome))?),
    }

    Ok(outcome)
}

/// Text shown to the user for a finished run
pub fn render_text(outcome: &RunOutcome, max_iterations: usize) -> String {
    if outcome.is_exhausted() {
        format!(
            "{}\nMaximum iterations ({}) reached.",
            outcome.answer, max_iterations
        )
    } else {
        outcome.answer.clone()
    }
}

/// Machine-readable summary of a run
pub fn render_json(outcome: &RunOutcome) -> serde_json::Value {
    json!({
        "status": if outcome.is_exhausted() { "exhausted" } else { "finished" },
        "answer": outcome.answer,
        "iterations": outcome.iterations,
        "prompt_tokens": outcome.usage.prompt_tokens,
        "response_tokens": outcome.usage.response_tokens,
        "duration_ms": outcome.duration_ms,
    })
}
