//! Agent Core
//!
//! This module implements the bounded agent loop. Each run is an explicit
//! state machine:
//!
//! 1. `Running(i)`: send the transcript to the reasoning service
//! 2. If the reply asks for a tool: append the model turn, move to
//!    `AwaitingToolResult`, dispatch, append the tool turn, go to `Running(i+1)`
//! 3. If the reply is plain text: `Finished(text)`
//! 4. If the reply has nothing usable: `Finished` with a fixed notice
//! 5. Once `i` reaches the ceiling: `Exhausted`
//!
//! # Limits
//!
//! - Max 20 dispatched calls per run
//! - One call executed per model turn; further calls in the same turn are dropped
//! - 300-second timeout per LLM call

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sdk::types::{ToolCall, ToolResponse};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::llm::{GenerateRequest, LLMProvider, Part, Turn, Usage};
use crate::tools::ToolRegistry;

use super::Transcript;

/// Maximum number of dispatched calls per run
pub const MAX_ITERATIONS: usize = 20;

/// Timeout for each LLM call in seconds
pub const LLM_TIMEOUT_SECS: u64 = 300;

/// Answer used when a model turn carries nothing usable
pub const NO_VALID_RESPONSE: &str = "No valid response from the model.";

/// Answer used when the ceiling is reached before any model text was seen
pub const NO_CONCLUSION: &str = "No conclusion was reached.";

/// Where a run currently stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum AgentState {
    /// About to ask the service for turn `n`; `n` calls have been dispatched
    Running(usize),

    /// A model turn requested a call that has not been dispatched yet
    AwaitingToolResult,

    /// The run ended with an answer
    Finished(String),

    /// The iteration ceiling was reached
    Exhausted,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Exhausted)
    }
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Terminal state
    pub state: AgentState,

    /// Final answer, or the best partial text when exhausted
    pub answer: String,

    /// Number of dispatched calls
    pub iterations: usize,

    /// Usage counters summed over every service call
    pub usage: Usage,

    /// Duration in milliseconds
    pub duration_ms: u64,

    /// Every turn of the run
    pub transcript: Transcript,
}

impl RunOutcome {
    pub fn is_exhausted(&self) -> bool {
        self.state == AgentState::Exhausted
    }
}

/// Hooks for following a run as it happens
///
/// Every method defaults to doing nothing.
pub trait AgentObserver: Send + Sync {
    /// Usage reported for one service call
    fn on_usage(&self, _usage: &Usage) {}

    /// A call is about to be dispatched
    fn on_call(&self, _call: &ToolCall) {}

    /// A dispatched call produced its response
    fn on_response(&self, _response: &ToolResponse) {}
}

/// Agent Core that orchestrates the agent loop
pub struct AgentCore {
    /// Reasoning service
    provider: Arc<dyn LLMProvider>,

    /// Tool registry for dispatching tool calls
    tools: Arc<ToolRegistry>,

    max_iterations: usize,
    llm_timeout: Duration,
    observer: Option<Arc<dyn AgentObserver>>,
}

impl AgentCore {
    /// Create a new agent core
    pub fn new(provider: Arc<dyn LLMProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            max_iterations: MAX_ITERATIONS,
            llm_timeout: Duration::from_secs(LLM_TIMEOUT_SECS),
            observer: None,
        }
    }

    /// Lower the iteration ceiling; values above `MAX_ITERATIONS` are clamped.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.min(MAX_ITERATIONS);
        self
    }

    pub fn with_llm_timeout(mut self, llm_timeout: Duration) -> Self {
        self.llm_timeout = llm_timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the loop for one prompt until it reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Transport failures of the reasoning service end the run. Tool
    /// failures never do; they are handed back to the service as results.
    pub async fn run(&self, prompt: &str) -> Result<RunOutcome> {
        let start_time = Instant::now();
        info!("Starting run with {}", self.provider.name());

        let system_prompt = self.tools.system_prompt();
        let declarations = self.tools.declarations();
        let mut transcript = Transcript::new(prompt);
        let mut usage = Usage::default();
        let mut pending: Option<ToolCall> = None;
        let mut state = AgentState::Running(0);

        while !state.is_terminal() {
            state = match state {
                AgentState::Running(iteration) if iteration >= self.max_iterations => {
                    warn!("Reached max iterations ({})", self.max_iterations);
                    AgentState::Exhausted
                }
                AgentState::Running(iteration) => {
                    debug!("Iteration {}/{}", iteration + 1, self.max_iterations);

                    let request = GenerateRequest {
                        system_prompt: &system_prompt,
                        transcript: transcript.turns(),
                        tools: &declarations,
                    };
                    let reply = match timeout(self.llm_timeout, self.provider.generate(&request))
                        .await
                    {
                        Ok(Ok(reply)) => reply,
                        Ok(Err(e)) => {
                            error!("LLM call failed: {}", e);
                            return Err(EngineError::LLMProvider(e.to_string()))
                                .context("Reasoning service request failed");
                        }
                        Err(_) => {
                            error!("LLM call timed out after {:?}", self.llm_timeout);
                            return Err(EngineError::LLMProvider(format!(
                                "no reply within {} seconds",
                                self.llm_timeout.as_secs()
                            ))
                            .into());
                        }
                    };

                    if let Some(turn_usage) = reply.usage {
                        usage += turn_usage;
                        if let Some(observer) = &self.observer {
                            observer.on_usage(&turn_usage);
                        }
                    }

                    match accept_model_turn(reply.parts) {
                        ModelTurn::Unusable => {
                            warn!("Model returned no usable parts");
                            AgentState::Finished(NO_VALID_RESPONSE.to_string())
                        }
                        ModelTurn::Answer(turn, text) => {
                            transcript.push(turn);
                            AgentState::Finished(text)
                        }
                        ModelTurn::Call(turn, call) => {
                            transcript.push(turn);
                            pending = Some(call);
                            AgentState::AwaitingToolResult
                        }
                    }
                }
                AgentState::AwaitingToolResult => {
                    let call = pending
                        .take()
                        .ok_or_else(|| EngineError::MalformedResponse("no pending call".into()))?;

                    info!("Calling function: {}", call.name);
                    if let Some(observer) = &self.observer {
                        observer.on_call(&call);
                    }

                    let response = self.tools.dispatch(&call).await;
                    if response.response.is_error() {
                        debug!("{} returned an error: {}", call.name, response.response.text());
                    }
                    if let Some(observer) = &self.observer {
                        observer.on_response(&response);
                    }

                    transcript.push(Turn::tool(response));
                    AgentState::Running(transcript.tool_turns())
                }
                terminal => terminal,
            };
        }

        let answer = match &state {
            AgentState::Finished(text) => text.clone(),
            _ => transcript
                .last_model_text()
                .unwrap_or(NO_CONCLUSION)
                .to_string(),
        };
        let iterations = transcript.tool_turns();
        let duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "Run ended as {:?} in {}ms after {} calls",
            state, duration_ms, iterations
        );

        Ok(RunOutcome {
            state,
            answer,
            iterations,
            usage,
            duration_ms,
            transcript,
        })
    }
}

/// How a model turn is taken into the transcript
#[derive(Debug, PartialEq)]
enum ModelTurn {
    Unusable,
    Answer(Turn, String),
    Call(Turn, ToolCall),
}

/// Keep the usable parts of a reply up to and including its first call.
///
/// Parts after the first call are dropped, so every recorded model turn
/// carries at most one call and is answered by exactly one tool turn.
fn accept_model_turn(parts: Vec<Part>) -> ModelTurn {
    let mut kept = Vec::new();
    let mut call = None;
    let mut dropped = 0;

    for part in parts {
        if call.is_some() {
            dropped += 1;
            continue;
        }
        match part {
            Part::Text(text) if text.trim().is_empty() => {}
            Part::Text(text) => kept.push(Part::Text(text)),
            Part::FunctionCall(c) => {
                call = Some(c.clone());
                kept.push(Part::FunctionCall(c));
            }
            Part::FunctionResponse(_) => {}
        }
    }

    if dropped > 0 {
        warn!("Dropping {} part(s) after the first function call", dropped);
    }

    match call {
        Some(call) => ModelTurn::Call(Turn::model(kept), call),
        None => {
            let Some(text) = kept.iter().find_map(Part::as_text).map(str::to_string) else {
                return ModelTurn::Unusable;
            };
            ModelTurn::Answer(Turn::model(kept), text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall::new(format!("call_{name}"), name, json!({}))
    }

    #[test]
    fn test_empty_reply_is_unusable() {
        assert_eq!(accept_model_turn(vec![]), ModelTurn::Unusable);
        assert_eq!(
            accept_model_turn(vec![Part::Text("  \n".into())]),
            ModelTurn::Unusable
        );
    }

    #[test]
    fn test_first_text_is_the_answer() {
        let turn = accept_model_turn(vec![
            Part::Text("The answer is 8.".into()),
            Part::Text("Anything else?".into()),
        ]);
        match turn {
            ModelTurn::Answer(turn, text) => {
                assert_eq!(text, "The answer is 8.");
                assert_eq!(turn.parts.len(), 2);
            }
            other => panic!("unexpected turn: {other:?}"),
        }
    }

    #[test]
    fn test_only_first_call_is_kept() {
        let turn = accept_model_turn(vec![
            Part::Text("Looking around.".into()),
            Part::FunctionCall(call("get_files_info")),
            Part::FunctionCall(call("write_file")),
            Part::Text("trailing".into()),
        ]);
        match turn {
            ModelTurn::Call(turn, first) => {
                assert_eq!(first.name, "get_files_info");
                assert_eq!(
                    turn.parts,
                    vec![
                        Part::Text("Looking around.".into()),
                        Part::FunctionCall(call("get_files_info")),
                    ]
                );
            }
            other => panic!("unexpected turn: {other:?}"),
        }
    }

    #[test]
    fn test_call_wins_over_text() {
        let turn = accept_model_turn(vec![
            Part::Text("I'll check.".into()),
            Part::FunctionCall(call("get_file_content")),
        ]);
        assert!(matches!(turn, ModelTurn::Call(_, c) if c.name == "get_file_content"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AgentState::Running(0).is_terminal());
        assert!(!AgentState::AwaitingToolResult.is_terminal());
        assert!(AgentState::Finished(String::new()).is_terminal());
        assert!(AgentState::Exhausted.is_terminal());
    }
}
