//! LLM Provider Abstraction Layer
//!
//! The agent loop talks to the reasoning service only through the
//! [`LLMProvider`] trait. A request carries the whole transcript, the
//! system prompt and the tool declarations; a reply is the ordered list of
//! parts the service produced for one model turn.

use async_trait::async_trait;
use sdk::types::{ToolCall, ToolResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod gemini;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Role of a turn in the transcript
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human prompt
    User,

    /// Output of the reasoning service
    Model,

    /// Results of dispatched tool calls
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One piece of a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    FunctionCall(ToolCall),
    FunctionResponse(ToolResponse),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&ToolCall> {
        match self {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        }
    }
}

/// A role plus its ordered parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a user turn holding a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Create a model turn
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Create a tool turn carrying one response
    pub fn tool(response: ToolResponse) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![Part::FunctionResponse(response)],
        }
    }
}

/// A function the service may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,

    /// JSON schema of the argument object
    pub parameters: serde_json::Value,
}

impl ToolDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Everything the service needs for one generation step
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub system_prompt: &'a str,
    pub transcript: &'a [Turn],
    pub tools: &'a [ToolDeclaration],
}

/// Token counters reported by the service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.response_tokens += other.response_tokens;
    }
}

/// One model turn as returned by the service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub parts: Vec<Part>,
    pub usage: Option<Usage>,
}

impl ModelReply {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts, usage: None }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "gemini")
    fn name(&self) -> &str;

    /// Generate the next model turn
    ///
    /// # Returns
    /// * `Ok(ModelReply)` - The parts of the model turn, possibly empty
    /// * `Err(LLMError)` - If the request fails at the transport level
    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelReply>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::ActionResult;
    use serde_json::json;

    #[test]
    fn test_turn_creation() {
        let user = Turn::user("Hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.parts, vec![Part::Text("Hello".to_string())]);

        let call = ToolCall::new("call_1", "get_files_info", json!({}));
        let response = ToolResponse::new(&call, ActionResult::Result(String::new()));
        let tool = Turn::tool(response.clone());
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.parts, vec![Part::FunctionResponse(response)]);
    }

    #[test]
    fn test_part_accessors() {
        let text = Part::Text("answer".into());
        assert_eq!(text.as_text(), Some("answer"));
        assert!(text.as_function_call().is_none());

        let call = Part::FunctionCall(ToolCall::new("id", "write_file", json!({})));
        assert!(call.as_text().is_none());
        assert_eq!(call.as_function_call().map(|c| c.name.as_str()), Some("write_file"));
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::default();
        total += Usage {
            prompt_tokens: 10,
            response_tokens: 2,
        };
        total += Usage {
            prompt_tokens: 15,
            response_tokens: 3,
        };
        assert_eq!(
            total,
            Usage {
                prompt_tokens: 25,
                response_tokens: 5
            }
        );
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Model.to_string(), "model");
        assert_eq!(Role::Tool.to_string(), "tool");
    }
}
