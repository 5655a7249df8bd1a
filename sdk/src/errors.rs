//! Error types and handling
//!
//! This module provides the engine-level error type. Tool-level failures are
//! not errors in this sense: they are recovered into [`crate::ToolError`]
//! values and handed back to the reasoning service as ordinary results.
//! `EngineError` covers the conditions that end a run or prevent one from
//! starting.

use thiserror::Error;

/// Trait for Warden error extensions
///
/// Provides a user-friendly hint printed next to the error.
pub trait WardenErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, WardenErrorExt};
///
/// let error = EngineError::MissingCredential("GEMINI_API_KEY".to_string());
/// assert_eq!(
///     error.user_hint(),
///     "Set the API key in the environment or a .env file"
/// );
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Working directory unavailable: {0:?}: {1}")]
    WorkspaceMissing(std::path::PathBuf, String),

    #[error("Missing credential: {0} environment variable not set")]
    MissingCredential(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Agent loop errors
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl WardenErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::WorkspaceMissing(_, _) => "The working directory must exist and be a directory",
            Self::MissingCredential(_) => "Set the API key in the environment or a .env file",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API key and network",
            Self::MalformedResponse(_) => "The model returned an unusable response. Try again",
        }
    }
}
