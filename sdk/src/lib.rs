//! Warden SDK
//!
//! Shared types and errors for the Warden engine: the action request and
//! response envelope exchanged with the reasoning service, and the error
//! taxonomy used across the workspace.

/// Error types and handling
pub mod errors;

/// Tool input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, WardenErrorExt};
pub use types::{Access, Action, ActionResult, ToolCall, ToolError, ToolResponse};
