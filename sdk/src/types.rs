//! Tool input/output types
//!
//! These are the values that cross the boundary between the reasoning
//! service and the tool dispatcher: the raw [`ToolCall`] the service emits,
//! the typed [`Action`] it is decoded into, and the [`ToolResponse`]
//! envelope that is handed back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw function call as emitted by the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Identifier used to pair the call with its response
    pub id: String,

    /// Symbolic action name
    pub name: String,

    /// Named arguments (a JSON object)
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// A decoded action request. One variant per supported operation.
///
/// The working root is deliberately absent: it is injected by the
/// dispatcher and can never be chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "args")]
pub enum Action {
    /// List the immediate children of a directory
    #[serde(rename = "get_files_info")]
    GetFilesInfo {
        #[serde(default)]
        directory: Option<String>,
    },

    /// Read a file, truncated at the read cap
    #[serde(rename = "get_file_content")]
    GetFileContent { file_path: String },

    /// Create or overwrite a file
    #[serde(rename = "write_file")]
    WriteFile { file_path: String, content: String },

    /// Run a script with the configured interpreter
    #[serde(rename = "run_python_file")]
    RunScript {
        file_path: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Action {
    pub const GET_FILES_INFO: &'static str = "get_files_info";
    pub const GET_FILE_CONTENT: &'static str = "get_file_content";
    pub const WRITE_FILE: &'static str = "write_file";
    pub const RUN_SCRIPT: &'static str = "run_python_file";

    /// Every action name the dispatcher accepts.
    pub const NAMES: [&'static str; 4] = [
        Self::GET_FILES_INFO,
        Self::GET_FILE_CONTENT,
        Self::WRITE_FILE,
        Self::RUN_SCRIPT,
    ];

    /// Decode a named action from its argument object.
    ///
    /// Unknown names yield [`ToolError::UnknownAction`]; malformed arguments
    /// yield [`ToolError::Fault`] naming the action.
    pub fn decode(name: &str, args: &serde_json::Value) -> Result<Self, ToolError> {
        if !Self::NAMES.contains(&name) {
            return Err(ToolError::UnknownAction(name.to_string()));
        }

        let args = match args {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };

        serde_json::from_value(serde_json::json!({ "name": name, "args": args })).map_err(|e| {
            ToolError::Fault {
                action: name.to_string(),
                cause: e.to_string(),
            }
        })
    }

    /// The symbolic name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetFilesInfo { .. } => Self::GET_FILES_INFO,
            Self::GetFileContent { .. } => Self::GET_FILE_CONTENT,
            Self::WriteFile { .. } => Self::WRITE_FILE,
            Self::RunScript { .. } => Self::RUN_SCRIPT,
        }
    }
}

/// Outcome of one action. Serializes as `{"result": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Result(String),
    Error(String),
}

impl ActionResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The payload or error text.
    pub fn text(&self) -> &str {
        match self {
            Self::Result(text) | Self::Error(text) => text,
        }
    }
}

impl From<Result<String, ToolError>> for ActionResult {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(text) => Self::Result(text),
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

/// Response envelope tagged with the originating call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: ActionResult,
}

impl ToolResponse {
    pub fn new(call: &ToolCall, response: ActionResult) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    /// JSON form of the envelope body, as sent back to the service.
    pub fn body(&self) -> serde_json::Value {
        serde_json::to_value(&self.response).unwrap_or(serde_json::Value::Null)
    }
}

/// The kind of access a confinement violation was attempted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    List,
    Read,
    Write,
    Execute,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::List => write!(f, "list"),
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write to"),
            Access::Execute => write!(f, "execute"),
        }
    }
}

/// Tool-specific errors.
///
/// The `Display` text of each variant is exactly what the reasoning service
/// sees, so the wording is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Cannot {access} \"{path}\" as it is outside the permitted working directory")]
    OutsideWorkspace { access: Access, path: String },

    #[error("\"{0}\" is not a directory")]
    NotADirectory(String),

    #[error("Could not list directory \"{path}\": {cause}")]
    ListFailed { path: String, cause: String },

    #[error("Could not access item \"{entry}\" in directory \"{directory}\": {cause}")]
    EntryInaccessible {
        entry: String,
        directory: String,
        cause: String,
    },

    #[error("File not found or is not a regular file: \"{0}\"")]
    FileNotFound(String),

    #[error("Could not read file \"{path}\": {cause}")]
    ReadFailed { path: String, cause: String },

    #[error("Could not write to file \"{path}\": {cause}")]
    WriteFailed { path: String, cause: String },

    #[error("File \"{0}\" not found.")]
    ScriptNotFound(String),

    #[error("\"{path}\" is not a {language} file.")]
    ExtensionRejected { path: String, language: String },

    #[error("Process timed out after {secs} seconds.{output}")]
    Timeout { secs: u64, output: String },

    #[error("executing {language} file: {cause}")]
    LaunchFailure { language: String, cause: String },

    #[error("Unknown function: {0}")]
    UnknownAction(String),

    #[error("Error executing {action}: {cause}")]
    Fault { action: String, cause: String },
}
