pub mod filesystem;
pub mod script;

pub use filesystem::FilesystemTool;
pub use script::{ScriptSettings, ScriptTool};

use sdk::errors::EngineError;
use sdk::types::{Action, ActionResult, ToolCall, ToolError, ToolResponse};
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::fs_guard::FileSystemGuard;
use crate::llm::ToolDeclaration;

/// Argument name the dispatcher owns; a caller-supplied value is discarded.
const ROOT_ARGUMENT: &str = "working_directory";

/// Registry of the fixed set of tools the agent can dispatch to.
///
/// Built once at startup and immutable afterwards. Every tool shares the
/// same `FileSystemGuard`, which is the only place the working root lives.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    fs: FilesystemTool,
    script: ScriptTool,
}

impl ToolRegistry {
    pub fn new(fs: FilesystemTool, script: ScriptTool) -> Self {
        Self { fs, script }
    }

    /// Registry with default limits rooted at `workspace`.
    pub fn with_workspace(workspace: impl AsRef<Path>) -> Result<Self, EngineError> {
        let guard = FileSystemGuard::new(workspace)?;
        Ok(Self::new(
            FilesystemTool::new(guard.clone()),
            ScriptTool::new(guard, ScriptSettings::default()),
        ))
    }

    /// Registry rooted at the configured workspace with the configured limits.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let guard = FileSystemGuard::new(&config.core.workspace)?;
        Ok(Self::new(
            FilesystemTool::with_max_chars(guard.clone(), config.tools.read_max_chars),
            ScriptTool::new(guard, config.tools.script_settings()),
        ))
    }

    pub fn workspace(&self) -> &Path {
        self.fs.guard().workspace()
    }

    /// Dispatch one tool call and wrap its outcome.
    ///
    /// Never fails: unknown actions, malformed arguments and panics inside a
    /// tool all come back as an `error` envelope tagged with the call.
    pub async fn dispatch(self: &Arc<Self>, call: &ToolCall) -> ToolResponse {
        debug!("Dispatching tool '{}' with args: {}", call.name, call.args);

        let mut args = call.args.clone();
        if let Some(map) = args.as_object_mut() {
            if map.remove(ROOT_ARGUMENT).is_some() {
                warn!(
                    "Discarding caller-supplied {} for '{}'",
                    ROOT_ARGUMENT, call.name
                );
            }
        }

        let action = match Action::decode(&call.name, &args) {
            Ok(action) => action,
            Err(e) => {
                if matches!(e, ToolError::UnknownAction(_)) {
                    warn!("Unknown tool requested: {}", call.name);
                }
                return ToolResponse::new(call, ActionResult::Error(e.to_string()));
            }
        };

        let registry = Arc::clone(self);
        let outcome = run_isolated(&call.name, async move { registry.execute(action).await }).await;

        ToolResponse::new(call, outcome.into())
    }

    /// Run a decoded action against the matching tool.
    pub async fn execute(&self, action: Action) -> Result<String, ToolError> {
        match action {
            Action::GetFilesInfo { directory } => self.fs.get_files_info(directory.as_deref()).await,
            Action::GetFileContent { file_path } => self.fs.get_file_content(&file_path).await,
            Action::WriteFile { file_path, content } => {
                self.fs.write_file(&file_path, &content).await
            }
            Action::RunScript { file_path, args } => self.script.run(&file_path, &args).await,
        }
    }

    /// Function declarations advertised to the reasoning service.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::new(
                Action::GET_FILES_INFO,
                "Lists files in the specified directory along with their sizes, constrained to the working directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "directory": {
                            "type": "string",
                            "description": "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself."
                        }
                    }
                }),
            ),
            ToolDeclaration::new(
                Action::GET_FILE_CONTENT,
                "Reads the content of a file, constrained to the working directory. Long files are truncated.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The path to the file, relative to the working directory."
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
            ToolDeclaration::new(
                Action::WRITE_FILE,
                "Writes content to a file, creating it and any parent directories if needed and overwriting it otherwise.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The path to the file, relative to the working directory."
                        },
                        "content": {
                            "type": "string",
                            "description": "The exact content to write."
                        }
                    },
                    "required": ["file_path", "content"]
                }),
            ),
            ToolDeclaration::new(
                Action::RUN_SCRIPT,
                "Executes a script file with optional arguments and returns its output, constrained to the working directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The path to the script, relative to the working directory."
                        },
                        "args": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Optional arguments passed to the script."
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
        ]
    }

    /// Generate the system prompt describing the available operations.
    pub fn system_prompt(&self) -> String {
        [
            "You are a helpful AI coding agent.",
            "",
            "When a user asks a question or makes a request, make a function call plan. You can perform the following operations:",
            "",
            "- List files and directories",
            "- Read file contents",
            "- Execute script files with optional arguments",
            "- Write or overwrite files",
            "",
            "All paths you provide should be relative to the working directory. You do not need to specify the working directory in your function calls as it is automatically injected for security reasons.",
            "",
            "Call one function at a time and wait for its result. When you have the final answer, respond with plain text only.",
        ]
        .join("\n")
    }
}

/// Run a tool on its own task so a panic surfaces as a `Fault` instead of
/// unwinding through the agent loop.
async fn run_isolated<F>(name: &str, task: F) -> Result<String, ToolError>
where
    F: Future<Output = Result<String, ToolError>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => {
            error!("Tool '{}' panicked: {}", name, e);
            Err(ToolError::Fault {
                action: name.to_string(),
                cause: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<ToolRegistry>) {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(ToolRegistry::with_workspace(temp.path()).unwrap());
        (temp, registry)
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", name, args)
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_temp, registry) = setup();
        let response = registry.dispatch(&call("rm_rf", json!({}))).await;

        assert_eq!(response.name, "rm_rf");
        assert_eq!(
            response.response,
            ActionResult::Error("Unknown function: rm_rf".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_fault() {
        let (_temp, registry) = setup();
        let response = registry
            .dispatch(&call("get_file_content", json!({"file_path": 7})))
            .await;

        assert!(response.response.is_error());
        assert!(response
            .response
            .text()
            .starts_with("Error executing get_file_content:"));
    }

    #[tokio::test]
    async fn test_panicking_tool_is_fault() {
        let outcome = run_isolated("get_file_content", async {
            if true {
                panic!("cursor out of range");
            }
            Ok(String::new())
        })
        .await;

        let response = ToolResponse::new(
            &call("get_file_content", json!({"file_path": "a.txt"})),
            outcome.into(),
        );
        assert!(response.response.is_error());
        let text = response.response.text();
        assert!(text.starts_with("Error executing get_file_content:"));
        assert!(text.contains("panicked"));
        assert!(text.contains("cursor out of range"));
    }

    #[tokio::test]
    async fn test_unbounded_read_cap_does_not_fault() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let guard = FileSystemGuard::new(temp.path()).unwrap();
        let registry = Arc::new(ToolRegistry::new(
            FilesystemTool::with_max_chars(guard.clone(), usize::MAX),
            ScriptTool::new(guard, ScriptSettings::default()),
        ));

        let response = registry
            .dispatch(&call("get_file_content", json!({"file_path": "a.txt"})))
            .await;
        assert_eq!(response.response, ActionResult::Result("hello".to_string()));
    }

    #[tokio::test]
    async fn test_working_directory_cannot_be_overridden() {
        let (temp, registry) = setup();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::fs::write(temp.path().join("inside.txt"), "inside").unwrap();

        let response = registry
            .dispatch(&call(
                "get_files_info",
                json!({"working_directory": outside.path().to_str().unwrap()}),
            ))
            .await;

        let listing = response.response.text();
        assert!(listing.contains("inside.txt"));
        assert!(!listing.contains("secret.txt"));
    }

    #[tokio::test]
    async fn test_scenario_round_trip() {
        let (_temp, registry) = setup();

        let listed = registry.dispatch(&call("get_files_info", json!({}))).await;
        assert_eq!(listed.response, ActionResult::Result(String::new()));

        let missing = registry
            .dispatch(&call("get_file_content", json!({"file_path": "missing.txt"})))
            .await;
        assert!(missing.response.is_error());
        assert!(missing.response.text().contains("missing.txt"));
        assert!(missing.response.text().contains("not found"));

        let written = registry
            .dispatch(&call(
                "write_file",
                json!({"file_path": "a/b.txt", "content": "hi"}),
            ))
            .await;
        assert!(!written.response.is_error());

        let read = registry
            .dispatch(&call("get_file_content", json!({"file_path": "a/b.txt"})))
            .await;
        assert_eq!(read.response, ActionResult::Result("hi".to_string()));

        let escaped = registry
            .dispatch(&call("get_files_info", json!({"directory": "../"})))
            .await;
        assert!(escaped.response.is_error());
        assert!(escaped.response.text().contains("\"../\""));
        assert!(escaped
            .response
            .text()
            .contains("outside the permitted working directory"));
    }

    #[tokio::test]
    async fn test_response_is_tagged_with_call() {
        let (_temp, registry) = setup();
        let response = registry
            .dispatch(&ToolCall::new("abc", "get_files_info", json!({})))
            .await;
        assert_eq!(response.id, "abc");
        assert_eq!(response.name, "get_files_info");
    }

    #[test]
    fn test_declarations_cover_every_action() {
        let (_temp, registry) = setup();
        let names: Vec<String> = registry
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, Action::NAMES.map(String::from).to_vec());
    }

    #[test]
    fn test_system_prompt_mentions_relative_paths() {
        let (_temp, registry) = setup();
        assert!(registry
            .system_prompt()
            .contains("relative to the working directory"));
    }
}
