//! Script Runner Core Tool
//!
//! Runs a script file from the workspace with the configured interpreter.
//! Only the launch location and identity are constrained: the script must
//! resolve inside the workspace, be a regular file and carry the expected
//! extension. The child runs with the workspace as its working directory,
//! inherits the environment, and is killed when the wall-clock timeout
//! expires. Output captured up to that point is still reported.

use sdk::types::{Access, ToolError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fs_guard::{FileSystemGuard, ResolvedPath};

/// Default wall-clock limit for one script run
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to keep draining pipes after the child was killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Interpreter settings for the script runner.
#[derive(Debug, Clone)]
pub struct ScriptSettings {
    /// Program used to run scripts (`python3` by default)
    pub interpreter: String,

    /// Required file extension, without the dot
    pub extension: String,

    /// Human-readable language name used in error messages
    pub language: String,

    pub timeout: Duration,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            extension: "py".to_string(),
            language: "Python".to_string(),
            timeout: SCRIPT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptTool {
    guard: FileSystemGuard,
    settings: ScriptSettings,
}

type Captured = Arc<Mutex<Vec<u8>>>;

impl ScriptTool {
    pub fn new(guard: FileSystemGuard, settings: ScriptSettings) -> Self {
        Self { guard, settings }
    }

    /// Run `file_path` with `args` appended verbatim.
    pub async fn run(&self, file_path: &str, args: &[String]) -> Result<String, ToolError> {
        let script = match self.guard.resolve(file_path) {
            ResolvedPath::Inside(path) => path,
            ResolvedPath::Outside { requested } => {
                return Err(ToolError::OutsideWorkspace {
                    access: Access::Execute,
                    path: requested,
                })
            }
        };

        let is_file = tokio::fs::metadata(&script)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            // Base name only, so the message does not depend on directory depth
            return Err(ToolError::ScriptNotFound(base_name(file_path)));
        }

        if !self.has_expected_extension(file_path) {
            return Err(ToolError::ExtensionRejected {
                path: file_path.to_string(),
                language: self.settings.language.clone(),
            });
        }

        self.execute(&script, args).await
    }

    fn has_expected_extension(&self, file_path: &str) -> bool {
        file_path.ends_with(&format!(".{}", self.settings.extension))
    }

    async fn execute(&self, script: &Path, args: &[String]) -> Result<String, ToolError> {
        info!(
            "Running script: {} {} {:?}",
            self.settings.interpreter,
            script.display(),
            args
        );

        let mut child = Command::new(&self.settings.interpreter)
            .arg(script)
            .args(args)
            .current_dir(self.guard.workspace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!("Failed to start {}: {}", self.settings.interpreter, e);
                ToolError::LaunchFailure {
                    language: self.settings.language.clone(),
                    cause: e.to_string(),
                }
            })?;

        let stdout: Captured = Arc::default();
        let stderr: Captured = Arc::default();
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| spawn_capture(pipe, Arc::clone(&stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| spawn_capture(pipe, Arc::clone(&stderr)));

        let status = match tokio::time::timeout(self.settings.timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                return Err(ToolError::LaunchFailure {
                    language: self.settings.language.clone(),
                    cause: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    "Script timed out after {}s, killing",
                    self.settings.timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out script: {}", e);
                }
                None
            }
        };

        finish_capture(stdout_task).await;
        finish_capture(stderr_task).await;
        let stdout = take_text(&stdout);
        let stderr = take_text(&stderr);

        let Some(status) = status else {
            let mut output = String::new();
            if !stdout.is_empty() {
                output.push_str(&format!("\nSTDOUT (before timeout):\n{}", stdout));
            }
            if !stderr.is_empty() {
                output.push_str(&format!("\nSTDERR (before timeout):\n{}", stderr));
            }
            return Err(ToolError::Timeout {
                secs: self.settings.timeout.as_secs(),
                output,
            });
        };

        debug!(exit_code = ?status.code(), "Script finished");

        let mut lines = Vec::new();
        if !stdout.is_empty() {
            lines.push("STDOUT:".to_string());
            lines.push(stdout);
        }
        if !stderr.is_empty() {
            lines.push("STDERR:".to_string());
            lines.push(stderr);
        }
        if !status.success() {
            // A signal-terminated process has no exit code
            lines.push(format!(
                "Process exited with code {}",
                status.code().unwrap_or(-1)
            ));
        }

        if lines.is_empty() {
            return Ok("No output produced.".to_string());
        }
        Ok(lines.join("\n"))
    }
}

/// Copy a pipe into a shared buffer chunk by chunk, so whatever arrived
/// before a kill is still available.
fn spawn_capture<R>(mut pipe: R, sink: Captured) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) => {
                    debug!("Pipe read ended: {}", e);
                    break;
                }
            }
        }
    })
}

/// Wait briefly for a reader to hit EOF; a grandchild still holding the
/// pipe must not stall the tool.
async fn finish_capture(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
        task.abort();
    }
}

fn take_text(captured: &Captured) -> String {
    let bytes = captured
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn base_name(file_path: &str) -> String {
    let unified = file_path.replace('\\', "/");
    PathBuf::from(&unified)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or(unified)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh_settings(timeout: Duration) -> ScriptSettings {
        ScriptSettings {
            interpreter: "sh".to_string(),
            extension: "sh".to_string(),
            language: "shell".to_string(),
            timeout,
        }
    }

    fn setup(timeout: Duration) -> (TempDir, ScriptTool) {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path()).unwrap();
        (temp, ScriptTool::new(guard, sh_settings(timeout)))
    }

    fn write_script(temp: &TempDir, name: &str, body: &str) {
        let path = temp.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_stdout_only() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "hello.sh", "echo hello\n");

        let out = tool.run("hello.sh", &[]).await.unwrap();
        assert_eq!(out, "STDOUT:\nhello");
    }

    #[tokio::test]
    async fn test_stdout_stderr_and_exit_code() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "fail.sh", "echo out\necho err >&2\nexit 3\n");

        let out = tool.run("fail.sh", &[]).await.unwrap();
        assert_eq!(out, "STDOUT:\nout\nSTDERR:\nerr\nProcess exited with code 3");
    }

    #[tokio::test]
    async fn test_no_output_sentinel() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "quiet.sh", "true\n");

        assert_eq!(tool.run("quiet.sh", &[]).await.unwrap(), "No output produced.");
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_code() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "silent.sh", "exit 2\n");

        assert_eq!(
            tool.run("silent.sh", &[]).await.unwrap(),
            "Process exited with code 2"
        );
    }

    #[tokio::test]
    async fn test_args_passed_and_cwd_is_workspace() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "pkg/args.sh", "echo \"$1|$2\"\nls\n");

        let out = tool
            .run("pkg/args.sh", &["3 + 5".to_string(), "x".to_string()])
            .await
            .unwrap();
        assert!(out.starts_with("STDOUT:\n3 + 5|x"));
        // `ls` ran in the workspace, not in pkg/
        assert!(out.contains("pkg"));
    }

    #[tokio::test]
    async fn test_missing_script_names_base_name_only() {
        let (_temp, tool) = setup(SCRIPT_TIMEOUT);
        let err = tool.run("foo/bar.sh", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "File \"bar.sh\" not found.");
    }

    #[tokio::test]
    async fn test_wrong_extension() {
        let (temp, tool) = setup(SCRIPT_TIMEOUT);
        write_script(&temp, "notes.txt", "echo hi\n");

        let err = tool.run("notes.txt", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "\"notes.txt\" is not a shell file.");
    }

    #[tokio::test]
    async fn test_outside_workspace() {
        let (_temp, tool) = setup(SCRIPT_TIMEOUT);
        let err = tool.run("../main.sh", &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot execute \"../main.sh\" as it is outside the permitted working directory"
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let (temp, tool) = setup(Duration::from_secs(1));
        write_script(&temp, "slow.sh", "echo started\nexec sleep 10\n");

        let started = std::time::Instant::now();
        let err = tool.run("slow.sh", &[]).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));

        let text = err.to_string();
        assert!(text.starts_with("Process timed out after 1 seconds."));
        assert!(text.contains("STDOUT (before timeout):\nstarted"));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path()).unwrap();
        let mut settings = sh_settings(SCRIPT_TIMEOUT);
        settings.interpreter = "warden-no-such-interpreter".to_string();
        let tool = ScriptTool::new(guard, settings);
        write_script(&temp, "a.sh", "echo hi\n");

        let err = tool.run("a.sh", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::LaunchFailure { .. }));
        assert!(err.to_string().starts_with("executing shell file:"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("foo/bar.py"), "bar.py");
        assert_eq!(base_name("foo\\bar.py"), "bar.py");
        assert_eq!(base_name("main.py"), "main.py");
    }
}
