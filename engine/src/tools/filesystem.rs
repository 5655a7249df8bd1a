//! Filesystem Core Tool
//!
//! Directory listing, file reads and file writes within the workspace.
//! Every path goes through `FileSystemGuard` before any I/O, and every
//! failure comes back as a typed `ToolError` rather than a fault.

use sdk::types::{Access, ToolError};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::fs_guard::{FileSystemGuard, ResolvedPath};

/// Default cap on characters returned by a single read
pub const MAX_CHARS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct FilesystemTool {
    guard: FileSystemGuard,
    max_chars: usize,
}

impl FilesystemTool {
    pub fn new(guard: FileSystemGuard) -> Self {
        Self::with_max_chars(guard, MAX_CHARS)
    }

    pub fn with_max_chars(guard: FileSystemGuard, max_chars: usize) -> Self {
        Self { guard, max_chars }
    }

    /// List the immediate children of a directory (the workspace if `None`).
    ///
    /// One line per entry in the order the OS enumerates them; the listing
    /// is not sorted. If any entry cannot be inspected the whole listing
    /// fails and nothing partial is returned.
    pub async fn get_files_info(&self, directory: Option<&str>) -> Result<String, ToolError> {
        let shown = directory.unwrap_or(".");
        let path = self.resolve(directory.unwrap_or(""), Access::List, shown)?;
        info!("Listing directory: {}", path.display());

        let is_dir = fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ToolError::NotADirectory(shown.to_string()));
        }

        let mut entries = fs::read_dir(&path).await.map_err(|e| ToolError::ListFailed {
            path: shown.to_string(),
            cause: e.to_string(),
        })?;

        let mut lines = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(ToolError::ListFailed {
                        path: shown.to_string(),
                        cause: e.to_string(),
                    })
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            // Follows links, so a dangling link fails the listing
            let metadata = fs::metadata(entry.path()).await.map_err(|e| {
                warn!("Could not inspect {}: {}", name, e);
                ToolError::EntryInaccessible {
                    entry: name.clone(),
                    directory: shown.to_string(),
                    cause: e.to_string(),
                }
            })?;

            lines.push(format!(
                "- {}: file_size={} bytes, is_dir={}",
                name,
                metadata.len(),
                if metadata.is_dir() { "True" } else { "False" }
            ));
        }

        debug!("Listed {} entries in {}", lines.len(), path.display());
        Ok(lines.join("\n"))
    }

    /// Read a regular file, truncated at the character cap.
    pub async fn get_file_content(&self, file_path: &str) -> Result<String, ToolError> {
        let path = self.resolve(file_path, Access::Read, file_path)?;
        info!("Reading file: {}", path.display());

        let is_file = fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ToolError::FileNotFound(file_path.to_string()));
        }

        let read_failed = |cause: String| ToolError::ReadFailed {
            path: file_path.to_string(),
            cause,
        };

        // A char is at most 4 bytes, so this many bytes always decode to
        // more than `max_chars` chars when the file is longer than the cap.
        let byte_budget = (self.max_chars as u64).saturating_add(1).saturating_mul(4);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| read_failed(e.to_string()))?;
        let mut bytes = Vec::new();
        file.take(byte_budget)
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| read_failed(e.to_string()))?;

        let text = decode_prefix(&bytes).map_err(read_failed)?;

        let mut content: String = text.chars().take(self.max_chars).collect();
        if content.len() < text.len() {
            content.push_str(&format!(
                "\n[...File \"{}\" truncated at {} characters]",
                file_path, self.max_chars
            ));
            debug!("Truncated {} at {} characters", path.display(), self.max_chars);
        }

        Ok(content)
    }

    /// Create or overwrite a file, creating missing parent directories.
    pub async fn write_file(&self, file_path: &str, content: &str) -> Result<String, ToolError> {
        let path = self.resolve(file_path, Access::Write, file_path)?;

        let write_failed = |e: std::io::Error| ToolError::WriteFailed {
            path: file_path.to_string(),
            cause: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        info!("Writing {} bytes to: {}", content.len(), path.display());
        fs::write(&path, content).await.map_err(write_failed)?;

        Ok(format!(
            "Successfully wrote to \"{}\" ({} characters written)",
            file_path,
            content.chars().count()
        ))
    }

    /// Returns the guard shared with the other tools.
    pub fn guard(&self) -> &FileSystemGuard {
        &self.guard
    }

    fn resolve(&self, requested: &str, access: Access, shown: &str) -> Result<PathBuf, ToolError> {
        match self.guard.resolve(requested) {
            ResolvedPath::Inside(path) => Ok(path),
            ResolvedPath::Outside { .. } => Err(ToolError::OutsideWorkspace {
                access,
                path: shown.to_string(),
            }),
        }
    }
}

/// Decode UTF-8, tolerating only a multi-byte char cut off at the very end.
fn decode_prefix(bytes: &[u8]) -> Result<&str, String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) if e.error_len().is_none() => {
            // Incomplete trailing sequence from the byte budget
            Ok(std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default())
        }
        Err(e) => Err(format!("stream did not contain valid UTF-8: {}", e)),
    }
}
