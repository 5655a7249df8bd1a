//! Configuration management
//!
//! This module handles loading, validation, and management of the Warden configuration.
//! Configuration is stored in TOML format at ~/.warden/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level
//! - **llm**: Provider selection, request timeout, iteration ceiling, Gemini settings
//! - **tools**: Script interpreter and limits of the file tools
//!
//! Every field has a default, so an absent file or an empty section is valid.
//! The file is only ever read; it is never created on the user's behalf.
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Canonicalizes the workspace to resolve symlinks and .. patterns
//! - Verifies workspace is an existing directory
//!
//! # Examples
//!
//! ```no_run
//! use warden_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from the default location, or fall back to defaults
//! let config = Config::load(None, None)?;
//!
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Model: {}", config.llm.gemini.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::ScriptSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Tool limits and script interpreter
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory path (supports ~ expansion)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider (gemini)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Per-request timeout for the reasoning service (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hard ceiling on dispatched tool calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Gemini provider settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL for Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,
    // Note: API key comes from GEMINI_API_KEY, never from config
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Program that runs scripts
    #[serde(default = "default_script_interpreter")]
    pub script_interpreter: String,

    /// Required script extension, without the dot
    #[serde(default = "default_script_extension")]
    pub script_extension: String,

    /// Language name used in messages
    #[serde(default = "default_script_language")]
    pub script_language: String,

    /// Wall-clock limit for one script run (seconds)
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    /// Characters returned by get_file_content before truncation
    #[serde(default = "default_read_max_chars")]
    pub read_max_chars: usize,
}

// Default value functions
fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_iterations() -> usize {
    crate::agent::MAX_ITERATIONS
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-001".to_string()
}

fn default_script_interpreter() -> String {
    "python3".to_string()
}

fn default_script_extension() -> String {
    "py".to_string()
}

fn default_script_language() -> String {
    "Python".to_string()
}

fn default_script_timeout() -> u64 {
    crate::tools::script::SCRIPT_TIMEOUT.as_secs()
}

fn default_read_max_chars() -> usize {
    crate::tools::filesystem::MAX_CHARS
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            request_timeout_secs: default_request_timeout(),
            max_iterations: default_max_iterations(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            script_interpreter: default_script_interpreter(),
            script_extension: default_script_extension(),
            script_language: default_script_language(),
            script_timeout_secs: default_script_timeout(),
            read_max_chars: default_read_max_chars(),
        }
    }
}

impl LLMConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ToolsConfig {
    /// Script runner settings described by this section
    pub fn script_settings(&self) -> ScriptSettings {
        ScriptSettings {
            interpreter: self.script_interpreter.clone(),
            extension: self.script_extension.clone(),
            language: self.script_language.clone(),
            timeout: Duration::from_secs(self.script_timeout_secs),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, ~/.warden/config.toml is
    /// read if present and the built-in defaults are used otherwise. A
    /// `workspace` override replaces the file's value before validation,
    /// so a stale `[core] workspace` does not block it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (unknown log level, missing workspace)
    pub fn load(explicit: Option<&Path>, workspace: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match explicit {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_config_path() {
                Ok(path) if path.exists() => Self::read_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Some(workspace) = workspace {
            config.core.workspace = workspace.to_path_buf();
        }

        config.validate_and_process()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let mut config = Self::read_file(path)?;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config = Self::parse(contents)?;
        config.validate_and_process()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Built-in defaults, validated against the current directory
    pub fn from_defaults() -> Result<Self, EngineError> {
        let mut config = Self::default();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.warden/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".warden").join("config.toml"))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level, provider and numeric limits
    /// - Clamps the iteration ceiling, script timeout and read cap to their defaults
    /// - Expands ~ in the workspace path
    /// - Canonicalizes the workspace and verifies it is a directory
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        // Validate provider
        let valid_providers = ["gemini"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.tools.script_timeout_secs == 0 {
            return Err(EngineError::Config(
                "script_timeout_secs must be greater than 0".to_string(),
            ));
        }

        // Configured limits may tighten the built-in ones, never loosen them
        self.llm.max_iterations = self.llm.max_iterations.min(crate::agent::MAX_ITERATIONS);
        self.tools.script_timeout_secs = self
            .tools
            .script_timeout_secs
            .min(crate::tools::script::SCRIPT_TIMEOUT.as_secs());
        self.tools.read_max_chars = self
            .tools
            .read_max_chars
            .min(crate::tools::filesystem::MAX_CHARS);

        // Leading dots are accepted and dropped
        self.tools.script_extension = self
            .tools
            .script_extension
            .trim_start_matches('.')
            .to_string();
        if self.tools.script_extension.is_empty() {
            return Err(EngineError::Config(
                "script_extension must not be empty".to_string(),
            ));
        }

        // Expand and validate workspace path
        let expanded = expand_path(&self.core.workspace)?;
        self.core.workspace = expanded
            .canonicalize()
            .map_err(|e| EngineError::WorkspaceMissing(expanded.clone(), e.to_string()))?;

        // Verify workspace is a directory
        if !self.core.workspace.is_dir() {
            return Err(EngineError::WorkspaceMissing(
                self.core.workspace.clone(),
                "not a directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
///
/// # Examples
///
/// ```ignore
/// let path = PathBuf::from("~/projects");
/// let expanded = expand_path(&path)?;
/// // expanded is now /home/user/projects (on Unix)
/// ```
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
