//! CLI interface for Warden
//!
//! This module provides the command-line interface using clap's derive API.
//! Warden runs a single prompt per invocation, so there are no subcommands.

use clap::Parser;
use std::path::PathBuf;

/// Warden AI coding agent
///
/// Lets a Gemini model list, read, write, and run files inside one working
/// directory to answer a prompt.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print the prompt, token usage, and every function call with its result
    #[arg(long)]
    pub verbose: bool,

    /// Output the run summary in JSON format
    #[arg(long)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory the agent is confined to (overrides config)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// The prompt; multiple words are joined with spaces
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

impl Cli {
    /// The prompt words joined with spaces, or `None` if nothing was given
    pub fn prompt_text(&self) -> Option<String> {
        let text = self.prompt.join(" ");
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
