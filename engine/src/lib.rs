//! Warden Engine Library
//!
//! This library provides the core functionality of the Warden agent.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Working-directory confinement module
pub mod fs_guard;

/// LLM provider abstraction layer
pub mod llm;

/// Agent loop core module
pub mod agent;

/// Built-in native tools
pub mod tools;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
