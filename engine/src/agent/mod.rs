//! Agent Loop Core
//!
//! This module implements the bounded agent loop that drives a run through
//! an iterative ask-dispatch-observe cycle. The agent keeps an append-only
//! transcript and exchanges it with the reasoning service until it gets a
//! plain-text answer or hits the iteration ceiling.

pub mod core;
pub mod transcript;

pub use core::{
    AgentCore, AgentObserver, AgentState, RunOutcome, MAX_ITERATIONS, NO_CONCLUSION,
    NO_VALID_RESPONSE,
};
pub use transcript::Transcript;
