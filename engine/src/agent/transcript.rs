//! Transcript for Agent Loop
//!
//! The ordered record of every turn exchanged with the reasoning service in
//! one run. It is append-only: turns are pushed and never removed,
//! reordered, or trimmed.

use serde::Serialize;

use crate::llm::{Part, Role, Turn};

/// Append-only conversation history owned by the agent loop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create a transcript seeded with the user's prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(prompt)],
        }
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Get all turns in order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of tool turns, i.e. dispatched calls
    pub fn tool_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Tool).count()
    }

    /// The most recent non-empty text any model turn produced
    pub fn last_model_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Model)
            .flat_map(|t| t.parts.iter().rev())
            .filter_map(Part::as_text)
            .find(|text| !text.trim().is_empty())
    }
}
