//! Memory snapshot and category types
//!
//! A `MemorySnapshot` is the full current state of all three memory
//! categories; it is the unit of read and write against the store.

use super::fact::Fact;
use super::instruction::Instruction;
use super::todo::Todo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three memory categories, each persisted to its own file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// System instructions guiding agent behavior
    Instructions,
    /// Factual information about the user
    Facts,
    /// User action items
    Todos,
}

impl MemoryCategory {
    /// The on-disk file name for this category
    pub fn file_name(&self) -> &'static str {
        match self {
            MemoryCategory::Instructions => "instructions.json",
            MemoryCategory::Facts => "facts.json",
            MemoryCategory::Todos => "todos.json",
        }
    }

    /// All categories, in snapshot order
    pub fn all() -> [MemoryCategory; 3] {
        [
            MemoryCategory::Instructions,
            MemoryCategory::Facts,
            MemoryCategory::Todos,
        ]
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryCategory::Instructions => "instructions",
            MemoryCategory::Facts => "facts",
            MemoryCategory::Todos => "todos",
        };
        write!(f, "{name}")
    }
}

/// The complete current state of all memory categories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// All instructions
    pub instructions: Vec<Instruction>,
    /// All facts
    pub facts: Vec<Fact>,
    /// All todos, including completed ones
    pub todos: Vec<Todo>,
}

impl MemorySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all categories
    pub fn len(&self) -> usize {
        self.instructions.len() + self.facts.len() + self.todos.len()
    }

    /// Whether the snapshot holds no records at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the snapshot as a human-readable context block for injection
    /// into the agent prompt: instructions by priority descending, facts
    /// grouped as stored, open todos before completed ones.
    pub fn render_context(&self) -> String {
        let mut out = String::from("=== AGENT INSTRUCTIONS ===\n");

        let mut instructions: Vec<&Instruction> = self.instructions.iter().collect();
        instructions.sort_by(|a, b| b.priority.cmp(&a.priority));
        for inst in instructions {
            out.push_str(&format!("[Priority {}] {}\n", inst.priority, inst.text));
        }

        out.push_str("\n=== USER FACTS ===\n");
        for fact in &self.facts {
            out.push_str(&format!("[{}] {}\n", fact.category, fact.content));
        }

        out.push_str("\n=== USER TODOS ===\n");
        let mut todos: Vec<&Todo> = self.todos.iter().collect();
        todos.sort_by(|a, b| {
            (a.completed, std::cmp::Reverse(a.priority), a.created_at).cmp(&(
                b.completed,
                std::cmp::Reverse(b.priority),
                b.created_at,
            ))
        });
        for todo in todos {
            let status = if todo.completed { "x" } else { "o" };
            out.push_str(&format!(
                "{} [P{}] {}\n",
                status, todo.priority, todo.description
            ));
        }

        out
    }
}
