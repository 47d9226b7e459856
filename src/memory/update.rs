//! Candidate memory updates produced by the extraction step
//!
//! A `MemoryUpdate` is the structured output of the external LLM extraction
//! call: proposed additions and modifications per category. It is immutable
//! input to the reconciler and never persisted as-is. Although the extraction
//! layer validates the payload against a schema, the values are treated as
//! untrusted here: every item passes the same field-level checks as any other
//! input before it can touch the store.

use super::instruction::validate_instruction_priority;
use super::todo::validate_todo_priority;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A proposed instruction addition or modification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionCandidate {
    /// Existing record to modify, if any
    #[serde(default)]
    pub id: Option<String>,
    /// The directive text
    pub text: String,
    /// Priority in [1, 10]
    pub priority: u8,
}

impl InstructionCandidate {
    /// Field-level validation applied at the reconcile boundary
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::Validation("instruction text is empty".to_string()));
        }
        validate_instruction_priority(self.priority)
    }
}

/// A proposed fact addition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCandidate {
    /// Existing record to modify, if any
    #[serde(default)]
    pub id: Option<String>,
    /// The fact content
    pub content: String,
    /// Free-form category label
    pub category: String,
}

impl FactCandidate {
    /// Field-level validation applied at the reconcile boundary
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::Validation("fact content is empty".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation("fact category is empty".to_string()));
        }
        Ok(())
    }
}

/// A proposed todo addition or field-level modification
///
/// For a new todo (no `id`) the description is required. For an update, any
/// field left `None` keeps its current value. `completed: Some(false)`
/// against an already-completed todo is ignored unless `reopen` is also set;
/// completion must not regress from noisy extraction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoCandidate {
    /// Existing record to modify, if any
    #[serde(default)]
    pub id: Option<String>,
    /// What needs to be done (required for inserts)
    #[serde(default)]
    pub description: Option<String>,
    /// Priority in [1, 5]
    #[serde(default)]
    pub priority: Option<u8>,
    /// Completion state change
    #[serde(default)]
    pub completed: Option<bool>,
    /// Explicit request to reopen a completed todo
    #[serde(default)]
    pub reopen: bool,
    /// Due date
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Tags to set (replaces the existing set when present)
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
}

impl TodoCandidate {
    /// Field-level validation applied at the reconcile boundary
    pub fn validate(&self) -> Result<()> {
        match &self.description {
            Some(d) if d.trim().is_empty() => {
                return Err(Error::Validation("todo description is empty".to_string()));
            }
            None if self.id.is_none() => {
                return Err(Error::Validation(
                    "new todo requires a description".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(priority) = self.priority {
            validate_todo_priority(priority)?;
        }
        Ok(())
    }
}

/// A full candidate update for one conversation turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    /// Proposed instruction changes
    #[serde(default)]
    pub instructions: Vec<InstructionCandidate>,
    /// Proposed fact changes
    #[serde(default)]
    pub facts: Vec<FactCandidate>,
    /// Proposed todo changes
    #[serde(default)]
    pub todos: Vec<TodoCandidate>,
    /// Extraction-supplied explanation of why these changes were proposed
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl MemoryUpdate {
    /// Whether the update proposes no changes at all
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.facts.is_empty() && self.todos.is_empty()
    }

    /// Total number of candidate items across categories
    pub fn len(&self) -> usize {
        self.instructions.len() + self.facts.len() + self.todos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_candidate_validation() {
        let ok = InstructionCandidate {
            id: None,
            text: "Be concise".to_string(),
            priority: 10,
        };
        assert!(ok.validate().is_ok());

        let empty = InstructionCandidate {
            id: None,
            text: "  ".to_string(),
            priority: 5,
        };
        assert!(empty.validate().is_err());

        let out_of_range = InstructionCandidate {
            id: None,
            text: "x".to_string(),
            priority: 11,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_fact_candidate_validation() {
        let ok = FactCandidate {
            id: None,
            content: "User is a software engineer".to_string(),
            category: "work".to_string(),
        };
        assert!(ok.validate().is_ok());

        let no_category = FactCandidate {
            id: None,
            content: "x".to_string(),
            category: "".to_string(),
        };
        assert!(no_category.validate().is_err());
    }

    #[test]
    fn test_todo_candidate_insert_requires_description() {
        let missing = TodoCandidate {
            id: None,
            description: None,
            priority: None,
            completed: None,
            reopen: false,
            due_date: None,
            tags: None,
        };
        assert!(missing.validate().is_err());

        // An update referencing an existing id may omit the description
        let update_only = TodoCandidate {
            id: Some("t1".to_string()),
            description: None,
            priority: None,
            completed: Some(true),
            reopen: false,
            due_date: None,
            tags: None,
        };
        assert!(update_only.validate().is_ok());
    }

    #[test]
    fn test_todo_candidate_priority_bounds() {
        let bad = TodoCandidate {
            id: Some("t1".to_string()),
            description: None,
            priority: Some(6),
            completed: None,
            reopen: false,
            due_date: None,
            tags: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_deserialize_sparse_payload() {
        // Extraction output only includes the fields it has updates for
        let update: MemoryUpdate = serde_json::from_str(
            r#"{"facts": [{"content": "User lives in Berlin", "category": "personal_info"}]}"#,
        )
        .unwrap();

        assert_eq!(update.facts.len(), 1);
        assert!(update.instructions.is_empty());
        assert!(update.todos.is_empty());
        assert!(update.reasoning.is_none());
        assert!(!update.is_empty());
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn test_deserialize_todo_completion_payload() {
        let update: MemoryUpdate =
            serde_json::from_str(r#"{"todos": [{"id": "t1", "completed": true}]}"#).unwrap();

        let todo = &update.todos[0];
        assert_eq!(todo.id.as_deref(), Some("t1"));
        assert_eq!(todo.completed, Some(true));
        assert!(!todo.reopen);
        assert!(todo.description.is_none());
    }
}
