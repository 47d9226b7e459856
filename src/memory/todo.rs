//! Todo record type
//!
//! Todos are user action items with a priority in [1, 5], an optional due
//! date and a set of tags. Completion is a state transition: completed todos
//! stay in the store until explicitly purged, and a completed todo is never
//! silently reverted to open.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Lowest allowed todo priority
pub const TODO_PRIORITY_MIN: u8 = 1;
/// Highest allowed todo priority
pub const TODO_PRIORITY_MAX: u8 = 5;

/// A user todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Stable unique identifier
    pub id: String,
    /// What needs to be done
    pub description: String,
    /// Priority in [1, 5], higher is more urgent
    pub priority: u8,
    /// Whether the item is done
    pub completed: bool,
    /// When the item was completed, if it was
    pub completed_at: Option<DateTime<Utc>>,
    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,
    /// Searchable tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Mark the todo complete, recording the completion time.
    pub fn complete(&mut self) {
        if !self.completed {
            self.completed = true;
            let now = Utc::now();
            self.completed_at = Some(now);
            self.updated_at = now;
        }
    }

    /// Reopen a completed todo. Only called on an explicit, unambiguous
    /// request; noisy extraction output must not reach this.
    pub fn reopen(&mut self) {
        if self.completed {
            self.completed = false;
            self.completed_at = None;
            self.updated_at = Utc::now();
        }
    }
}

/// Validate a todo priority against the allowed range.
pub fn validate_todo_priority(priority: u8) -> Result<()> {
    if !(TODO_PRIORITY_MIN..=TODO_PRIORITY_MAX).contains(&priority) {
        return Err(Error::Validation(format!(
            "todo priority {priority} out of range [{TODO_PRIORITY_MIN}, {TODO_PRIORITY_MAX}]"
        )));
    }
    Ok(())
}

/// Builder for constructing `Todo` instances
pub struct TodoBuilder {
    description: Option<String>,
    priority: u8,
    due_date: Option<DateTime<Utc>>,
    tags: BTreeSet<String>,
}

impl TodoBuilder {
    /// Create a new builder; new todos start open with priority 3.
    pub fn new() -> Self {
        Self {
            description: None,
            priority: 3,
            due_date: None,
            tags: BTreeSet::new(),
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority (validated at build time)
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the due date
    pub fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add multiple tags at once
    pub fn tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Build the todo, validating description and priority bounds
    pub fn build(self) -> Result<Todo> {
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::Validation("todo description is required".to_string()))?;
        validate_todo_priority(self.priority)?;

        let now = Utc::now();
        Ok(Todo {
            id: Uuid::new_v4().to_string(),
            description,
            priority: self.priority,
            completed: false,
            completed_at: None,
            due_date: self.due_date,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Default for TodoBuilder {
    fn default() -> Self {
        Self::new()
    }
}
