//! Fact record type
//!
//! Facts capture durable information about the user, grouped under a
//! free-form category label ("preferences", "personal_info", "habits",
//! "work", ...). The dedup key during reconciliation is the pair of
//! normalized content and normalized category: repeating the same fact must
//! never create a duplicate.

use super::instruction::normalize;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A factual statement about the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Stable unique identifier
    pub id: String,
    /// The fact content
    pub content: String,
    /// Free-form category label
    pub category: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Fact {
    /// Normalized content, half of the dedup key
    pub fn normalized_content(&self) -> String {
        normalize(&self.content)
    }

    /// Normalized category, the other half of the dedup key
    pub fn normalized_category(&self) -> String {
        normalize(&self.category)
    }

    /// Whether this fact matches a candidate (content, category) pair under
    /// case/whitespace-insensitive comparison.
    pub fn matches(&self, content: &str, category: &str) -> bool {
        self.normalized_content() == normalize(content)
            && self.normalized_category() == normalize(category)
    }
}

/// Builder for constructing `Fact` instances
pub struct FactBuilder {
    content: Option<String>,
    category: Option<String>,
}

impl FactBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            content: None,
            category: None,
        }
    }

    /// Set the fact content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the category label
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Build the fact, validating that content and category are non-empty
    pub fn build(self) -> Result<Fact> {
        let content = self
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Validation("fact content is required".to_string()))?;
        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Validation("fact category is required".to_string()))?;

        let now = Utc::now();
        Ok(Fact {
            id: Uuid::new_v4().to_string(),
            content,
            category,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Default for FactBuilder {
    fn default() -> Self {
        Self::new()
    }
}
