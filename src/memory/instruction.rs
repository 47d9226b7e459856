//! Instruction record type
//!
//! Instructions are system-level directives that guide agent behavior
//! ("always be concise", "prefer metric units"). Each carries a priority in
//! [1, 10]; higher priorities are injected earlier into the agent prompt.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest allowed instruction priority
pub const INSTRUCTION_PRIORITY_MIN: u8 = 1;
/// Highest allowed instruction priority
pub const INSTRUCTION_PRIORITY_MAX: u8 = 10;

/// A system instruction guiding agent behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Stable unique identifier
    pub id: String,
    /// The directive text
    pub text: String,
    /// Priority in [1, 10], higher wins
    pub priority: u8,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Instruction {
    /// Normalized form of the text, used for semantic-equality matching
    /// during reconciliation (lowercase, whitespace collapsed).
    pub fn normalized_text(&self) -> String {
        normalize(&self.text)
    }
}

/// Lowercase and collapse internal whitespace for comparison purposes.
pub(crate) fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate an instruction priority against the allowed range.
pub fn validate_instruction_priority(priority: u8) -> Result<()> {
    if !(INSTRUCTION_PRIORITY_MIN..=INSTRUCTION_PRIORITY_MAX).contains(&priority) {
        return Err(Error::Validation(format!(
            "instruction priority {priority} out of range [{INSTRUCTION_PRIORITY_MIN}, {INSTRUCTION_PRIORITY_MAX}]"
        )));
    }
    Ok(())
}

/// Builder for constructing `Instruction` instances
pub struct InstructionBuilder {
    text: Option<String>,
    priority: u8,
}

impl InstructionBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            text: None,
            priority: INSTRUCTION_PRIORITY_MIN,
        }
    }

    /// Set the directive text
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the priority (validated at build time)
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Build the instruction, validating text and priority bounds
    pub fn build(self) -> Result<Instruction> {
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Validation("instruction text is required".to_string()))?;
        validate_instruction_priority(self.priority)?;

        let now = Utc::now();
        Ok(Instruction {
            id: Uuid::new_v4().to_string(),
            text,
            priority: self.priority,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Default for InstructionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
