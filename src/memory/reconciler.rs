//! Reconciliation of candidate updates against the current snapshot
//!
//! The reconciler is the single place where new information is combined with
//! existing memory. It is pure: it takes the current snapshot and a candidate
//! update, and returns the merged snapshot plus a diff and the per-item
//! rejections. The caller persists the result through the store and feeds the
//! diff to the audit log, which keeps the merge itself fully testable.
//!
//! Merge policy per category:
//! - Instructions: normalized-text match updates priority only; otherwise
//!   insert. A candidate carrying an existing id updates that record.
//! - Facts: dedup key is (normalized content, normalized category). A match
//!   is a no-op; repeating a fact never duplicates it or bumps timestamps.
//! - Todos: an id-carrying candidate applies field-level updates without
//!   resetting unrelated fields; completion is monotonic unless the candidate
//!   explicitly asks to reopen.

use super::fact::{Fact, FactBuilder};
use super::instruction::{normalize, Instruction, InstructionBuilder};
use super::snapshot::{MemoryCategory, MemorySnapshot};
use super::todo::{Todo, TodoBuilder};
use super::update::{FactCandidate, InstructionCandidate, MemoryUpdate, TodoCandidate};
use chrono::Utc;
use serde::Serialize;

/// Ids touched in one category during a merge
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryDiff {
    /// Ids of newly inserted records
    pub added: Vec<String>,
    /// Ids of modified records
    pub updated: Vec<String>,
    /// Candidates that matched existing state and changed nothing
    pub unchanged: usize,
}

impl CategoryDiff {
    /// Whether the merge touched anything in this category
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }
}

/// The three-way outcome of a merge: per-category changes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileDiff {
    /// Instruction changes
    pub instructions: CategoryDiff,
    /// Fact changes
    pub facts: CategoryDiff,
    /// Todo changes
    pub todos: CategoryDiff,
}

impl ReconcileDiff {
    /// Whether the merge changed nothing at all
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.facts.is_empty() && self.todos.is_empty()
    }
}

/// A candidate item that failed merge-time validation. The rest of the batch
/// still applies; one bad item never blocks the others.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedItem {
    /// Which category the item belonged to
    pub category: MemoryCategory,
    /// A short description of the offending item
    pub item: String,
    /// Why it was rejected
    pub reason: String,
}

/// Result of reconciling a candidate update against a snapshot
#[derive(Debug, Clone)]
pub struct ReconcileResult {
    /// The new snapshot; not yet persisted
    pub merged: MemorySnapshot,
    /// What changed, per category
    pub diff: ReconcileDiff,
    /// Candidates rejected item-by-item
    pub rejected: Vec<RejectedItem>,
}

/// Pure merge of candidate updates into memory snapshots
pub struct Reconciler;

impl Reconciler {
    /// Merge a candidate update into the given snapshot.
    ///
    /// Never writes anywhere; the caller persists `merged` via the store and
    /// records `diff` in the audit log.
    pub fn reconcile(existing: &MemorySnapshot, update: &MemoryUpdate) -> ReconcileResult {
        let mut merged = existing.clone();
        let mut diff = ReconcileDiff::default();
        let mut rejected = Vec::new();

        for candidate in &update.instructions {
            Self::merge_instruction(&mut merged.instructions, candidate, &mut diff.instructions)
                .unwrap_or_else(|reason| {
                    rejected.push(RejectedItem {
                        category: MemoryCategory::Instructions,
                        item: candidate.text.clone(),
                        reason,
                    })
                });
        }

        for candidate in &update.facts {
            Self::merge_fact(&mut merged.facts, candidate, &mut diff.facts).unwrap_or_else(
                |reason| {
                    rejected.push(RejectedItem {
                        category: MemoryCategory::Facts,
                        item: candidate.content.clone(),
                        reason,
                    })
                },
            );
        }

        for candidate in &update.todos {
            Self::merge_todo(&mut merged.todos, candidate, &mut diff.todos).unwrap_or_else(
                |reason| {
                    rejected.push(RejectedItem {
                        category: MemoryCategory::Todos,
                        item: candidate
                            .description
                            .clone()
                            .or_else(|| candidate.id.clone())
                            .unwrap_or_default(),
                        reason,
                    })
                },
            );
        }

        ReconcileResult {
            merged,
            diff,
            rejected,
        }
    }

    fn merge_instruction(
        instructions: &mut Vec<Instruction>,
        candidate: &InstructionCandidate,
        diff: &mut CategoryDiff,
    ) -> std::result::Result<(), String> {
        candidate.validate().map_err(|e| e.to_string())?;

        // Explicit id reference wins over text matching
        if let Some(id) = &candidate.id {
            if let Some(existing) = instructions.iter_mut().find(|i| &i.id == id) {
                if existing.text != candidate.text || existing.priority != candidate.priority {
                    existing.text = candidate.text.clone();
                    existing.priority = candidate.priority;
                    existing.updated_at = Utc::now();
                    diff.updated.push(existing.id.clone());
                } else {
                    diff.unchanged += 1;
                }
                return Ok(());
            }
            // Unknown id falls through to text matching rather than failing:
            // extraction sometimes invents ids for records it paraphrased.
        }

        let normalized = normalize(&candidate.text);
        if let Some(existing) = instructions
            .iter_mut()
            .find(|i| i.normalized_text() == normalized)
        {
            if existing.priority != candidate.priority {
                existing.priority = candidate.priority;
                existing.updated_at = Utc::now();
                diff.updated.push(existing.id.clone());
            } else {
                diff.unchanged += 1;
            }
            return Ok(());
        }

        let inserted = InstructionBuilder::new()
            .text(&candidate.text)
            .priority(candidate.priority)
            .build()
            .map_err(|e| e.to_string())?;
        diff.added.push(inserted.id.clone());
        instructions.push(inserted);
        Ok(())
    }

    fn merge_fact(
        facts: &mut Vec<Fact>,
        candidate: &FactCandidate,
        diff: &mut CategoryDiff,
    ) -> std::result::Result<(), String> {
        candidate.validate().map_err(|e| e.to_string())?;

        // Idempotent: a matching fact is left untouched, timestamps included
        if facts
            .iter()
            .any(|f| f.matches(&candidate.content, &candidate.category))
        {
            diff.unchanged += 1;
            return Ok(());
        }

        // An id reference rewords an existing fact in place
        if let Some(id) = &candidate.id {
            if let Some(existing) = facts.iter_mut().find(|f| &f.id == id) {
                existing.content = candidate.content.clone();
                existing.category = candidate.category.clone();
                existing.updated_at = Utc::now();
                diff.updated.push(existing.id.clone());
                return Ok(());
            }
        }

        // Near-duplicates that differ after normalization append as new facts
        let inserted = FactBuilder::new()
            .content(&candidate.content)
            .category(&candidate.category)
            .build()
            .map_err(|e| e.to_string())?;
        diff.added.push(inserted.id.clone());
        facts.push(inserted);
        Ok(())
    }

    fn merge_todo(
        todos: &mut Vec<Todo>,
        candidate: &TodoCandidate,
        diff: &mut CategoryDiff,
    ) -> std::result::Result<(), String> {
        candidate.validate().map_err(|e| e.to_string())?;

        if let Some(id) = &candidate.id {
            let existing = todos
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| format!("todo '{id}' not found"))?;

            let mut changed = false;

            if let Some(description) = &candidate.description {
                if &existing.description != description {
                    existing.description = description.clone();
                    changed = true;
                }
            }
            if let Some(priority) = candidate.priority {
                if existing.priority != priority {
                    existing.priority = priority;
                    changed = true;
                }
            }
            if let Some(due) = candidate.due_date {
                if existing.due_date != Some(due) {
                    existing.due_date = Some(due);
                    changed = true;
                }
            }
            if let Some(tags) = &candidate.tags {
                if &existing.tags != tags {
                    existing.tags = tags.clone();
                    changed = true;
                }
            }

            match candidate.completed {
                Some(true) if !existing.completed => {
                    existing.complete();
                    changed = true;
                }
                // Monotonic: reverting completion needs the explicit flag
                Some(false) if existing.completed && candidate.reopen => {
                    existing.reopen();
                    changed = true;
                }
                _ => {}
            }

            if changed {
                existing.updated_at = Utc::now();
                diff.updated.push(existing.id.clone());
            } else {
                diff.unchanged += 1;
            }
            return Ok(());
        }

        // No id: a brand new, uncompleted todo
        let mut builder = TodoBuilder::new().description(
            candidate
                .description
                .clone()
                .unwrap_or_default(),
        );
        if let Some(priority) = candidate.priority {
            builder = builder.priority(priority);
        }
        if let Some(due) = candidate.due_date {
            builder = builder.due_date(due);
        }
        if let Some(tags) = &candidate.tags {
            builder = builder.tags(tags.iter().cloned());
        }
        let inserted = builder.build().map_err(|e| e.to_string())?;
        diff.added.push(inserted.id.clone());
        todos.push(inserted);
        Ok(())
    }
}
