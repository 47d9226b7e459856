//! Memory system — typed records, durable store, and reconciliation
//!
//! Three record categories (instructions, facts, todos) persisted as one
//! JSON file each. New information arrives as a `MemoryUpdate` candidate
//! from the extraction layer and is merged by the `Reconciler`; the caller
//! persists the merged snapshot through the `MemoryStore`.

pub mod fact;
pub mod instruction;
pub mod reconciler;
pub mod snapshot;
pub mod store;
pub mod todo;
pub mod update;

pub use fact::{Fact, FactBuilder};
pub use instruction::{Instruction, InstructionBuilder};
pub use reconciler::{CategoryDiff, ReconcileDiff, ReconcileResult, Reconciler, RejectedItem};
pub use snapshot::{MemoryCategory, MemorySnapshot};
pub use store::{CategoryGuard, MemoryStore, SnapshotGuard, TodoFilter, UpsertOutcome};
pub use todo::{Todo, TodoBuilder};
pub use update::{FactCandidate, InstructionCandidate, MemoryUpdate, TodoCandidate};
