//! Mnemo — local multi-category memory store for personal AI assistants
//!
//! Mnemo gives a conversational agent durable, file-backed memory split into
//! three categories: system instructions, facts about the user, and todos.
//! An external structured-extraction step turns dialogue into a candidate
//! `MemoryUpdate`; mnemo reconciles it against the current state, persists
//! the result atomically, and records every mutation in a session audit log.
//!
//! ## Architecture
//!
//! ```text
//! conversation turn
//!        │
//!        ▼
//! external extraction ──► MemoryUpdate (candidate)
//!                               │
//!                               ▼
//!                     ┌──────────────────┐
//!        snapshot ───►│    Reconciler    │──► merged snapshot + diff
//!           ▲         └──────────────────┘         │
//!           │                                      ▼
//!    ┌──────────────┐                      ┌──────────────┐
//!    │ MemoryStore  │◄─── save_snapshot ───│    caller    │
//!    │ (JSON files) │                      └──────┬───────┘
//!    └──────────────┘                             ▼
//!                                          ┌──────────────┐
//!                                          │  AuditLog    │
//!                                          │ (JSONL file) │
//!                                          └──────────────┘
//! ```
//!
//! The reconciler is pure: it never touches disk. The store owns the on-disk
//! snapshot exclusively, writes it atomically (temp file + rename) under a
//! per-category single-writer lock, and reports mutations to the audit log
//! on a best-effort basis.
//!
//! ## Modules
//!
//! - [`memory`]: record types, snapshot, store, and reconciler
//! - [`audit`]: session-scoped append-only audit log
//! - [`config`]: configuration management
//! - [`error`]: crate error type

pub mod audit;
pub mod config;
pub mod error;
pub mod memory;

pub use audit::AuditLog;
pub use config::MnemoConfig;
pub use error::{Error, Result};
pub use memory::{MemorySnapshot, MemoryStore, MemoryUpdate, Reconciler};
