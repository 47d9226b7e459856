//! Audit log — append-only record of store mutations and reconciliation
//! decisions, one JSONL file per session. Diagnostics only; never used for
//! replay or recovery.

pub mod log;

pub use log::{AuditEntry, AuditEventKind, AuditLog};
