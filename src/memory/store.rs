//! File-backed memory store
//!
//! Persists one JSON file per category under a storage directory:
//!
//! ```text
//! ~/.mnemo/memories/
//! ├── instructions.json
//! ├── facts.json
//! └── todos.json
//! ```
//!
//! Every save rewrites the whole collection atomically: the data is written
//! to a temp file in the same directory, flushed, then renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.
//!
//! Writes are transactional per category. A writer acquires a
//! [`CategoryGuard`] before loading, and every save requires that guard, so
//! a save can never commit state loaded before another writer's transaction.
//! The guard is backed by an in-process mutex plus an on-disk
//! `<category>.lock` file naming the owning process; a second writer fails
//! with `Error::ConcurrentWrite` instead of silently overwriting, and a lock
//! file left behind by a crashed owner is reclaimed.

use super::fact::Fact;
use super::instruction::{normalize, Instruction};
use super::snapshot::{MemoryCategory, MemorySnapshot};
use super::todo::Todo;
use crate::audit::{AuditEventKind, AuditLog};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Whether an upsert inserted a new record or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record's id was new
    Inserted,
    /// An existing record with the same id was replaced
    Updated,
}

/// Read-only filter for todo listings
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    /// Match only this completion state
    pub completed: Option<bool>,
    /// Match only todos due at or before this time
    pub due_before: Option<DateTime<Utc>>,
    /// Match only todos due at or after this time
    pub due_after: Option<DateTime<Utc>>,
}

/// Per-category in-process write guards
#[derive(Default)]
struct CategoryLocks {
    instructions: Arc<Mutex<()>>,
    facts: Arc<Mutex<()>>,
    todos: Arc<Mutex<()>>,
}

impl CategoryLocks {
    fn get(&self, category: MemoryCategory) -> Arc<Mutex<()>> {
        match category {
            MemoryCategory::Instructions => self.instructions.clone(),
            MemoryCategory::Facts => self.facts.clone(),
            MemoryCategory::Todos => self.todos.clone(),
        }
    }
}

/// Write guard for one category, spanning a whole load-modify-save
/// transaction. Saves require the guard, which ties them to a load that
/// happened after the guard was acquired. Dropping the guard releases the
/// in-process lock and removes the on-disk lock file.
pub struct CategoryGuard {
    category: MemoryCategory,
    lock_path: PathBuf,
    _permit: OwnedMutexGuard<()>,
}

impl CategoryGuard {
    /// The category this guard holds
    pub fn category(&self) -> MemoryCategory {
        self.category
    }
}

impl Drop for CategoryGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to release lock file {}: {}",
                    self.lock_path.display(),
                    e
                );
            }
        }
    }
}

/// Write guard over all three categories, for whole-snapshot transactions
/// (`load_snapshot`, reconcile, `save_snapshot`).
pub struct SnapshotGuard {
    instructions: CategoryGuard,
    facts: CategoryGuard,
    todos: CategoryGuard,
}

/// Durable file-backed store for all memory categories
pub struct MemoryStore {
    storage_dir: PathBuf,
    locks: CategoryLocks,
    audit: Option<Arc<AuditLog>>,
}

impl MemoryStore {
    /// Create a store rooted at the given directory, creating it as needed.
    pub async fn new(storage_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&storage_dir).await?;

        Ok(Self {
            storage_dir,
            locks: CategoryLocks::default(),
            audit: None,
        })
    }

    /// Create a store that reports its mutations to the given audit log.
    /// Audit failures are logged and never abort the mutation.
    pub async fn with_audit(storage_dir: PathBuf, audit: Arc<AuditLog>) -> Result<Self> {
        let mut store = Self::new(storage_dir).await?;
        store.audit = Some(audit);
        Ok(store)
    }

    /// Default storage directory (~/.mnemo/memories/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mnemo")
            .join("memories")
    }

    /// Path of a category's data file
    pub fn category_path(&self, category: MemoryCategory) -> PathBuf {
        self.storage_dir.join(category.file_name())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Acquire the write guard for one category. Fails with
    /// `Error::ConcurrentWrite` when another writer holds it, in-process or
    /// in another process.
    pub async fn lock_category(&self, category: MemoryCategory) -> Result<CategoryGuard> {
        let permit = self.locks.get(category).try_lock_owned().map_err(|_| {
            Error::ConcurrentWrite(format!("category '{category}' is being written"))
        })?;

        let lock_path = self.storage_dir.join(format!("{category}.lock"));
        acquire_lock_file(&lock_path).await?;

        Ok(CategoryGuard {
            category,
            lock_path,
            _permit: permit,
        })
    }

    /// Acquire write guards for all categories, in a fixed order.
    pub async fn lock_snapshot(&self) -> Result<SnapshotGuard> {
        Ok(SnapshotGuard {
            instructions: self.lock_category(MemoryCategory::Instructions).await?,
            facts: self.lock_category(MemoryCategory::Facts).await?,
            todos: self.lock_category(MemoryCategory::Todos).await?,
        })
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Load all instructions, sorted by priority descending.
    pub async fn load_instructions(&self) -> Result<Vec<Instruction>> {
        let mut items: Vec<Instruction> =
            self.load_collection(MemoryCategory::Instructions).await?;
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(items)
    }

    /// Load all facts, sorted by `updated_at` descending.
    pub async fn load_facts(&self) -> Result<Vec<Fact>> {
        let mut items: Vec<Fact> = self.load_collection(MemoryCategory::Facts).await?;
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(items)
    }

    /// Load all todos (including completed), open items first, then by
    /// priority descending, then by creation time.
    pub async fn load_todos(&self) -> Result<Vec<Todo>> {
        let mut items: Vec<Todo> = self.load_collection(MemoryCategory::Todos).await?;
        items.sort_by(|a, b| {
            (a.completed, std::cmp::Reverse(a.priority), a.created_at).cmp(&(
                b.completed,
                std::cmp::Reverse(b.priority),
                b.created_at,
            ))
        });
        Ok(items)
    }

    /// Load the full memory snapshot.
    pub async fn load_snapshot(&self) -> Result<MemorySnapshot> {
        Ok(MemorySnapshot {
            instructions: self.load_instructions().await?,
            facts: self.load_facts().await?,
            todos: self.load_todos().await?,
        })
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Atomically replace the instruction collection. The guard must have
    /// been held across the load that produced `items`.
    pub async fn save_instructions(
        &self,
        guard: &CategoryGuard,
        items: &[Instruction],
    ) -> Result<()> {
        self.save_collection(guard, MemoryCategory::Instructions, items)
            .await
    }

    /// Atomically replace the fact collection under the caller's guard.
    pub async fn save_facts(&self, guard: &CategoryGuard, items: &[Fact]) -> Result<()> {
        self.save_collection(guard, MemoryCategory::Facts, items)
            .await
    }

    /// Atomically replace the todo collection under the caller's guard.
    pub async fn save_todos(&self, guard: &CategoryGuard, items: &[Todo]) -> Result<()> {
        self.save_collection(guard, MemoryCategory::Todos, items)
            .await
    }

    /// Persist a full snapshot, one category at a time, under the caller's
    /// snapshot guard.
    pub async fn save_snapshot(
        &self,
        guard: &SnapshotGuard,
        snapshot: &MemorySnapshot,
    ) -> Result<()> {
        self.save_instructions(&guard.instructions, &snapshot.instructions)
            .await?;
        self.save_facts(&guard.facts, &snapshot.facts).await?;
        self.save_todos(&guard.todos, &snapshot.todos).await?;
        Ok(())
    }

    // =========================================================================
    // Upsert / remove / purge
    // =========================================================================

    /// Insert a new instruction or replace the one with the same id,
    /// preserving `created_at` and refreshing `updated_at`.
    pub async fn upsert_instruction(&self, record: Instruction) -> Result<UpsertOutcome> {
        let guard = self.lock_category(MemoryCategory::Instructions).await?;
        let mut items: Vec<Instruction> =
            self.load_collection(MemoryCategory::Instructions).await?;
        let outcome = upsert_by_id(&mut items, record, |r| r.id.clone(), |r, created| {
            r.created_at = created;
            r.updated_at = Utc::now();
        });
        self.save_collection(&guard, MemoryCategory::Instructions, &items)
            .await?;
        self.audit_upsert(MemoryCategory::Instructions, &items, outcome)
            .await;
        Ok(outcome)
    }

    /// Insert a new fact or replace the one with the same id.
    pub async fn upsert_fact(&self, record: Fact) -> Result<UpsertOutcome> {
        let guard = self.lock_category(MemoryCategory::Facts).await?;
        let mut items: Vec<Fact> = self.load_collection(MemoryCategory::Facts).await?;
        let outcome = upsert_by_id(&mut items, record, |r| r.id.clone(), |r, created| {
            r.created_at = created;
            r.updated_at = Utc::now();
        });
        self.save_collection(&guard, MemoryCategory::Facts, &items)
            .await?;
        self.audit_upsert(MemoryCategory::Facts, &items, outcome).await;
        Ok(outcome)
    }

    /// Insert a new todo or replace the one with the same id.
    pub async fn upsert_todo(&self, record: Todo) -> Result<UpsertOutcome> {
        let guard = self.lock_category(MemoryCategory::Todos).await?;
        let mut items: Vec<Todo> = self.load_collection(MemoryCategory::Todos).await?;
        let outcome = upsert_by_id(&mut items, record, |r| r.id.clone(), |r, created| {
            r.created_at = created;
            r.updated_at = Utc::now();
        });
        self.save_collection(&guard, MemoryCategory::Todos, &items)
            .await?;
        self.audit_upsert(MemoryCategory::Todos, &items, outcome).await;
        Ok(outcome)
    }

    /// Hard-delete a record by id. Returns whether anything was removed.
    /// Reserved for explicit external commands; the reconciler never deletes.
    pub async fn remove(&self, category: MemoryCategory, id: &str) -> Result<bool> {
        let guard = self.lock_category(category).await?;
        let removed = match category {
            MemoryCategory::Instructions => {
                let mut items: Vec<Instruction> = self.load_collection(category).await?;
                let before = items.len();
                items.retain(|r| r.id != id);
                let removed = items.len() < before;
                if removed {
                    self.save_collection(&guard, category, &items).await?;
                }
                removed
            }
            MemoryCategory::Facts => {
                let mut items: Vec<Fact> = self.load_collection(category).await?;
                let before = items.len();
                items.retain(|r| r.id != id);
                let removed = items.len() < before;
                if removed {
                    self.save_collection(&guard, category, &items).await?;
                }
                removed
            }
            MemoryCategory::Todos => {
                let mut items: Vec<Todo> = self.load_collection(category).await?;
                let before = items.len();
                items.retain(|r| r.id != id);
                let removed = items.len() < before;
                if removed {
                    self.save_collection(&guard, category, &items).await?;
                }
                removed
            }
        };

        if removed {
            self.record_audit(
                AuditEventKind::Remove,
                category,
                serde_json::json!({ "id": id }),
            )
            .await;
        }
        Ok(removed)
    }

    /// Delete all completed todos. Returns how many were purged.
    pub async fn purge_completed_todos(&self) -> Result<usize> {
        let guard = self.lock_category(MemoryCategory::Todos).await?;
        let mut items: Vec<Todo> = self.load_collection(MemoryCategory::Todos).await?;
        let before = items.len();
        items.retain(|t| !t.completed);
        let purged = before - items.len();
        if purged > 0 {
            self.save_collection(&guard, MemoryCategory::Todos, &items)
                .await?;
            self.record_audit(
                AuditEventKind::Purge,
                MemoryCategory::Todos,
                serde_json::json!({ "purged": purged }),
            )
            .await;
        }
        Ok(purged)
    }

    // =========================================================================
    // List
    // =========================================================================

    /// List instructions, optionally keeping only those at or above a
    /// minimum priority. Sorted by priority descending.
    pub async fn list_instructions(&self, min_priority: Option<u8>) -> Result<Vec<Instruction>> {
        let items = self.load_instructions().await?;
        Ok(items
            .into_iter()
            .filter(|i| min_priority.map_or(true, |min| i.priority >= min))
            .collect())
    }

    /// List facts, optionally filtered by category label
    /// (case/whitespace-insensitive).
    pub async fn list_facts(&self, category: Option<&str>) -> Result<Vec<Fact>> {
        let items = self.load_facts().await?;
        Ok(items
            .into_iter()
            .filter(|f| {
                category.map_or(true, |c| f.normalized_category() == normalize(c))
            })
            .collect())
    }

    /// List todos matching the filter.
    pub async fn list_todos(&self, filter: &TodoFilter) -> Result<Vec<Todo>> {
        let items = self.load_todos().await?;
        Ok(items
            .into_iter()
            .filter(|t| {
                if let Some(completed) = filter.completed {
                    if t.completed != completed {
                        return false;
                    }
                }
                if let Some(before) = filter.due_before {
                    match t.due_date {
                        Some(due) if due <= before => {}
                        _ => return false,
                    }
                }
                if let Some(after) = filter.due_after {
                    match t.due_date {
                        Some(due) if due >= after => {}
                        _ => return false,
                    }
                }
                true
            })
            .collect())
    }

    // =========================================================================
    // Persistence internals
    // =========================================================================

    /// Read a category file into a collection. An absent file is an empty
    /// collection; an unparseable file is `Error::CorruptStore`, surfaced to
    /// the caller instead of silently starting from empty memory.
    async fn load_collection<T: DeserializeOwned>(
        &self,
        category: MemoryCategory,
    ) -> Result<Vec<T>> {
        let path = self.category_path(category);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&data).map_err(|e| Error::CorruptStore {
            path,
            reason: e.to_string(),
        })
    }

    /// Atomically replace a category file. The guard must match the category.
    async fn save_collection<T: Serialize>(
        &self,
        guard: &CategoryGuard,
        category: MemoryCategory,
        items: &[T],
    ) -> Result<()> {
        if guard.category != category {
            return Err(Error::Validation(format!(
                "lock for category '{}' cannot save '{category}'",
                guard.category
            )));
        }

        self.write_atomic(category, items).await?;
        self.record_audit(
            AuditEventKind::Save,
            category,
            serde_json::json!({ "records": items.len() }),
        )
        .await;
        Ok(())
    }

    /// Temp-file-then-rename write. The temp file lives in the same
    /// directory so the rename stays on one filesystem and is atomic.
    async fn write_atomic<T: Serialize>(
        &self,
        category: MemoryCategory,
        items: &[T],
    ) -> Result<()> {
        let path = self.category_path(category);
        let tmp_path = self.storage_dir.join(format!("{}.tmp", category.file_name()));

        let json = serde_json::to_string_pretty(items)?;

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    // =========================================================================
    // Audit (best-effort)
    // =========================================================================

    async fn audit_upsert<T>(
        &self,
        category: MemoryCategory,
        items: &[T],
        outcome: UpsertOutcome,
    ) {
        let op = match outcome {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
        };
        self.record_audit(
            AuditEventKind::Upsert,
            category,
            serde_json::json!({ "op": op, "records": items.len() }),
        )
        .await;
    }

    async fn record_audit(
        &self,
        event: AuditEventKind,
        category: MemoryCategory,
        summary: serde_json::Value,
    ) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record_mutation(event, category, summary).await {
                tracing::warn!("Failed to write audit entry for {}: {}", category, e);
            }
        }
    }
}

/// Insert or replace a record by id. On replace, `created_at` of the
/// existing record is carried over via the `on_update` hook.
fn upsert_by_id<T, K, U>(items: &mut Vec<T>, mut record: T, key: K, on_update: U) -> UpsertOutcome
where
    K: Fn(&T) -> String,
    U: Fn(&mut T, DateTime<Utc>),
    T: HasCreatedAt,
{
    let id = key(&record);
    if let Some(existing) = items.iter_mut().find(|r| key(r) == id) {
        let created_at = existing.created_at();
        on_update(&mut record, created_at);
        *existing = record;
        UpsertOutcome::Updated
    } else {
        items.push(record);
        UpsertOutcome::Inserted
    }
}

/// Access to a record's creation timestamp, needed by upsert to preserve it.
trait HasCreatedAt {
    fn created_at(&self) -> DateTime<Utc>;
}

impl HasCreatedAt for Instruction {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl HasCreatedAt for Fact {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl HasCreatedAt for Todo {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Create the lock file exclusively, recording the owning PID. An existing
/// file means another writer holds the category, unless its owner is gone,
/// in which case the leftover lock is reclaimed once.
async fn acquire_lock_file(path: &Path) -> Result<()> {
    for _ in 0..2 {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                file.write_all(std::process::id().to_string().as_bytes())
                    .await?;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if lock_owner_is_gone(path).await {
                    tracing::warn!("Reclaiming stale lock file {}", path.display());
                    match tokio::fs::remove_file(path).await {
                        Ok(()) => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                return Err(Error::ConcurrentWrite(format!(
                    "lock file {} is held by another writer",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::ConcurrentWrite(format!(
        "lock file {} is held by another writer",
        path.display()
    )))
}

/// Whether the process that owns a lock file no longer exists. An unreadable
/// or unparseable owner is treated as live, so only locks that verifiably
/// belong to a dead process are reclaimed.
async fn lock_owner_is_gone(path: &Path) -> bool {
    let pid: u32 = match tokio::fs::read_to_string(path).await {
        Ok(content) => match content.trim().parse() {
            Ok(pid) => pid,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    if pid == std::process::id() {
        return false;
    }

    let proc_root = Path::new("/proc");
    // No process table to consult: assume the owner is alive
    if !proc_root.exists() {
        return false;
    }
    !proc_root.join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fact::FactBuilder;
    use crate::memory::instruction::InstructionBuilder;
    use crate::memory::todo::TodoBuilder;
    use tempfile::TempDir;

    async fn make_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().to_path_buf()).await.unwrap();
        (store, dir)
    }

    fn fact(content: &str, category: &str) -> Fact {
        FactBuilder::new().content(content).category(category).build().unwrap()
    }

    async fn seed_instructions(store: &MemoryStore, items: &[Instruction]) {
        let guard = store.lock_category(MemoryCategory::Instructions).await.unwrap();
        store.save_instructions(&guard, items).await.unwrap();
    }

    async fn seed_facts(store: &MemoryStore, items: &[Fact]) {
        let guard = store.lock_category(MemoryCategory::Facts).await.unwrap();
        store.save_facts(&guard, items).await.unwrap();
    }

    async fn seed_todos(store: &MemoryStore, items: &[Todo]) {
        let guard = store.lock_category(MemoryCategory::Todos).await.unwrap();
        store.save_todos(&guard, items).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_absent_file_is_empty() {
        let (store, _dir) = make_store().await;
        assert!(store.load_instructions().await.unwrap().is_empty());
        assert!(store.load_facts().await.unwrap().is_empty());
        assert!(store.load_todos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let (store, _dir) = make_store().await;

        let facts = vec![fact("Likes tea", "habits"), fact("Lives in Berlin", "personal_info")];
        seed_facts(&store, &facts).await;

        let loaded = store.load_facts().await.unwrap();
        assert_eq!(loaded.len(), 2);
        for f in &facts {
            assert!(loaded.iter().any(|l| l == f), "fact {:?} survived the round trip", f.content);
        }

        // Saving what was loaded changes nothing
        seed_facts(&store, &loaded).await;
        assert_eq!(store.load_facts().await.unwrap(), loaded);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_not_empty() {
        let (store, dir) = make_store().await;
        std::fs::write(dir.path().join("facts.json"), "{ not json").unwrap();

        let result = store.load_facts().await;
        assert!(matches!(result, Err(Error::CorruptStore { .. })));
    }

    #[tokio::test]
    async fn test_upsert_insert_then_update() {
        let (store, _dir) = make_store().await;

        let todo = TodoBuilder::new().description("Buy groceries").priority(3).build().unwrap();
        let id = todo.id.clone();
        let created_at = todo.created_at;

        let outcome = store.upsert_todo(todo.clone()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let mut changed = todo;
        changed.priority = 5;
        let outcome = store.upsert_todo(changed).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let todos = store.load_todos().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].priority, 5);
        assert_eq!(todos[0].created_at, created_at, "created_at preserved on update");
        assert!(todos[0].updated_at >= created_at);
        assert_eq!(todos[0].id, id);
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _dir) = make_store().await;

        let f = fact("Likes tea", "habits");
        let id = f.id.clone();
        store.upsert_fact(f).await.unwrap();

        assert!(store.remove(MemoryCategory::Facts, &id).await.unwrap());
        assert!(store.load_facts().await.unwrap().is_empty());

        // Removing again is a clean no-op
        assert!(!store.remove(MemoryCategory::Facts, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_completed_todos() {
        let (store, _dir) = make_store().await;

        let open = TodoBuilder::new().description("open").build().unwrap();
        let mut done = TodoBuilder::new().description("done").build().unwrap();
        done.complete();

        seed_todos(&store, &[open.clone(), done]).await;

        let purged = store.purge_completed_todos().await.unwrap();
        assert_eq!(purged, 1);

        let todos = store.load_todos().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, open.id);

        // Nothing left to purge
        assert_eq!(store.purge_completed_todos().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_instructions_min_priority() {
        let (store, _dir) = make_store().await;

        let low = InstructionBuilder::new().text("low").priority(2).build().unwrap();
        let high = InstructionBuilder::new().text("high").priority(8).build().unwrap();
        seed_instructions(&store, &[low, high]).await;

        let all = store.list_instructions(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "high", "sorted by priority descending");

        let filtered = store.list_instructions(Some(5)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text, "high");
    }

    #[tokio::test]
    async fn test_list_facts_by_category() {
        let (store, _dir) = make_store().await;

        seed_facts(&store, &[fact("a", "work"), fact("b", "habits"), fact("c", "Work")]).await;

        let work = store.list_facts(Some("work")).await.unwrap();
        assert_eq!(work.len(), 2, "category match is case-insensitive");

        let all = store.list_facts(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_todos_filters() {
        let (store, _dir) = make_store().await;

        let now = Utc::now();
        let soon = TodoBuilder::new()
            .description("due soon")
            .due_date(now + chrono::Duration::days(1))
            .build()
            .unwrap();
        let later = TodoBuilder::new()
            .description("due later")
            .due_date(now + chrono::Duration::days(30))
            .build()
            .unwrap();
        let mut done = TodoBuilder::new().description("done").build().unwrap();
        done.complete();

        seed_todos(&store, &[soon, later, done]).await;

        let open = store
            .list_todos(&TodoFilter { completed: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(open.len(), 2);

        let completed = store
            .list_todos(&TodoFilter { completed: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);

        let due_this_week = store
            .list_todos(&TodoFilter {
                completed: Some(false),
                due_before: Some(now + chrono::Duration::days(7)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(due_this_week.len(), 1);
        assert_eq!(due_this_week[0].description, "due soon");

        let due_after = store
            .list_todos(&TodoFilter {
                due_after: Some(now + chrono::Duration::days(7)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(due_after.len(), 1);
        assert_eq!(due_after[0].description, "due later");
    }

    #[tokio::test]
    async fn test_todo_sort_order() {
        let (store, _dir) = make_store().await;

        let mut done = TodoBuilder::new().description("done").priority(5).build().unwrap();
        done.complete();
        let low = TodoBuilder::new().description("low").priority(1).build().unwrap();
        let high = TodoBuilder::new().description("high").priority(5).build().unwrap();

        seed_todos(&store, &[done, low, high]).await;

        let todos = store.load_todos().await.unwrap();
        assert_eq!(todos[0].description, "high");
        assert_eq!(todos[1].description, "low");
        assert_eq!(todos[2].description, "done", "completed items sort last");
    }

    #[tokio::test]
    async fn test_stray_temp_file_does_not_shadow_snapshot() {
        // A crash between temp write and rename leaves a *.tmp behind; the
        // real category file must stay intact and fully readable.
        let (store, dir) = make_store().await;

        let facts = vec![fact("survives crash", "work")];
        seed_facts(&store, &facts).await;

        std::fs::write(dir.path().join("facts.json.tmp"), "half-writ").unwrap();

        let loaded = store.load_facts().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "survives crash");

        // The next successful save replaces the temp file cleanly
        seed_facts(&store, &loaded).await;
        assert!(!dir.path().join("facts.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_held_lock_file_fails_lock() {
        let (store, dir) = make_store().await;

        // A lock file owned by a live process (this one) blocks the category
        std::fs::write(
            dir.path().join("facts.lock"),
            std::process::id().to_string(),
        )
        .unwrap();

        let result = store.lock_category(MemoryCategory::Facts).await;
        assert!(matches!(result, Err(Error::ConcurrentWrite(_))));

        // Releasing the lock lets the next writer through
        std::fs::remove_file(dir.path().join("facts.lock")).unwrap();
        seed_facts(&store, &[fact("unblocked", "work")]).await;
    }

    #[tokio::test]
    async fn test_unreadable_lock_owner_treated_as_held() {
        let (store, dir) = make_store().await;
        std::fs::write(dir.path().join("facts.lock"), "not a pid").unwrap();

        let result = store.lock_category(MemoryCategory::Facts).await;
        assert!(matches!(result, Err(Error::ConcurrentWrite(_))));
    }

    #[tokio::test]
    async fn test_stale_lock_from_dead_owner_is_reclaimed() {
        let (store, dir) = make_store().await;

        // PID far above the kernel maximum, so the owner cannot exist
        std::fs::write(dir.path().join("todos.lock"), u32::MAX.to_string()).unwrap();

        let guard = store.lock_category(MemoryCategory::Todos).await.unwrap();
        store.save_todos(&guard, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_on_guard_drop() {
        let (store, dir) = make_store().await;

        let guard = store.lock_category(MemoryCategory::Todos).await.unwrap();
        store.save_todos(&guard, &[]).await.unwrap();
        assert!(dir.path().join("todos.lock").exists());
        drop(guard);
        assert!(!dir.path().join("todos.lock").exists());

        // The category is free again
        let guard = store.lock_category(MemoryCategory::Todos).await.unwrap();
        store.save_todos(&guard, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_category_must_match_save() {
        let (store, _dir) = make_store().await;

        let guard = store.lock_category(MemoryCategory::Facts).await.unwrap();
        let result = store.save_todos(&guard, &[]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_stale_writer_cannot_clobber_concurrent_update() {
        // Two store handles over one directory, as two processes would be.
        let dir = TempDir::new().unwrap();
        let a = MemoryStore::new(dir.path().to_path_buf()).await.unwrap();
        let b = MemoryStore::new(dir.path().to_path_buf()).await.unwrap();

        // A opens a todos transaction and loads
        let guard = a.lock_category(MemoryCategory::Todos).await.unwrap();
        let stale = a.load_todos().await.unwrap();
        assert!(stale.is_empty());

        // B cannot start its own write while A's transaction is open, so a
        // record committed behind A's back is impossible
        let blocked = b
            .upsert_todo(TodoBuilder::new().description("from b").build().unwrap())
            .await;
        assert!(matches!(blocked, Err(Error::ConcurrentWrite(_))));

        a.save_todos(&guard, &stale).await.unwrap();
        drop(guard);

        // Once A commits, B's write goes through and nothing is lost
        b.upsert_todo(TodoBuilder::new().description("from b").build().unwrap())
            .await
            .unwrap();
        assert_eq!(a.load_todos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_transaction_blocks_second_writer() {
        let dir = TempDir::new().unwrap();
        let a = MemoryStore::new(dir.path().to_path_buf()).await.unwrap();
        let b = MemoryStore::new(dir.path().to_path_buf()).await.unwrap();

        let guard = a.lock_snapshot().await.unwrap();
        let snapshot = a.load_snapshot().await.unwrap();

        assert!(matches!(
            b.lock_category(MemoryCategory::Facts).await,
            Err(Error::ConcurrentWrite(_))
        ));
        assert!(matches!(
            b.lock_snapshot().await,
            Err(Error::ConcurrentWrite(_))
        ));

        a.save_snapshot(&guard, &snapshot).await.unwrap();
        drop(guard);

        // All three categories are released together
        let guard = b.lock_snapshot().await.unwrap();
        b.save_snapshot(&guard, &snapshot).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let (store, _dir) = make_store().await;

        let snapshot = MemorySnapshot {
            instructions: vec![InstructionBuilder::new().text("be brief").priority(9).build().unwrap()],
            facts: vec![fact("Likes tea", "habits")],
            todos: vec![TodoBuilder::new().description("Buy groceries").build().unwrap()],
        };

        let guard = store.lock_snapshot().await.unwrap();
        store.save_snapshot(&guard, &snapshot).await.unwrap();
        drop(guard);

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.instructions.len(), 1);
        assert_eq!(loaded.facts.len(), 1);
        assert_eq!(loaded.todos.len(), 1);
    }

    #[tokio::test]
    async fn test_mutations_reach_audit_log() {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path(), "store-test").await.unwrap());
        let store = MemoryStore::with_audit(dir.path().join("memories"), audit.clone())
            .await
            .unwrap();

        store.upsert_fact(fact("audited", "work")).await.unwrap();

        let entries = audit.tail(10).await.unwrap();
        // One Save (from the guarded write) and one Upsert
        assert!(entries.iter().any(|e| e.event == AuditEventKind::Save));
        assert!(entries.iter().any(|e| e.event == AuditEventKind::Upsert));
        assert!(entries
            .iter()
            .all(|e| e.category == Some(MemoryCategory::Facts)));
    }
}
