//! Mnemo - local memory store for personal AI assistants
//!
//! Command-line surface over the memory store: apply extraction candidates,
//! inspect and manage records, and review the session audit log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mnemo::{
    audit::AuditLog,
    config::MnemoConfig,
    memory::{MemoryCategory, MemoryStore, MemoryUpdate, Reconciler, TodoFilter},
    Error,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Local multi-category memory store for personal AI assistants")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MNEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a candidate update file (JSON) to the memory store
    Apply {
        /// Path to the MemoryUpdate JSON file
        file: PathBuf,
    },

    /// List todos
    Todos {
        /// Include completed todos
        #[arg(long)]
        all: bool,
    },

    /// List facts
    Facts {
        /// Filter by category label
        #[arg(short = 'g', long)]
        category: Option<String>,
    },

    /// List instructions
    Instructions {
        /// Only show instructions at or above this priority
        #[arg(long)]
        min_priority: Option<u8>,
    },

    /// Mark a todo complete
    Complete {
        /// Todo id
        id: String,
    },

    /// Remove a record by id
    Remove {
        /// Category: instructions, facts or todos
        #[arg(value_parser = parse_category)]
        category: MemoryCategory,

        /// Record id
        id: String,
    },

    /// Delete all completed todos
    Purge,

    /// Render the memory context block injected into the agent prompt
    Context,

    /// Show the last entries of a session audit log
    Audit {
        /// Session identifier (file name suffix of session_<id>.jsonl)
        session: String,

        /// Number of entries to show
        #[arg(short, default_value = "10")]
        n: usize,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

fn parse_category(s: &str) -> std::result::Result<MemoryCategory, String> {
    match s.to_lowercase().as_str() {
        "instructions" => Ok(MemoryCategory::Instructions),
        "facts" => Ok(MemoryCategory::Facts),
        "todos" => Ok(MemoryCategory::Todos),
        other => Err(format!("unknown category '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mnemo={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading config {}", config_path.display()))?;
        toml::from_str(&content)?
    } else {
        MnemoConfig::default()
    };

    match cli.command {
        Commands::Apply { file } => apply_update(&config, &file).await?,
        Commands::Todos { all } => list_todos(&config, all).await?,
        Commands::Facts { category } => list_facts(&config, category.as_deref()).await?,
        Commands::Instructions { min_priority } => {
            list_instructions(&config, min_priority).await?
        }
        Commands::Complete { id } => complete_todo(&config, &id).await?,
        Commands::Remove { category, id } => remove_record(&config, category, &id).await?,
        Commands::Purge => purge_todos(&config).await?,
        Commands::Context => render_context(&config).await?,
        Commands::Audit { session, n } => tail_audit(&config, &session, n).await?,
        Commands::Config { default } => show_config(&config, default)?,
    }

    Ok(())
}

/// Open the store for a mutating command, attaching a fresh session audit
/// log when enabled.
async fn open_store(config: &MnemoConfig) -> Result<(MemoryStore, Option<Arc<AuditLog>>)> {
    let memory_dir = config.storage.memory_dir.clone();
    if config.audit.enabled {
        let session_id = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let audit = Arc::new(AuditLog::open(&config.audit.log_dir, &session_id).await?);
        tracing::debug!("Audit log: {}", audit.path().display());
        let store = MemoryStore::with_audit(memory_dir, audit.clone()).await?;
        Ok((store, Some(audit)))
    } else {
        Ok((MemoryStore::new(memory_dir).await?, None))
    }
}

/// Open the store for a read-only command; no audit session is started.
async fn open_store_readonly(config: &MnemoConfig) -> Result<MemoryStore> {
    Ok(MemoryStore::new(config.storage.memory_dir.clone()).await?)
}

/// Reconcile a candidate update file against the store and persist the result.
async fn apply_update(config: &MnemoConfig, file: &PathBuf) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("reading update file {}", file.display()))?;
    let update: MemoryUpdate =
        serde_json::from_str(&data).context("update file is not a valid MemoryUpdate")?;

    if update.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }

    let (store, audit) = open_store(config).await?;

    // Hold the write guard across load, merge and save so a concurrent
    // writer cannot slip a commit between them; retry once if the guard is
    // currently held
    let guard = match store.lock_snapshot().await {
        Ok(guard) => guard,
        Err(Error::ConcurrentWrite(reason)) => {
            tracing::warn!("Concurrent write detected, retrying: {reason}");
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            store.lock_snapshot().await?
        }
        Err(other) => return Err(other.into()),
    };

    let snapshot = store.load_snapshot().await?;
    let result = Reconciler::reconcile(&snapshot, &update);
    store.save_snapshot(&guard, &result.merged).await?;
    drop(guard);

    if let Some(audit) = &audit {
        let summary = serde_json::json!({
            "diff": result.diff,
            "rejected": result.rejected.len(),
            "reasoning": update.reasoning,
        });
        if let Err(e) = audit.record_reconciliation(summary).await {
            tracing::warn!("Failed to record reconciliation in audit log: {e}");
        }
    }

    let added = result.diff.instructions.added.len()
        + result.diff.facts.added.len()
        + result.diff.todos.added.len();
    let updated = result.diff.instructions.updated.len()
        + result.diff.facts.updated.len()
        + result.diff.todos.updated.len();
    println!("Applied: {added} added, {updated} updated.");

    for rejected in &result.rejected {
        println!(
            "Rejected [{}] {}: {}",
            rejected.category, rejected.item, rejected.reason
        );
    }

    Ok(())
}

async fn list_todos(config: &MnemoConfig, all: bool) -> Result<()> {
    let store = open_store_readonly(config).await?;
    let filter = TodoFilter {
        completed: if all { None } else { Some(false) },
        ..Default::default()
    };
    let todos = store.list_todos(&filter).await?;

    if todos.is_empty() {
        println!("No todos.");
        return Ok(());
    }
    for todo in todos {
        let status = if todo.completed { "x" } else { "o" };
        let due = todo
            .due_date
            .map(|d| format!(" (due {})", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!("{} [P{}] {} {}{}", status, todo.priority, todo.id, todo.description, due);
    }
    Ok(())
}

async fn list_facts(config: &MnemoConfig, category: Option<&str>) -> Result<()> {
    let store = open_store_readonly(config).await?;
    let facts = store.list_facts(category).await?;

    if facts.is_empty() {
        println!("No facts.");
        return Ok(());
    }
    for fact in facts {
        println!("[{}] {} {}", fact.category, fact.id, fact.content);
    }
    Ok(())
}

async fn list_instructions(config: &MnemoConfig, min_priority: Option<u8>) -> Result<()> {
    let store = open_store_readonly(config).await?;
    let instructions = store.list_instructions(min_priority).await?;

    if instructions.is_empty() {
        println!("No instructions.");
        return Ok(());
    }
    for inst in instructions {
        println!("[Priority {}] {} {}", inst.priority, inst.id, inst.text);
    }
    Ok(())
}

async fn complete_todo(config: &MnemoConfig, id: &str) -> Result<()> {
    let (store, _) = open_store(config).await?;
    let todos = store.load_todos().await?;

    let mut todo = todos
        .into_iter()
        .find(|t| t.id == id)
        .with_context(|| format!("todo '{id}' not found"))?;

    if todo.completed {
        println!("Todo '{id}' is already complete.");
        return Ok(());
    }

    todo.complete();
    store.upsert_todo(todo).await?;
    println!("Completed todo '{id}'.");
    Ok(())
}

async fn remove_record(config: &MnemoConfig, category: MemoryCategory, id: &str) -> Result<()> {
    let (store, _) = open_store(config).await?;
    if store.remove(category, id).await? {
        println!("Removed {category} record '{id}'.");
    } else {
        println!("No {category} record with id '{id}'.");
    }
    Ok(())
}

async fn purge_todos(config: &MnemoConfig) -> Result<()> {
    let (store, _) = open_store(config).await?;
    let purged = store.purge_completed_todos().await?;
    println!("Purged {purged} completed todo(s).");
    Ok(())
}

async fn render_context(config: &MnemoConfig) -> Result<()> {
    let store = open_store_readonly(config).await?;
    let snapshot = store.load_snapshot().await?;
    println!("{}", snapshot.render_context());
    Ok(())
}

async fn tail_audit(config: &MnemoConfig, session: &str, n: usize) -> Result<()> {
    let log = AuditLog::open_existing(&config.audit.log_dir, session)
        .await
        .with_context(|| format!("no audit log for session '{session}'"))?;
    let entries = log.tail(n).await?;

    if entries.is_empty() {
        println!("No audit entries for session '{session}'.");
        return Ok(());
    }
    for entry in entries {
        let category = entry
            .category
            .map(|c| format!(" [{c}]"))
            .unwrap_or_default();
        println!(
            "{} {:?}{} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.event,
            category,
            entry.summary
        );
    }
    Ok(())
}

fn show_config(config: &MnemoConfig, default: bool) -> Result<()> {
    let shown = if default {
        MnemoConfig::default()
    } else {
        config.clone()
    };
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
