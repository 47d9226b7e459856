//! Mnemo configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main mnemo configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MnemoConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the per-category memory files
    pub memory_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_dir: base_dir().join("memories"),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable the session audit log
    pub enabled: bool,

    /// Directory holding per-session JSONL log files
    pub log_dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: base_dir().join("logs"),
        }
    }
}

/// Base directory for all mnemo state (~/.mnemo/)
fn base_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemo")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MnemoConfig::default();
        assert!(config.audit.enabled);
        assert!(config.storage.memory_dir.ends_with("memories"));
        assert!(config.audit.log_dir.ends_with("logs"));
    }

    #[test]
    fn test_partial_toml() {
        let config: MnemoConfig = toml::from_str(
            r#"
            [storage]
            memory_dir = "/tmp/mnemo-test/memories"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.storage.memory_dir,
            PathBuf::from("/tmp/mnemo-test/memories")
        );
        assert!(config.audit.enabled, "audit section defaults when omitted");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MnemoConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let back: MnemoConfig = toml::from_str(&toml).unwrap();
        assert_eq!(back.storage.memory_dir, config.storage.memory_dir);
        assert_eq!(back.audit.enabled, config.audit.enabled);
    }
}
