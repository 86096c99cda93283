//! Host configuration read from `~/.marginalia/plugins.toml`, including the
//! administrator's extension policy.
//!
//! ```toml
//! [sandbox]
//! strict_mode = true
//!
//! [health]
//! error_threshold = 5
//!
//! [audit]
//! enabled = true
//! retention = 500
//!
//! [storage]
//! path = "~/.marginalia/plugins.db"   # or ":memory:"
//!
//! [policy]
//! mode = "allowlist"
//! extensions = ["word-count", "daily-summary"]
//! ```

use crate::audit::{AuditLog, DEFAULT_AUDIT_RETENTION};
use crate::error::PluginHostError;
use crate::health::DEFAULT_ERROR_THRESHOLD;
use marginalia_store::StoreLocation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sandbox: SandboxConfig,
    pub health: HealthConfig,
    pub audit: AuditConfig,
    pub storage: StorageConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Fail unauthorized namespace access instead of handing out stubs.
    pub strict_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive command failures before an extension is marked `error`.
    pub error_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Entries kept in memory. Zero keeps none.
    pub retention: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention: DEFAULT_AUDIT_RETENTION,
        }
    }
}

impl AuditConfig {
    pub fn build_log(&self) -> AuditLog {
        AuditLog::new(self.enabled, self.retention)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. `":memory:"` keeps everything in process. A leading
    /// `~/` expands to the home directory.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.marginalia/plugins.db".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn location(&self) -> StoreLocation {
        match self.path.strip_prefix("~/") {
            Some(rest) => StoreLocation::Sqlite(home_dir().join(rest)),
            None => StoreLocation::from_config_path(&self.path),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Only listed extensions may load.
    Allowlist,
    /// Every extension except the listed ones may load.
    Denylist,
    #[default]
    Unrestricted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    pub extensions: Vec<String>,
}

impl HostConfig {
    /// Loads `~/.marginalia/plugins.toml` if it exists.
    /// Falls back to defaults with a warning on read or parse errors.
    pub fn load() -> Self {
        Self::load_from(config_dir().join("plugins.toml"))
    }

    /// Loads from an explicit path with the same fallback rules.
    pub fn load_from(path: PathBuf) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No plugin host config found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded plugin host config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse plugin host config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read plugin host config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, PluginHostError> {
        toml::from_str(contents).map_err(|e| PluginHostError::Config(e.to_string()))
    }

    /// Defaults with in-memory storage (for testing).
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                path: ":memory:".to_string(),
            },
            ..Self::default()
        }
    }
}

/// Enforces the administrator's extension allow/deny list.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn is_extension_allowed(&self, extension_id: &str) -> bool {
        let listed = self.config.extensions.iter().any(|id| id == extension_id);
        match self.config.mode {
            PolicyMode::Unrestricted => true,
            PolicyMode::Allowlist => listed,
            PolicyMode::Denylist => !listed,
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.config.mode
    }
}

fn home_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
    } else if let Ok(home) = std::env::var("USERPROFILE") {
        PathBuf::from(home)
    } else {
        PathBuf::from(".")
    }
}

/// The Marginalia config directory.
fn config_dir() -> PathBuf {
    home_dir().join(".marginalia")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = HostConfig::default();
        assert!(!config.sandbox.strict_mode);
        assert_eq!(config.health.error_threshold, 3);
        assert!(config.audit.enabled);
        assert_eq!(config.audit.retention, 1000);
        assert_eq!(config.policy.mode, PolicyMode::Unrestricted);
    }

    #[test]
    fn parse_full_file() {
        let config = HostConfig::from_toml_str(
            r#"
[sandbox]
strict_mode = true

[health]
error_threshold = 5

[audit]
retention = 10

[storage]
path = ":memory:"

[policy]
mode = "allowlist"
extensions = ["word-count"]
"#,
        )
        .unwrap();

        assert!(config.sandbox.strict_mode);
        assert_eq!(config.health.error_threshold, 5);
        assert!(config.audit.enabled);
        assert_eq!(config.audit.retention, 10);
        assert!(matches!(config.storage.location(), StoreLocation::Memory));
        assert_eq!(config.policy.extensions, vec!["word-count"]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = HostConfig::from_toml_str("[sandbox]\nstrict_mode = true\n").unwrap();
        assert!(config.sandbox.strict_mode);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn bad_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.toml");
        std::fs::write(&path, "[sandbox\nstrict_mode = ").unwrap();
        assert_eq!(HostConfig::load_from(path), HostConfig::default());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            HostConfig::load_from(dir.path().join("absent.toml")),
            HostConfig::default()
        );
    }

    #[test]
    fn tilde_path_expands() {
        let storage = StorageConfig::default();
        match storage.location() {
            StoreLocation::Sqlite(path) => assert!(path.ends_with(".marginalia/plugins.db")),
            other => panic!("unexpected location {other:?}"),
        }
    }

    // ================================================================
    // PolicyEngine
    // ================================================================

    #[test]
    fn unrestricted_allows_all() {
        assert!(PolicyEngine::unrestricted().is_extension_allowed("anything"));
    }

    #[test]
    fn allowlist_mode() {
        let engine = PolicyEngine::new(PolicyConfig {
            mode: PolicyMode::Allowlist,
            extensions: vec!["word-count".into()],
        });
        assert!(engine.is_extension_allowed("word-count"));
        assert!(!engine.is_extension_allowed("evil"));
    }

    #[test]
    fn denylist_mode() {
        let engine = PolicyEngine::new(PolicyConfig {
            mode: PolicyMode::Denylist,
            extensions: vec!["evil".into()],
        });
        assert!(engine.is_extension_allowed("word-count"));
        assert!(!engine.is_extension_allowed("evil"));
    }
}
