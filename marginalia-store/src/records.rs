//! Record shapes persisted in each collection.

use marginalia_types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current on-disk schema version for settings records.
pub const SCHEMA_VERSION: u32 = 2;

/// Settings of one extension: flat key -> JSON value.
pub type SettingsMap = serde_json::Map<String, Value>;

/// One settings record per extension. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    pub extension_id: String,
    pub settings: SettingsMap,
    pub updated_at: Timestamp,
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
}

fn legacy_schema_version() -> u32 {
    1
}

/// One credential per provider, shared by every extension.
/// `value` holds the obfuscated form, never the plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub provider: String,
    pub value: String,
    pub stored_at: Timestamp,
}

/// A cached JSON value with optional expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl CacheEntry {
    /// True if the entry has an expiry that `now` has reached.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at.has_passed(now))
    }
}

/// The pre-collections configuration blob: every extension's settings and
/// every provider key in one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyConfig {
    #[serde(default, alias = "settingsById", alias = "pluginSettings")]
    pub settings: BTreeMap<String, SettingsMap>,
    #[serde(default, rename = "apiKeys", alias = "apiKeysByProvider")]
    pub api_keys: BTreeMap<String, String>,
}

/// Outcome of the one-time legacy migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// A legacy blob was found (and has now been removed).
    pub found_legacy: bool,
    pub settings_migrated: usize,
    pub secrets_migrated: usize,
    /// Entries skipped because a structured record already existed.
    pub skipped_existing: usize,
    /// The blob was unreadable and was moved aside instead of migrated.
    pub unreadable: bool,
}
