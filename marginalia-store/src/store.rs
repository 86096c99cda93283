//! The plugin store: settings, secrets, cache and the loaded-set snapshot.
//!
//! Reads never fail upward. A backend or decode error on a read is logged and
//! reported as "absent" so the plugin runtime keeps working when storage is
//! unavailable. Explicit writes return a [`StoreResult`] the caller may
//! surface or ignore.

use crate::backend::{Collection, StorageBackend};
use crate::error::{StoreError, StoreResult};
use crate::obfuscate::{deobfuscate, obfuscate};
use crate::records::{
    CacheEntry, LegacyConfig, MigrationReport, SecretRecord, SettingsMap, SettingsRecord,
    SCHEMA_VERSION,
};
use marginalia_types::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Meta key holding the ordered list of loaded extension ids.
pub const LOADED_SET_KEY: &str = "loaded-set";
/// Meta key of the pre-collections configuration blob.
pub const LEGACY_CONFIG_KEY: &str = "legacy-config";
/// Meta key an unreadable legacy blob is moved to.
pub const LEGACY_BACKUP_KEY: &str = "legacy-config.bak";
/// Meta key recording the schema version the store was migrated to.
pub const SCHEMA_VERSION_KEY: &str = "schema-version";

/// Async facade over a [`StorageBackend`].
#[derive(Clone)]
pub struct PluginStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for PluginStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl PluginStore {
    /// Wraps a backend. Does not run migrations; see [`crate::SharedStore`].
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh [`crate::MemoryBackend`] (for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::MemoryBackend::new()))
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageBackend) -> StoreResult<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
    }

    async fn read<T>(&self, collection: Collection, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        let raw = self.run(move |b| b.get(collection, &key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write<T>(&self, collection: Collection, key: &str, record: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        let raw = serde_json::to_string(record)?;
        let key = key.to_string();
        self.run(move |b| b.put(collection, &key, &raw)).await
    }

    async fn remove(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.run(move |b| b.delete(collection, &key)).await
    }

    async fn entries(&self, collection: Collection) -> StoreResult<Vec<(String, String)>> {
        self.run(move |b| b.list(collection)).await
    }

    // ── Settings ─────────────────────────────────────────────────

    /// Writes the full settings map of an extension.
    pub async fn save_settings(
        &self,
        extension_id: &str,
        settings: &SettingsMap,
    ) -> StoreResult<SettingsRecord> {
        let record = SettingsRecord {
            extension_id: extension_id.to_string(),
            settings: settings.clone(),
            updated_at: Timestamp::now(),
            schema_version: SCHEMA_VERSION,
        };
        self.write(Collection::Settings, extension_id, &record).await?;
        debug!(extension_id = %extension_id, keys = settings.len(), "Saved extension settings");
        Ok(record)
    }

    /// Returns the full settings record of an extension, if readable.
    pub async fn load_settings_record(&self, extension_id: &str) -> Option<SettingsRecord> {
        match self.read(Collection::Settings, extension_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(extension_id = %extension_id, error = %e, "Failed to read extension settings");
                None
            }
        }
    }

    /// Returns the settings map of an extension, if present and readable.
    pub async fn load_settings(&self, extension_id: &str) -> Option<SettingsMap> {
        self.load_settings_record(extension_id)
            .await
            .map(|r| r.settings)
    }

    pub async fn delete_settings(&self, extension_id: &str) -> StoreResult<bool> {
        self.remove(Collection::Settings, extension_id).await
    }

    /// Returns every readable settings map keyed by extension id.
    /// Unreadable records are skipped with a warning.
    pub async fn list_settings(&self) -> BTreeMap<String, SettingsMap> {
        let rows = match self.entries(Collection::Settings).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to list extension settings");
                return BTreeMap::new();
            }
        };

        rows.into_iter()
            .filter_map(|(id, raw)| match serde_json::from_str::<SettingsRecord>(&raw) {
                Ok(record) => Some((id, record.settings)),
                Err(e) => {
                    warn!(extension_id = %id, error = %e, "Skipping unreadable settings record");
                    None
                }
            })
            .collect()
    }

    // ── Secrets ──────────────────────────────────────────────────

    /// Stores a provider credential. The value is obfuscated, not encrypted.
    pub async fn save_secret(&self, provider: &str, raw_value: &str) -> StoreResult<()> {
        let record = SecretRecord {
            provider: provider.to_string(),
            value: obfuscate(raw_value),
            stored_at: Timestamp::now(),
        };
        self.write(Collection::Secrets, provider, &record).await?;
        info!(provider = %provider, "Stored provider secret");
        Ok(())
    }

    /// Returns the plaintext credential of a provider.
    /// Any read or decode failure yields `None` and a warning.
    pub async fn load_secret(&self, provider: &str) -> Option<String> {
        let record: SecretRecord = match self.read(Collection::Secrets, provider).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Failed to read provider secret");
                return None;
            }
        };

        match deobfuscate(&record.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(provider = %provider, error = %e, "Failed to decode provider secret");
                None
            }
        }
    }

    pub async fn delete_secret(&self, provider: &str) -> StoreResult<bool> {
        self.remove(Collection::Secrets, provider).await
    }

    /// Provider names with a stored secret. Never returns values.
    pub async fn list_providers(&self) -> Vec<String> {
        match self.entries(Collection::Secrets).await {
            Ok(rows) => rows.into_iter().map(|(provider, _)| provider).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list secret providers");
                Vec::new()
            }
        }
    }

    // ── Cache ────────────────────────────────────────────────────

    /// Caches a value, optionally expiring after `ttl`.
    pub async fn cache_put(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        let now = Timestamp::now();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl)),
        };
        self.write(Collection::Cache, key, &entry).await
    }

    /// Returns a cached value. Missing and expired entries both read as
    /// `None`; an expired entry is deleted as part of the read unless a newer
    /// write replaced it in the meantime.
    pub async fn cache_get(&self, key: &str) -> Option<Value> {
        let owned = key.to_string();
        let raw = match self.run(move |b| b.get(Collection::Cache, &owned)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cache entry");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to decode cache entry");
                return None;
            }
        };

        if entry.is_expired(Timestamp::now()) {
            let owned = key.to_string();
            if let Err(e) = self
                .run(move |b| b.delete_if(Collection::Cache, &owned, &raw))
                .await
            {
                warn!(key = %key, error = %e, "Failed to evict expired cache entry");
            }
            return None;
        }
        Some(entry.value)
    }

    /// Deletes every expired cache entry. Returns how many were removed.
    /// Unreadable entries are removed too. Entries rewritten after the scan
    /// are kept.
    pub async fn sweep_expired(&self) -> StoreResult<usize> {
        let now = Timestamp::now();
        let rows = self.entries(Collection::Cache).await?;

        let stale: Vec<(String, String)> = rows
            .into_iter()
            .filter(|(_, raw)| {
                serde_json::from_str::<CacheEntry>(raw)
                    .map(|entry| entry.is_expired(now))
                    .unwrap_or(true)
            })
            .collect();

        let removed = self
            .run(move |b| {
                let mut removed = 0;
                for (key, raw) in &stale {
                    if b.delete_if(Collection::Cache, key, raw)? {
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .await?;

        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        Ok(removed)
    }

    /// Removes every cache entry. Returns how many were removed.
    pub async fn cache_clear(&self) -> StoreResult<usize> {
        self.run(|b| b.clear(Collection::Cache)).await
    }

    // ── Loaded-set snapshot ──────────────────────────────────────

    /// Replaces the persisted ordered list of loaded extension ids.
    pub async fn save_loaded_set(&self, ids: &[String]) -> StoreResult<()> {
        self.write(Collection::Meta, LOADED_SET_KEY, &ids).await
    }

    /// Returns the persisted loaded-set, or an empty list if absent/unreadable.
    pub async fn load_loaded_set(&self) -> Vec<String> {
        match self.read::<Vec<String>>(Collection::Meta, LOADED_SET_KEY).await {
            Ok(ids) => ids.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted loaded-set");
                Vec::new()
            }
        }
    }

    // ── Legacy migration ─────────────────────────────────────────

    /// Stores a legacy configuration blob (used by tests and by hosts
    /// importing an old profile before first initialization).
    pub async fn put_legacy_config(&self, legacy: &LegacyConfig) -> StoreResult<()> {
        self.write(Collection::Meta, LEGACY_CONFIG_KEY, legacy).await
    }

    /// Moves a legacy blob, if present, into the structured collections and
    /// deletes it. Existing structured records win over legacy values.
    pub async fn migrate_legacy(&self) -> StoreResult<MigrationReport> {
        let mut report = MigrationReport::default();

        let raw = self
            .run(|b| b.get(Collection::Meta, LEGACY_CONFIG_KEY))
            .await?;
        let Some(raw) = raw else {
            return Ok(report);
        };
        report.found_legacy = true;

        let legacy: LegacyConfig = match serde_json::from_str(&raw) {
            Ok(legacy) => legacy,
            Err(e) => {
                warn!(error = %e, "Legacy plugin configuration is unreadable, moving it aside");
                self.run(move |b| {
                    b.put(Collection::Meta, LEGACY_BACKUP_KEY, &raw)?;
                    b.delete(Collection::Meta, LEGACY_CONFIG_KEY)
                })
                .await?;
                report.unreadable = true;
                return Ok(report);
            }
        };

        for (extension_id, settings) in &legacy.settings {
            let exists = self
                .run({
                    let id = extension_id.clone();
                    move |b| b.get(Collection::Settings, &id)
                })
                .await?
                .is_some();
            if exists {
                report.skipped_existing += 1;
                continue;
            }
            self.save_settings(extension_id, settings).await?;
            report.settings_migrated += 1;
        }

        for (provider, value) in &legacy.api_keys {
            let exists = self
                .run({
                    let provider = provider.clone();
                    move |b| b.get(Collection::Secrets, &provider)
                })
                .await?
                .is_some();
            if exists {
                report.skipped_existing += 1;
                continue;
            }
            self.save_secret(provider, value).await?;
            report.secrets_migrated += 1;
        }

        self.remove(Collection::Meta, LEGACY_CONFIG_KEY).await?;
        self.write(Collection::Meta, SCHEMA_VERSION_KEY, &SCHEMA_VERSION)
            .await?;

        info!(
            settings = report.settings_migrated,
            secrets = report.secrets_migrated,
            skipped = report.skipped_existing,
            "Migrated legacy plugin configuration"
        );
        Ok(report)
    }

    /// Schema version recorded by the last migration, if any.
    pub async fn schema_version(&self) -> Option<u32> {
        self.read(Collection::Meta, SCHEMA_VERSION_KEY)
            .await
            .ok()
            .flatten()
    }
}
