//! Persistent storage for Marginalia extensions.
//!
//! The store keeps four collections behind a [`StorageBackend`]:
//! - **settings**: one record per extension id
//! - **secrets**: provider credentials, obfuscated at rest
//! - **cache**: JSON values with optional expiry
//! - **meta**: the loaded-set snapshot and migration bookkeeping
//!
//! [`PluginStore`] is the async API over a backend. [`SharedStore`] opens it
//! once per process and runs the legacy configuration migration on first use.

mod backend;
mod error;
mod obfuscate;
mod records;
mod shared;
mod sqlite;
mod store;

pub use backend::{Collection, MemoryBackend, StorageBackend, UnavailableBackend};
pub use error::{StoreError, StoreResult};
pub use obfuscate::{deobfuscate, obfuscate, OBFUSCATION_PREFIX};
pub use records::{
    CacheEntry, LegacyConfig, MigrationReport, SecretRecord, SettingsMap, SettingsRecord,
    SCHEMA_VERSION,
};
pub use shared::{SharedStore, StoreLocation};
pub use sqlite::SqliteBackend;
pub use store::{
    PluginStore, LEGACY_BACKUP_KEY, LEGACY_CONFIG_KEY, LOADED_SET_KEY, SCHEMA_VERSION_KEY,
};
