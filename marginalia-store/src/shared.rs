//! Once-per-process store initialization.

use crate::backend::{MemoryBackend, StorageBackend};
use crate::error::StoreResult;
use crate::records::MigrationReport;
use crate::sqlite::SqliteBackend;
use crate::store::PluginStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Where the shared store keeps its data.
#[derive(Clone)]
pub enum StoreLocation {
    /// Volatile in-process storage.
    Memory,
    /// A SQLite database file.
    Sqlite(PathBuf),
    /// A caller-supplied backend.
    Custom(Arc<dyn StorageBackend>),
}

impl std::fmt::Debug for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Sqlite(path) => f.debug_tuple("Sqlite").field(path).finish(),
            Self::Custom(backend) => f.debug_tuple("Custom").field(&backend.name()).finish(),
        }
    }
}

impl StoreLocation {
    /// Parses a configured path. `":memory:"` selects [`StoreLocation::Memory`].
    pub fn from_config_path(path: &str) -> Self {
        if path == ":memory:" {
            Self::Memory
        } else {
            Self::Sqlite(PathBuf::from(path))
        }
    }

    fn open(&self) -> StoreResult<Arc<dyn StorageBackend>> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryBackend::new()),
            Self::Sqlite(path) => Arc::new(SqliteBackend::open(path)?),
            Self::Custom(backend) => Arc::clone(backend),
        })
    }
}

/// Lazily opened store shared by everything that holds a clone of the handle.
///
/// The first [`SharedStore::get_or_init`] opens the backend and runs the
/// legacy migration; concurrent first callers wait on the same
/// initialization and later callers get the same `Arc` back without any
/// setup work.
#[derive(Debug, Clone)]
pub struct SharedStore {
    location: StoreLocation,
    cell: Arc<OnceCell<Arc<PluginStore>>>,
}

impl SharedStore {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Returns the store, initializing it on first use.
    ///
    /// A failed initialization leaves the cell empty so a later call can
    /// retry.
    pub async fn get_or_init(&self) -> StoreResult<Arc<PluginStore>> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                let backend = self.location.open()?;
                let store = PluginStore::new(backend);
                let report = store.migrate_legacy().await?;
                log_migration(&report);
                info!(backend = store.backend().name(), "Plugin store initialized");
                Ok::<_, crate::StoreError>(Arc::new(store))
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Returns the store if it has already been initialized.
    pub fn get(&self) -> Option<Arc<PluginStore>> {
        self.cell.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }
}

fn log_migration(report: &MigrationReport) {
    if report.unreadable {
        warn!("Legacy plugin configuration could not be read and was set aside");
    }
}
