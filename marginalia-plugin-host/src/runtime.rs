//! Process-level entry point: opens the store, builds the manager and
//! restores what was active last time.
//!
//! The host application constructs one [`PluginRuntime`] and passes it (or
//! its manager) to whatever needs it. Nothing here is global.

use crate::config::HostConfig;
use crate::error::PluginHostError;
use crate::manager::{ExtensionManager, RestoreReport};
use crate::registry::ManifestRegistry;
use crate::surface::HostServices;
use marginalia_store::{PluginStore, SharedStore};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct PluginRuntime {
    config: HostConfig,
    store: SharedStore,
    registry: ManifestRegistry,
    manager: Arc<ExtensionManager>,
    restored: RestoreReport,
}

impl PluginRuntime {
    /// Opens the store at `config.storage`, then restores the persisted
    /// loaded-set from `registry`.
    pub async fn init(
        config: HostConfig,
        services: HostServices,
        registry: ManifestRegistry,
    ) -> Result<Self, PluginHostError> {
        let store = SharedStore::new(config.storage.location());
        Self::init_with_store(config, services, registry, store).await
    }

    /// Same as [`init`](Self::init) with an already constructed store
    /// handle. A store that fails to open leaves the runtime running without
    /// persistence.
    pub async fn init_with_store(
        config: HostConfig,
        services: HostServices,
        registry: ManifestRegistry,
        store: SharedStore,
    ) -> Result<Self, PluginHostError> {
        for issue in registry.validate() {
            warn!(extension_id = %issue.extension_id, "{}", issue.message);
        }

        let opened = match store.get_or_init().await {
            Ok(opened) => Some(opened),
            Err(e) => {
                warn!(error = %e, "Plugin store unavailable, running without persistence");
                None
            }
        };

        let manager = Arc::new(ExtensionManager::new(services, opened, &config));
        let restored = manager.restore(&registry).await;
        info!(
            registered = registry.len(),
            active = manager.extension_count().await,
            "Plugin runtime initialized"
        );

        Ok(Self {
            config,
            store,
            registry,
            manager,
            restored,
        })
    }

    pub fn manager(&self) -> &Arc<ExtensionManager> {
        &self.manager
    }

    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// What [`init`](Self::init) restored.
    pub fn restore_report(&self) -> &RestoreReport {
        &self.restored
    }

    pub fn store(&self) -> Option<Arc<PluginStore>> {
        self.store.get()
    }

    /// Loads a registered extension by id.
    pub async fn enable(&self, extension_id: &str) -> Result<(), PluginHostError> {
        let package = self
            .registry
            .get(extension_id)
            .cloned()
            .ok_or_else(|| PluginHostError::NotFound(extension_id.to_string()))?;
        self.manager.load(package).await
    }

    /// Unloads an extension; it stays out of the loaded-set on next start.
    pub async fn disable(&self, extension_id: &str) -> Result<(), PluginHostError> {
        self.manager.unload(extension_id).await
    }

    /// Deletes expired cache entries. Returns how many were removed.
    pub async fn sweep_cache(&self) -> Result<usize, PluginHostError> {
        match self.store.get() {
            Some(store) => Ok(store.sweep_expired().await?),
            None => Ok(0),
        }
    }

    /// Unloads every extension without changing the persisted loaded-set,
    /// then writes any snapshot still pending from an earlier failure.
    pub async fn shutdown(&self) -> Result<(), PluginHostError> {
        let unloaded = self.manager.unload_all().await;
        self.manager.flush().await?;
        info!(unloaded, "Plugin runtime shut down");
        Ok(())
    }
}
