//! Central extension lifecycle manager.
//!
//! Owns every loaded extension and its sandboxed surface, enforces the
//! load-time checks, routes command execution and keeps the persisted
//! loaded-set in step with what is active.

use crate::audit::AuditLog;
use crate::config::{HostConfig, PolicyEngine};
use crate::contributions::{HostRegistry, RegisteredCommand};
use crate::error::PluginHostError;
use crate::health::{ExtensionHealth, ExtensionMetrics, HealthStatus};
use crate::permissions::validate_permissions;
use crate::registry::{ManifestRegistry, check_manifest};
use crate::sandbox::SandboxedSurface;
use crate::surface::{ExtensionSettings, FullSurface, HostServices, RegistryUi, ScopedEvents};
use chrono::{DateTime, Utc};
use marginalia_plugin_sdk::{
    Command, Extension, ExtensionManifest, ExtensionPackage, Namespace, ProcessorDescriptor,
    ViewDescriptor,
};
use marginalia_store::PluginStore;
use marginalia_types::Timestamp;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Loading,
    Active,
    Unloading,
}

/// One loaded extension. Cloning is cheap; the clone shares the sandbox.
#[derive(Clone)]
pub struct LoadedExtension {
    pub manifest: ExtensionManifest,
    pub surface: SandboxedSurface,
    pub state: LifecycleState,
    pub health: ExtensionHealth,
    pub metrics: ExtensionMetrics,
    pub loaded_at: DateTime<Utc>,
    extension: Arc<dyn Extension>,
    events: Arc<ScopedEvents>,
}

impl LoadedExtension {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }
}

impl fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("id", &self.manifest.id)
            .field("state", &self.state)
            .field("surface", &self.surface)
            .field("health", &self.health)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`ExtensionManager::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    /// Persisted ids with no manifest in the registry, or already loaded.
    pub skipped: Vec<String>,
    /// Ids that failed to load, with the reason.
    pub failed: Vec<(String, String)>,
}

#[derive(Default)]
struct Loaded {
    extensions: HashMap<String, LoadedExtension>,
    /// Ids in the order they became active.
    order: Vec<String>,
}

pub struct ExtensionManager {
    loaded: RwLock<Loaded>,
    lifecycle_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes command callbacks.
    dispatch: Mutex<()>,
    /// Serializes snapshot writes so the last write reflects the latest state.
    snapshot_lock: Mutex<()>,
    snapshot_pending: AtomicBool,
    contributions: Arc<HostRegistry>,
    audit: Arc<AuditLog>,
    policy: PolicyEngine,
    services: HostServices,
    store: Option<Arc<PluginStore>>,
    strict_mode: bool,
    error_threshold: u32,
}

impl fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("policy", &self.policy)
            .field("strict_mode", &self.strict_mode)
            .field("error_threshold", &self.error_threshold)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl ExtensionManager {
    pub fn new(services: HostServices, store: Option<Arc<PluginStore>>, config: &HostConfig) -> Self {
        Self {
            loaded: RwLock::new(Loaded::default()),
            lifecycle_locks: std::sync::Mutex::new(HashMap::new()),
            dispatch: Mutex::new(()),
            snapshot_lock: Mutex::new(()),
            snapshot_pending: AtomicBool::new(false),
            contributions: Arc::new(HostRegistry::new()),
            audit: Arc::new(config.audit.build_log()),
            policy: PolicyEngine::new(config.policy.clone()),
            services,
            store,
            strict_mode: config.sandbox.strict_mode,
            error_threshold: config.health.error_threshold,
        }
    }

    /// Manager with default configuration and no persistence.
    pub fn ephemeral(services: HostServices) -> Self {
        Self::new(services, None, &HostConfig::default())
    }

    async fn lifecycle_lock(&self, extension_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .lifecycle_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(extension_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops a lifecycle guard and forgets the lock once nobody else holds or
    /// waits on it. Clones are only taken under the map lock, so a count of
    /// one here means the entry is unused.
    fn release_lifecycle_lock(&self, extension_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self
            .lifecycle_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(extension_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(extension_id);
        }
    }

    // ================================================================
    // Loading / Unloading
    // ================================================================

    /// Validates and loads an extension, then persists the loaded-set.
    pub async fn load(&self, package: ExtensionPackage) -> Result<(), PluginHostError> {
        let extension_id = package.id().to_string();
        let guard = self.lifecycle_lock(&extension_id).await;
        let result = self.load_inner(package).await;
        self.finish_lifecycle(result.is_ok()).await;
        self.release_lifecycle_lock(&extension_id, guard);
        result
    }

    async fn load_inner(&self, package: ExtensionPackage) -> Result<(), PluginHostError> {
        let ExtensionPackage {
            manifest,
            extension,
        } = package;
        let extension_id = manifest.id.clone();

        check_manifest(&manifest)?;

        if !self.policy.is_extension_allowed(&extension_id) {
            return Err(PluginHostError::PolicyDenied(format!(
                "extension '{extension_id}' blocked by policy"
            )));
        }

        {
            let loaded = self.loaded.read().await;
            if loaded.extensions.contains_key(&extension_id) {
                return Err(PluginHostError::AlreadyLoaded(extension_id));
            }
            if let Some(dependency) = manifest.dependencies.iter().find(|dep| {
                !loaded
                    .extensions
                    .get(dep.as_str())
                    .is_some_and(LoadedExtension::is_active)
            }) {
                return Err(PluginHostError::MissingDependency {
                    extension_id,
                    dependency: dependency.clone(),
                });
            }
        }

        for warning in validate_permissions(&manifest.permissions).warnings {
            warn!(extension_id = %extension_id, "{warning}");
        }

        let (surface, events) = self.build_surface(&manifest).await;

        {
            let mut loaded = self.loaded.write().await;
            if loaded.extensions.contains_key(&extension_id) {
                return Err(PluginHostError::AlreadyLoaded(extension_id));
            }
            loaded.extensions.insert(
                extension_id.clone(),
                LoadedExtension {
                    manifest: manifest.clone(),
                    surface: surface.clone(),
                    state: LifecycleState::Loading,
                    health: ExtensionHealth::default(),
                    metrics: ExtensionMetrics::default(),
                    loaded_at: Utc::now(),
                    extension: Arc::clone(&extension),
                    events,
                },
            );
        }

        if let Err(e) = extension.on_load(&surface).await {
            warn!(extension_id = %extension_id, error = %format!("{e:#}"), "on_load hook failed");
        }

        self.register_declared(&manifest, extension.as_ref());

        let mut loaded = self.loaded.write().await;
        if let Some(record) = loaded.extensions.get_mut(&extension_id) {
            record.state = LifecycleState::Active;
        }
        loaded.order.push(extension_id.clone());
        info!(
            extension_id = %extension_id,
            version = %manifest.version,
            strict = surface.is_strict(),
            "Extension loaded"
        );
        Ok(())
    }

    async fn build_surface(&self, manifest: &ExtensionManifest) -> (SandboxedSurface, Arc<ScopedEvents>) {
        let extension_id = manifest.id.as_str();
        let settings = ExtensionSettings::load(
            extension_id,
            manifest.settings_schema.clone(),
            self.store.clone(),
        )
        .await;
        let events = Arc::new(ScopedEvents::new(
            extension_id,
            Arc::clone(&self.services.events),
        ));
        let ui = RegistryUi::new(
            extension_id,
            Arc::clone(&self.services.ui),
            Arc::clone(&self.contributions),
        );

        let declares_ai = manifest.declares_ai();
        let full = FullSurface {
            notes: Arc::clone(&self.services.notes),
            graph: self.services.graph.clone(),
            ai: if declares_ai {
                self.services.ai.clone()
            } else {
                None
            },
            ui: Arc::new(ui),
            events: events.clone(),
            settings: Arc::new(settings),
            declares_ai,
        };

        let surface = SandboxedSurface::new(
            full,
            &manifest.permissions,
            extension_id,
            self.strict_mode,
            Arc::clone(&self.audit),
        );
        (surface, events)
    }

    /// Registers the manifest's commands, views and processors. A declared
    /// command without a callback does not replace one the extension already
    /// registered from `on_load`.
    fn register_declared(&self, manifest: &ExtensionManifest, extension: &dyn Extension) {
        let owner = manifest.id.as_str();
        let registered = self.contributions.commands_of(owner);

        for descriptor in &manifest.commands {
            let handler = extension.command_handler(&descriptor.id);
            if handler.is_none() {
                if registered.contains(&descriptor.id) {
                    continue;
                }
                debug!(extension_id = %owner, command_id = %descriptor.id, "Declared command has no handler");
            }
            self.contributions.register_command(
                owner,
                Command {
                    descriptor: descriptor.clone(),
                    handler,
                },
            );
        }
        for view in &manifest.views {
            self.contributions.register_view(owner, view.clone());
        }
        for processor in &manifest.processors {
            self.contributions.register_processor(owner, processor.clone());
        }
    }

    /// Unloads an active extension and persists the loaded-set.
    pub async fn unload(&self, extension_id: &str) -> Result<(), PluginHostError> {
        let guard = self.lifecycle_lock(extension_id).await;
        let result = self.unload_inner(extension_id).await;
        self.finish_lifecycle(result.is_ok()).await;
        self.release_lifecycle_lock(extension_id, guard);
        result
    }

    /// `true` when the extension was unloaded, `false` when it was not loaded.
    pub async fn try_unload(&self, extension_id: &str) -> bool {
        self.unload(extension_id).await.is_ok()
    }

    async fn unload_inner(&self, extension_id: &str) -> Result<(), PluginHostError> {
        let record = {
            let mut loaded = self.loaded.write().await;
            match loaded.extensions.get_mut(extension_id) {
                Some(record) if record.is_active() => {
                    record.state = LifecycleState::Unloading;
                    record.clone()
                }
                _ => return Err(PluginHostError::NotFound(extension_id.to_string())),
            }
        };

        if let Err(e) = record.extension.on_unload(&record.surface).await {
            warn!(extension_id = %extension_id, error = %format!("{e:#}"), "on_unload hook failed");
        }

        let removed = self.contributions.unregister_owner(extension_id);
        let released = record.events.release_all().await;
        // Handles the extension kept stop reaching the host.
        record.surface.close();

        let mut loaded = self.loaded.write().await;
        loaded.extensions.remove(extension_id);
        loaded.order.retain(|id| id != extension_id);
        info!(
            extension_id = %extension_id,
            commands = removed.commands,
            views = removed.views,
            processors = removed.processors,
            subscriptions = released,
            "Extension unloaded"
        );
        Ok(())
    }

    /// Unloads everything in reverse load order without touching the
    /// persisted loaded-set. Returns how many were unloaded.
    pub async fn unload_all(&self) -> usize {
        let ids: Vec<String> = self.loaded.read().await.order.iter().rev().cloned().collect();
        let mut unloaded = 0;
        for id in ids {
            let guard = self.lifecycle_lock(&id).await;
            match self.unload_inner(&id).await {
                Ok(()) => unloaded += 1,
                Err(e) => debug!(extension_id = %id, error = %e, "Skipped during unload_all"),
            }
            self.release_lifecycle_lock(&id, guard);
        }
        unloaded
    }

    /// Reloads the persisted loaded-set against `registry`.
    ///
    /// Ids are loaded dependency-first. Entries failing only because a
    /// dependency is not active yet are retried until a pass makes no
    /// progress. The snapshot is written at most once, and only when the
    /// active set differs from what was persisted.
    pub async fn restore(&self, registry: &ManifestRegistry) -> RestoreReport {
        let mut report = RestoreReport::default();
        let Some(store) = &self.store else {
            return report;
        };

        let persisted = store.load_loaded_set().await;
        let mut known = Vec::with_capacity(persisted.len());
        for id in &persisted {
            if registry.contains(id) {
                known.push(id.clone());
            } else {
                warn!(extension_id = %id, "Persisted extension has no manifest, skipping");
                report.skipped.push(id.clone());
            }
        }

        let mut pending = match registry.load_order(&known) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Restoring in persisted order");
                known
            }
        };

        loop {
            let mut deferred: Vec<(String, PluginHostError)> = Vec::new();
            let mut progressed = false;

            for id in pending {
                let Some(package) = registry.get(&id) else {
                    continue;
                };
                let guard = self.lifecycle_lock(&id).await;
                let result = self.load_inner(package.clone()).await;
                self.release_lifecycle_lock(&id, guard);
                match result {
                    Ok(()) => {
                        progressed = true;
                        report.restored.push(id);
                    }
                    Err(e @ PluginHostError::MissingDependency { .. }) => deferred.push((id, e)),
                    Err(PluginHostError::AlreadyLoaded(_)) => report.skipped.push(id),
                    Err(e) => {
                        warn!(extension_id = %id, error = %e, "Failed to restore extension");
                        report.failed.push((id, e.to_string()));
                    }
                }
            }

            if deferred.is_empty() || !progressed {
                for (id, e) in deferred {
                    warn!(extension_id = %id, error = %e, "Failed to restore extension");
                    report.failed.push((id, e.to_string()));
                }
                break;
            }
            pending = deferred.into_iter().map(|(id, _)| id).collect();
        }

        let changed = self.loaded_ids().await != persisted;
        self.finish_lifecycle(changed).await;
        info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Restored extensions"
        );
        report
    }

    // ================================================================
    // Snapshot persistence
    // ================================================================

    async fn finish_lifecycle(&self, changed: bool) {
        if changed || self.snapshot_pending.load(Ordering::SeqCst) {
            if let Err(e) = self.write_snapshot().await {
                warn!(error = %e, "Failed to persist loaded extensions, will retry");
            }
        }
    }

    async fn write_snapshot(&self) -> Result<(), PluginHostError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _guard = self.snapshot_lock.lock().await;
        let ids = self.loaded_ids().await;
        match store.save_loaded_set(&ids).await {
            Ok(()) => {
                self.snapshot_pending.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.snapshot_pending.store(true, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// True when the last snapshot write failed and has not been retried
    /// successfully.
    pub fn has_pending_snapshot(&self) -> bool {
        self.snapshot_pending.load(Ordering::SeqCst)
    }

    /// Writes a pending snapshot, if any.
    pub async fn flush(&self) -> Result<(), PluginHostError> {
        if self.has_pending_snapshot() {
            self.write_snapshot().await?;
        }
        Ok(())
    }

    // ================================================================
    // Command execution
    // ================================================================

    /// Runs the discoverable command `command_id` with its owner's surface.
    /// Callbacks never run concurrently with each other.
    pub async fn execute_command(&self, command_id: &str, args: Value) -> Result<Value, PluginHostError> {
        let _dispatch = self.dispatch.lock().await;

        let RegisteredCommand { owner, command } = self
            .contributions
            .resolve_command(command_id)
            .ok_or_else(|| PluginHostError::CommandNotFound(command_id.to_string()))?;

        let surface = {
            let loaded = self.loaded.read().await;
            match loaded.extensions.get(&owner) {
                Some(record) if record.is_active() => record.surface.clone(),
                _ => return Err(PluginHostError::NotFound(owner)),
            }
        };

        let started = Instant::now();
        let result = match &command.handler {
            Some(handler) => handler.execute(&surface, args).await,
            None => Err(anyhow::anyhow!("no handler registered")),
        };
        let elapsed = started.elapsed();
        let now = Timestamp::now();

        {
            let mut loaded = self.loaded.write().await;
            if let Some(record) = loaded.extensions.get_mut(&owner) {
                record.metrics.record(elapsed, now);
                match &result {
                    Ok(_) => record.health.record_success(now),
                    Err(e) => {
                        let before = record.health.status;
                        record
                            .health
                            .record_failure(format!("{e:#}"), now, self.error_threshold);
                        if record.health.status == HealthStatus::Error && before != HealthStatus::Error {
                            warn!(
                                extension_id = %owner,
                                consecutive_failures = record.health.consecutive_failures,
                                "Extension marked unhealthy"
                            );
                        }
                    }
                }
            }
        }

        result.map_err(|e| PluginHostError::CommandFailed {
            extension_id: owner,
            command_id: command_id.to_string(),
            message: format!("{e:#}"),
        })
    }

    // ================================================================
    // Queries
    // ================================================================

    pub async fn get(&self, extension_id: &str) -> Option<LoadedExtension> {
        self.loaded.read().await.extensions.get(extension_id).cloned()
    }

    pub async fn is_loaded(&self, extension_id: &str) -> bool {
        self.loaded
            .read()
            .await
            .extensions
            .get(extension_id)
            .is_some_and(LoadedExtension::is_active)
    }

    /// Manifests of active extensions in load order.
    pub async fn loaded_plugins(&self) -> Vec<ExtensionManifest> {
        let loaded = self.loaded.read().await;
        loaded
            .order
            .iter()
            .filter_map(|id| loaded.extensions.get(id))
            .map(|record| record.manifest.clone())
            .collect()
    }

    pub async fn loaded_ids(&self) -> Vec<String> {
        self.loaded.read().await.order.clone()
    }

    pub async fn extension_count(&self) -> usize {
        self.loaded.read().await.order.len()
    }

    pub async fn health(&self, extension_id: &str) -> Option<ExtensionHealth> {
        self.loaded
            .read()
            .await
            .extensions
            .get(extension_id)
            .map(|record| record.health.clone())
    }

    pub async fn metrics(&self, extension_id: &str) -> Option<ExtensionMetrics> {
        self.loaded
            .read()
            .await
            .extensions
            .get(extension_id)
            .map(|record| record.metrics.clone())
    }

    pub fn commands(&self) -> Vec<RegisteredCommand> {
        self.contributions.commands()
    }

    pub fn views(&self) -> Vec<(String, ViewDescriptor)> {
        self.contributions.views()
    }

    pub fn processors(&self) -> Vec<(String, ProcessorDescriptor)> {
        self.contributions.processors()
    }

    pub fn contributions(&self) -> &Arc<HostRegistry> {
        &self.contributions
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn store(&self) -> Option<&Arc<PluginStore>> {
        self.store.as_ref()
    }

    // ================================================================
    // Administrative overrides
    // ================================================================

    pub async fn grant_permission(&self, extension_id: &str, namespace: Namespace) -> Result<bool, PluginHostError> {
        let surface = self.surface_of(extension_id).await?;
        Ok(surface.grant(namespace))
    }

    pub async fn revoke_permission(&self, extension_id: &str, namespace: Namespace) -> Result<bool, PluginHostError> {
        let surface = self.surface_of(extension_id).await?;
        Ok(surface.revoke(namespace))
    }

    async fn surface_of(&self, extension_id: &str) -> Result<SandboxedSurface, PluginHostError> {
        self.loaded
            .read()
            .await
            .extensions
            .get(extension_id)
            .map(|record| record.surface.clone())
            .ok_or_else(|| PluginHostError::NotFound(extension_id.to_string()))
    }
}
