//! The unrestricted capability surface built for each extension.
//!
//! Hosts supply their collaborators as [`HostServices`]. For every load the
//! manager assembles a [`FullSurface`] from them, adding the pieces that are
//! scoped to one extension: its own settings, an event handle that tracks its
//! subscriptions and a UI handle that routes contributions into the
//! [`HostRegistry`] under its ownership.

use crate::contributions::HostRegistry;
use async_trait::async_trait;
use marginalia_plugin_sdk::{
    AiApi, Command, EventHandler, EventsApi, GraphApi, HostError, HostResult, NotesApi,
    SettingDescriptor, SettingsApi, UiApi, ViewDescriptor,
};
use marginalia_store::{PluginStore, SettingsMap};
use marginalia_types::{Severity, SubscriptionId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Collaborators the host application provides.
#[derive(Clone)]
pub struct HostServices {
    pub notes: Arc<dyn NotesApi>,
    pub graph: Option<Arc<dyn GraphApi>>,
    pub ai: Option<Arc<dyn AiApi>>,
    pub ui: Arc<dyn UiApi>,
    pub events: Arc<dyn EventsApi>,
}

impl HostServices {
    /// Services with a fresh in-process event bus and no graph or AI.
    pub fn new(notes: Arc<dyn NotesApi>, ui: Arc<dyn UiApi>) -> Self {
        Self {
            notes,
            graph: None,
            ai: None,
            ui,
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphApi>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiApi>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventsApi>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("graph", &self.graph.is_some())
            .field("ai", &self.ai.is_some())
            .finish_non_exhaustive()
    }
}

/// Every namespace the host offers to one extension, before sandboxing.
#[derive(Clone)]
pub struct FullSurface {
    pub notes: Arc<dyn NotesApi>,
    pub graph: Option<Arc<dyn GraphApi>>,
    /// Present only when the extension declares an AI integration and the
    /// host has a provider.
    pub ai: Option<Arc<dyn AiApi>>,
    pub ui: Arc<dyn UiApi>,
    pub events: Arc<dyn EventsApi>,
    pub settings: Arc<dyn SettingsApi>,
    pub declares_ai: bool,
}

// ---- Settings ----

/// One extension's settings: in memory first, persisted on every set.
pub struct ExtensionSettings {
    extension_id: String,
    schema: Vec<SettingDescriptor>,
    values: tokio::sync::Mutex<SettingsMap>,
    store: Option<Arc<PluginStore>>,
}

impl ExtensionSettings {
    /// Reads any persisted values for the extension.
    pub async fn load(
        extension_id: &str,
        schema: Vec<SettingDescriptor>,
        store: Option<Arc<PluginStore>>,
    ) -> Self {
        let values = match &store {
            Some(store) => store.load_settings(extension_id).await.unwrap_or_default(),
            None => SettingsMap::new(),
        };
        Self {
            extension_id: extension_id.to_string(),
            schema,
            values: tokio::sync::Mutex::new(values),
            store,
        }
    }

    fn descriptor(&self, key: &str) -> Option<&SettingDescriptor> {
        self.schema.iter().find(|d| d.key == key)
    }
}

#[async_trait]
impl SettingsApi for ExtensionSettings {
    async fn get(&self, key: &str) -> HostResult<Option<Value>> {
        if let Some(value) = self.values.lock().await.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.descriptor(key).and_then(|d| d.default.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> HostResult<()> {
        if let Some(descriptor) = self.descriptor(key) {
            descriptor
                .check(&value)
                .map_err(|reason| HostError::InvalidSetting {
                    key: key.to_string(),
                    reason,
                })?;
        }

        // Held across the write so persisted order matches call order.
        let mut values = self.values.lock().await;
        if value.is_null() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save_settings(&self.extension_id, &values).await {
                warn!(
                    extension_id = %self.extension_id,
                    key = %key,
                    error = %e,
                    "Failed to persist setting, keeping in-memory value"
                );
            }
        }
        Ok(())
    }
}

// ---- Events ----

/// In-process publish/subscribe bus. Not persisted.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, EventHandler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventsApi for EventBus {
    async fn on(&self, event: &str, handler: EventHandler) -> HostResult<SubscriptionId> {
        let id = SubscriptionId::new();
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        Ok(id)
    }

    async fn off(&self, event: &str, subscription: SubscriptionId) -> HostResult<bool> {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(event) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        Ok(removed)
    }

    async fn emit(&self, event: &str, data: Value) -> HostResult<usize> {
        // Handlers run outside the lock so they may subscribe or emit.
        let handlers: Vec<EventHandler> = self
            .lock()
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(&data);
        }
        Ok(handlers.len())
    }
}

/// Event handle of one extension. Tracks its subscriptions so unload can
/// drop them.
pub struct ScopedEvents {
    extension_id: String,
    bus: Arc<dyn EventsApi>,
    owned: Mutex<Vec<(String, SubscriptionId)>>,
}

impl ScopedEvents {
    pub fn new(extension_id: &str, bus: Arc<dyn EventsApi>) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            bus,
            owned: Mutex::new(Vec::new()),
        }
    }

    fn owned(&self) -> MutexGuard<'_, Vec<(String, SubscriptionId)>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unsubscribes everything this extension subscribed. Returns the count.
    pub async fn release_all(&self) -> usize {
        let owned: Vec<(String, SubscriptionId)> = std::mem::take(&mut *self.owned());
        let mut released = 0;
        for (event, id) in owned {
            match self.bus.off(&event, id).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(extension_id = %self.extension_id, event = %event, error = %e, "Failed to drop event subscription");
                }
            }
        }
        if released > 0 {
            debug!(extension_id = %self.extension_id, released, "Released event subscriptions");
        }
        released
    }
}

#[async_trait]
impl EventsApi for ScopedEvents {
    async fn on(&self, event: &str, handler: EventHandler) -> HostResult<SubscriptionId> {
        let id = self.bus.on(event, handler).await?;
        self.owned().push((event.to_string(), id));
        Ok(id)
    }

    async fn off(&self, event: &str, subscription: SubscriptionId) -> HostResult<bool> {
        self.owned()
            .retain(|(e, id)| !(e == event && *id == subscription));
        self.bus.off(event, subscription).await
    }

    async fn emit(&self, event: &str, data: Value) -> HostResult<usize> {
        self.bus.emit(event, data).await
    }
}

// ---- UI ----

/// UI handle of one extension. Notifications, modals and the status bar go
/// to the host UI; commands and views go into the host registry under the
/// extension's ownership.
pub struct RegistryUi {
    extension_id: String,
    host_ui: Arc<dyn UiApi>,
    registry: Arc<HostRegistry>,
}

impl RegistryUi {
    pub fn new(extension_id: &str, host_ui: Arc<dyn UiApi>, registry: Arc<HostRegistry>) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            host_ui,
            registry,
        }
    }
}

#[async_trait]
impl UiApi for RegistryUi {
    async fn show_notification(&self, message: &str, severity: Severity) -> HostResult<()> {
        self.host_ui.show_notification(message, severity).await
    }

    async fn show_modal(&self, title: &str, content: &str) -> HostResult<()> {
        self.host_ui.show_modal(title, content).await
    }

    async fn add_command(&self, command: Command) -> HostResult<()> {
        self.registry.register_command(&self.extension_id, command);
        Ok(())
    }

    async fn add_view(&self, view: ViewDescriptor) -> HostResult<()> {
        self.registry.register_view(&self.extension_id, view);
        Ok(())
    }

    async fn set_status_bar_text(&self, text: &str) -> HostResult<()> {
        self.host_ui.set_status_bar_text(text).await
    }
}
