//! The capability surface an extension calls back into.
//!
//! Each namespace is a trait object. Hosts implement the traits for their
//! collaborators; the plugin host wraps them in a sandbox and hands the
//! extension a [`Capabilities`] value. Accessing a namespace can fail (not
//! granted, or not provided by this host); calling a method can fail with a
//! [`HostError`] from the collaborator.

use crate::extension::Command;
use crate::manifest::ViewDescriptor;
use crate::namespace::Namespace;
use async_trait::async_trait;
use marginalia_types::{Analysis, Link, Note, NoteUpdate, SearchResult, Severity, SubscriptionId};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result of a capability method call.
pub type HostResult<T> = Result<T, HostError>;

/// Failure reported by a host collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid value for setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    /// Access was withdrawn after the handle was handed out.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("{0}")]
    Failed(String),
}

/// Failure obtaining a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("extension '{extension_id}' is not permitted to access '{namespace}'")]
    Unauthorized {
        extension_id: String,
        namespace: Namespace,
    },

    #[error("capability '{0}' is not available in this host")]
    Unavailable(Namespace),
}

// ---- Namespaces ----

#[async_trait]
pub trait NotesApi: Send + Sync {
    async fn create(&self, name: &str, content: &str, folder: Option<&str>) -> HostResult<Note>;
    async fn update(&self, id: &str, update: NoteUpdate) -> HostResult<Option<Note>>;
    async fn delete(&self, id: &str) -> HostResult<bool>;
    async fn get(&self, id: &str) -> HostResult<Option<Note>>;
    async fn get_all(&self) -> HostResult<Vec<Note>>;
    async fn search(&self, query: &str) -> HostResult<Vec<SearchResult>>;
    async fn active_note_id(&self) -> HostResult<Option<String>>;
}

#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn links(&self, note_id: &str) -> HostResult<Vec<Link>>;
    async fn all_links(&self) -> HostResult<Vec<Link>>;
}

#[async_trait]
pub trait AiApi: Send + Sync {
    async fn is_available(&self) -> HostResult<bool>;
    async fn analyze_content(&self, content: &str, note_id: Option<&str>) -> HostResult<Analysis>;
}

#[async_trait]
pub trait UiApi: Send + Sync {
    async fn show_notification(&self, message: &str, severity: Severity) -> HostResult<()>;
    /// Resolves once the modal is dismissed.
    async fn show_modal(&self, title: &str, content: &str) -> HostResult<()>;
    async fn add_command(&self, command: Command) -> HostResult<()>;
    async fn add_view(&self, view: ViewDescriptor) -> HostResult<()>;
    async fn set_status_bar_text(&self, text: &str) -> HostResult<()>;
}

/// Callback registered on the event bus.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[async_trait]
pub trait EventsApi: Send + Sync {
    async fn on(&self, event: &str, handler: EventHandler) -> HostResult<SubscriptionId>;
    /// Returns whether the subscription existed.
    async fn off(&self, event: &str, subscription: SubscriptionId) -> HostResult<bool>;
    /// Returns how many handlers were invoked.
    async fn emit(&self, event: &str, data: Value) -> HostResult<usize>;
}

/// The calling extension's own configuration.
#[async_trait]
pub trait SettingsApi: Send + Sync {
    /// Current value, falling back to the schema default.
    async fn get(&self, key: &str) -> HostResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> HostResult<()>;
}

// ---- Surface ----

/// What an extension sees of the host.
///
/// `extension_id` and `granted_namespaces` are identity data and are never
/// gated. `settings` cannot be denied, so it returns the API directly.
pub trait Capabilities: Send + Sync {
    fn extension_id(&self) -> &str;
    fn granted_namespaces(&self) -> Vec<Namespace>;

    fn notes(&self) -> Result<Arc<dyn NotesApi>, CapabilityError>;
    fn graph(&self) -> Result<Arc<dyn GraphApi>, CapabilityError>;
    fn ai(&self) -> Result<Arc<dyn AiApi>, CapabilityError>;
    fn ui(&self) -> Result<Arc<dyn UiApi>, CapabilityError>;
    fn events(&self) -> Result<Arc<dyn EventsApi>, CapabilityError>;
    fn settings(&self) -> Arc<dyn SettingsApi>;
}
