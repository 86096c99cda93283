//! Capability sandbox.
//!
//! [`SandboxedSurface`] is an explicit decorator over a [`FullSurface`]:
//! every namespace accessor runs a policy check, and every granted namespace
//! comes back wrapped so each call is checked again and audited before it is
//! forwarded unchanged. Denied namespaces either fail (strict mode) or behave
//! as stubs whose methods do nothing but log (permissive mode).
//!
//! The grant set and the closed flag are shared by the surface and every
//! handle it gave out, so a revoke or an unload also reaches handles an
//! extension kept from an earlier call.
//!
//! This is a cooperative boundary. It keeps well-behaved extensions inside
//! their declared permissions; it does not contain hostile code.

use crate::audit::AuditLog;
use crate::permissions::NamespaceSet;
use crate::surface::FullSurface;
use async_trait::async_trait;
use marginalia_plugin_sdk::{
    AiApi, Capabilities, CapabilityError, Command, EventHandler, EventsApi, GraphApi, HostResult,
    Namespace, NotesApi, Permission, SettingsApi, UiApi, ViewDescriptor,
};
use marginalia_types::{Analysis, Link, Note, NoteUpdate, SearchResult, Severity, SubscriptionId};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Pseudo method name recorded when a denied namespace is accessed.
const ACCESS: &str = "<access>";

/// Identity, policy and audit sink shared by one extension's surface and
/// every handle obtained from it.
#[derive(Clone)]
struct CallContext {
    extension_id: Arc<str>,
    audit: Arc<AuditLog>,
    granted: Arc<RwLock<NamespaceSet>>,
    closed: Arc<AtomicBool>,
    strict_mode: bool,
}

impl CallContext {
    fn call(&self, namespace: Namespace, method: &str, arguments: Value) {
        self.audit
            .record_call(&self.extension_id, namespace, method, arguments);
    }

    fn denied(&self, namespace: Namespace, method: &str) {
        self.audit.record_denied(&self.extension_id, namespace, method);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn permits(&self, namespace: Namespace) -> bool {
        !self.is_closed()
            && self
                .granted
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(namespace)
    }

    fn unauthorized(&self, namespace: Namespace) -> CapabilityError {
        CapabilityError::Unauthorized {
            extension_id: self.extension_id.to_string(),
            namespace,
        }
    }

    /// Per-call check made by every granted handle. `Ok(true)` forwards to
    /// the host. `Ok(false)` means access was withdrawn in permissive mode and
    /// the caller falls back to its stub, which records the denial.
    fn admit(&self, namespace: Namespace, method: &str) -> HostResult<bool> {
        if self.permits(namespace) {
            return Ok(true);
        }
        if self.strict_mode {
            self.denied(namespace, method);
            return Err(self.unauthorized(namespace).into());
        }
        Ok(false)
    }
}

enum Access {
    Granted,
    Stubbed,
}

/// The capability surface handed to one extension.
#[derive(Clone)]
pub struct SandboxedSurface {
    ctx: CallContext,
    full: FullSurface,
}

impl std::fmt::Debug for SandboxedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxedSurface")
            .field("extension_id", &&*self.ctx.extension_id)
            .field("granted", &self.granted_namespaces())
            .field("strict_mode", &self.ctx.strict_mode)
            .field("closed", &self.ctx.is_closed())
            .finish()
    }
}

impl SandboxedSurface {
    pub fn new(
        full: FullSurface,
        permissions: &[Permission],
        extension_id: &str,
        strict_mode: bool,
        audit: Arc<AuditLog>,
    ) -> Self {
        let granted = NamespaceSet::from_permissions(permissions, full.declares_ai);
        Self {
            ctx: CallContext {
                extension_id: Arc::from(extension_id),
                audit,
                granted: Arc::new(RwLock::new(granted)),
                closed: Arc::new(AtomicBool::new(false)),
                strict_mode,
            },
            full,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.ctx.strict_mode
    }

    /// Whether a call into `namespace` would reach the host right now.
    pub fn is_granted(&self, namespace: Namespace) -> bool {
        self.ctx.permits(namespace)
    }

    /// Withdraws every namespace from this surface and all handles it gave
    /// out. Called once the extension is unloaded.
    pub fn close(&self) {
        self.ctx.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.ctx.is_closed()
    }

    /// Administrative override. Returns whether the grant set changed.
    pub fn grant(&self, namespace: Namespace) -> bool {
        let applied = self
            .ctx
            .granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .grant(namespace);
        self.ctx
            .audit
            .record_security(&self.ctx.extension_id, namespace, "grant", applied);
        applied
    }

    /// Administrative override. `settings` cannot be revoked.
    pub fn revoke(&self, namespace: Namespace) -> bool {
        if namespace == Namespace::Settings {
            warn!(
                target: "marginalia::security",
                extension_id = %self.ctx.extension_id,
                "Refusing to revoke the settings namespace"
            );
        }
        let applied = self
            .ctx
            .granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .revoke(namespace);
        self.ctx
            .audit
            .record_security(&self.ctx.extension_id, namespace, "revoke", applied);
        applied
    }

    fn gate(&self, namespace: Namespace) -> Result<Access, CapabilityError> {
        if self.ctx.permits(namespace) {
            return Ok(Access::Granted);
        }
        self.ctx.denied(namespace, ACCESS);
        if self.ctx.strict_mode {
            Err(self.ctx.unauthorized(namespace))
        } else {
            Ok(Access::Stubbed)
        }
    }
}

impl Capabilities for SandboxedSurface {
    fn extension_id(&self) -> &str {
        &self.ctx.extension_id
    }

    fn granted_namespaces(&self) -> Vec<Namespace> {
        self.ctx
            .granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    fn notes(&self) -> Result<Arc<dyn NotesApi>, CapabilityError> {
        let denied = DeniedNotes {
            ctx: self.ctx.clone(),
        };
        let api: Arc<dyn NotesApi> = match self.gate(Namespace::Notes)? {
            Access::Granted => Arc::new(AuditedNotes {
                inner: Arc::clone(&self.full.notes),
                ctx: self.ctx.clone(),
                denied,
            }),
            Access::Stubbed => Arc::new(denied),
        };
        Ok(api)
    }

    fn graph(&self) -> Result<Arc<dyn GraphApi>, CapabilityError> {
        let denied = DeniedGraph {
            ctx: self.ctx.clone(),
        };
        let api: Arc<dyn GraphApi> = match self.gate(Namespace::Graph)? {
            Access::Granted => {
                let inner = self
                    .full
                    .graph
                    .clone()
                    .ok_or(CapabilityError::Unavailable(Namespace::Graph))?;
                Arc::new(AuditedGraph {
                    inner,
                    ctx: self.ctx.clone(),
                    denied,
                })
            }
            Access::Stubbed => Arc::new(denied),
        };
        Ok(api)
    }

    fn ai(&self) -> Result<Arc<dyn AiApi>, CapabilityError> {
        let denied = DeniedAi {
            ctx: self.ctx.clone(),
        };
        let api: Arc<dyn AiApi> = match self.gate(Namespace::Ai)? {
            Access::Granted => {
                let inner = self
                    .full
                    .ai
                    .clone()
                    .ok_or(CapabilityError::Unavailable(Namespace::Ai))?;
                Arc::new(AuditedAi {
                    inner,
                    ctx: self.ctx.clone(),
                    denied,
                })
            }
            Access::Stubbed => Arc::new(denied),
        };
        Ok(api)
    }

    fn ui(&self) -> Result<Arc<dyn UiApi>, CapabilityError> {
        let denied = DeniedUi {
            ctx: self.ctx.clone(),
        };
        let api: Arc<dyn UiApi> = match self.gate(Namespace::Ui)? {
            Access::Granted => Arc::new(AuditedUi {
                inner: Arc::clone(&self.full.ui),
                ctx: self.ctx.clone(),
                denied,
            }),
            Access::Stubbed => Arc::new(denied),
        };
        Ok(api)
    }

    fn events(&self) -> Result<Arc<dyn EventsApi>, CapabilityError> {
        let denied = DeniedEvents {
            ctx: self.ctx.clone(),
        };
        let api: Arc<dyn EventsApi> = match self.gate(Namespace::Events)? {
            Access::Granted => Arc::new(AuditedEvents {
                inner: Arc::clone(&self.full.events),
                ctx: self.ctx.clone(),
                denied,
            }),
            Access::Stubbed => Arc::new(denied),
        };
        Ok(api)
    }

    fn settings(&self) -> Arc<dyn SettingsApi> {
        Arc::new(AuditedSettings {
            inner: Arc::clone(&self.full.settings),
            ctx: self.ctx.clone(),
            denied: DeniedSettings {
                ctx: self.ctx.clone(),
            },
        })
    }
}

// ================================================================
// Audited wrappers: check, record, then forward unchanged
// ================================================================

struct AuditedNotes {
    inner: Arc<dyn NotesApi>,
    ctx: CallContext,
    denied: DeniedNotes,
}

#[async_trait]
impl NotesApi for AuditedNotes {
    async fn create(&self, name: &str, content: &str, folder: Option<&str>) -> HostResult<Note> {
        if !self.ctx.admit(Namespace::Notes, "create")? {
            return self.denied.create(name, content, folder).await;
        }
        self.ctx.call(
            Namespace::Notes,
            "create",
            json!({ "name": name, "content": content, "folder": folder }),
        );
        self.inner.create(name, content, folder).await
    }

    async fn update(&self, id: &str, update: NoteUpdate) -> HostResult<Option<Note>> {
        if !self.ctx.admit(Namespace::Notes, "update")? {
            return self.denied.update(id, update).await;
        }
        self.ctx
            .call(Namespace::Notes, "update", json!({ "id": id, "update": &update }));
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &str) -> HostResult<bool> {
        if !self.ctx.admit(Namespace::Notes, "delete")? {
            return self.denied.delete(id).await;
        }
        self.ctx.call(Namespace::Notes, "delete", json!({ "id": id }));
        self.inner.delete(id).await
    }

    async fn get(&self, id: &str) -> HostResult<Option<Note>> {
        if !self.ctx.admit(Namespace::Notes, "get")? {
            return self.denied.get(id).await;
        }
        self.ctx.call(Namespace::Notes, "get", json!({ "id": id }));
        self.inner.get(id).await
    }

    async fn get_all(&self) -> HostResult<Vec<Note>> {
        if !self.ctx.admit(Namespace::Notes, "get_all")? {
            return self.denied.get_all().await;
        }
        self.ctx.call(Namespace::Notes, "get_all", Value::Null);
        self.inner.get_all().await
    }

    async fn search(&self, query: &str) -> HostResult<Vec<SearchResult>> {
        if !self.ctx.admit(Namespace::Notes, "search")? {
            return self.denied.search(query).await;
        }
        self.ctx
            .call(Namespace::Notes, "search", json!({ "query": query }));
        self.inner.search(query).await
    }

    async fn active_note_id(&self) -> HostResult<Option<String>> {
        if !self.ctx.admit(Namespace::Notes, "active_note_id")? {
            return self.denied.active_note_id().await;
        }
        self.ctx.call(Namespace::Notes, "active_note_id", Value::Null);
        self.inner.active_note_id().await
    }
}

struct AuditedGraph {
    inner: Arc<dyn GraphApi>,
    ctx: CallContext,
    denied: DeniedGraph,
}

#[async_trait]
impl GraphApi for AuditedGraph {
    async fn links(&self, note_id: &str) -> HostResult<Vec<Link>> {
        if !self.ctx.admit(Namespace::Graph, "links")? {
            return self.denied.links(note_id).await;
        }
        self.ctx
            .call(Namespace::Graph, "links", json!({ "noteId": note_id }));
        self.inner.links(note_id).await
    }

    async fn all_links(&self) -> HostResult<Vec<Link>> {
        if !self.ctx.admit(Namespace::Graph, "all_links")? {
            return self.denied.all_links().await;
        }
        self.ctx.call(Namespace::Graph, "all_links", Value::Null);
        self.inner.all_links().await
    }
}

struct AuditedAi {
    inner: Arc<dyn AiApi>,
    ctx: CallContext,
    denied: DeniedAi,
}

#[async_trait]
impl AiApi for AuditedAi {
    async fn is_available(&self) -> HostResult<bool> {
        if !self.ctx.admit(Namespace::Ai, "is_available")? {
            return self.denied.is_available().await;
        }
        self.ctx.call(Namespace::Ai, "is_available", Value::Null);
        self.inner.is_available().await
    }

    async fn analyze_content(&self, content: &str, note_id: Option<&str>) -> HostResult<Analysis> {
        if !self.ctx.admit(Namespace::Ai, "analyze_content")? {
            return self.denied.analyze_content(content, note_id).await;
        }
        self.ctx.call(
            Namespace::Ai,
            "analyze_content",
            json!({ "content": content, "noteId": note_id }),
        );
        self.inner.analyze_content(content, note_id).await
    }
}

struct AuditedUi {
    inner: Arc<dyn UiApi>,
    ctx: CallContext,
    denied: DeniedUi,
}

#[async_trait]
impl UiApi for AuditedUi {
    async fn show_notification(&self, message: &str, severity: Severity) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Ui, "show_notification")? {
            return self.denied.show_notification(message, severity).await;
        }
        self.ctx.call(
            Namespace::Ui,
            "show_notification",
            json!({ "message": message, "severity": severity }),
        );
        self.inner.show_notification(message, severity).await
    }

    async fn show_modal(&self, title: &str, content: &str) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Ui, "show_modal")? {
            return self.denied.show_modal(title, content).await;
        }
        self.ctx.call(
            Namespace::Ui,
            "show_modal",
            json!({ "title": title, "content": content }),
        );
        self.inner.show_modal(title, content).await
    }

    async fn add_command(&self, command: Command) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Ui, "add_command")? {
            return self.denied.add_command(command).await;
        }
        self.ctx
            .call(Namespace::Ui, "add_command", json!(&command.descriptor));
        self.inner.add_command(command).await
    }

    async fn add_view(&self, view: ViewDescriptor) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Ui, "add_view")? {
            return self.denied.add_view(view).await;
        }
        self.ctx.call(Namespace::Ui, "add_view", json!(&view));
        self.inner.add_view(view).await
    }

    async fn set_status_bar_text(&self, text: &str) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Ui, "set_status_bar_text")? {
            return self.denied.set_status_bar_text(text).await;
        }
        self.ctx
            .call(Namespace::Ui, "set_status_bar_text", json!({ "text": text }));
        self.inner.set_status_bar_text(text).await
    }
}

struct AuditedEvents {
    inner: Arc<dyn EventsApi>,
    ctx: CallContext,
    denied: DeniedEvents,
}

#[async_trait]
impl EventsApi for AuditedEvents {
    async fn on(&self, event: &str, handler: EventHandler) -> HostResult<SubscriptionId> {
        if !self.ctx.admit(Namespace::Events, "on")? {
            return self.denied.on(event, handler).await;
        }
        self.ctx.call(Namespace::Events, "on", json!({ "event": event }));
        self.inner.on(event, handler).await
    }

    async fn off(&self, event: &str, subscription: SubscriptionId) -> HostResult<bool> {
        if !self.ctx.admit(Namespace::Events, "off")? {
            return self.denied.off(event, subscription).await;
        }
        self.ctx.call(
            Namespace::Events,
            "off",
            json!({ "event": event, "subscription": subscription }),
        );
        self.inner.off(event, subscription).await
    }

    async fn emit(&self, event: &str, data: Value) -> HostResult<usize> {
        if !self.ctx.admit(Namespace::Events, "emit")? {
            return self.denied.emit(event, data).await;
        }
        self.ctx.call(
            Namespace::Events,
            "emit",
            json!({ "event": event, "data": &data }),
        );
        self.inner.emit(event, data).await
    }
}

/// Settings are never revoked, so this only stops forwarding once the
/// surface is closed.
struct AuditedSettings {
    inner: Arc<dyn SettingsApi>,
    ctx: CallContext,
    denied: DeniedSettings,
}

#[async_trait]
impl SettingsApi for AuditedSettings {
    async fn get(&self, key: &str) -> HostResult<Option<Value>> {
        if !self.ctx.admit(Namespace::Settings, "get")? {
            return self.denied.get(key).await;
        }
        self.ctx.call(Namespace::Settings, "get", json!({ "key": key }));
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> HostResult<()> {
        if !self.ctx.admit(Namespace::Settings, "set")? {
            return self.denied.set(key, value).await;
        }
        self.ctx.call(
            Namespace::Settings,
            "set",
            json!({ "key": key, "value": &value }),
        );
        self.inner.set(key, value).await
    }
}

// ================================================================
// Permissive-mode stubs: log, touch nothing, return neutral values
// ================================================================

struct DeniedNotes {
    ctx: CallContext,
}

#[async_trait]
impl NotesApi for DeniedNotes {
    async fn create(&self, name: &str, content: &str, folder: Option<&str>) -> HostResult<Note> {
        self.ctx.denied(Namespace::Notes, "create");
        Ok(Note::unsaved(name, content, folder))
    }

    async fn update(&self, _id: &str, _update: NoteUpdate) -> HostResult<Option<Note>> {
        self.ctx.denied(Namespace::Notes, "update");
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> HostResult<bool> {
        self.ctx.denied(Namespace::Notes, "delete");
        Ok(false)
    }

    async fn get(&self, _id: &str) -> HostResult<Option<Note>> {
        self.ctx.denied(Namespace::Notes, "get");
        Ok(None)
    }

    async fn get_all(&self) -> HostResult<Vec<Note>> {
        self.ctx.denied(Namespace::Notes, "get_all");
        Ok(Vec::new())
    }

    async fn search(&self, _query: &str) -> HostResult<Vec<SearchResult>> {
        self.ctx.denied(Namespace::Notes, "search");
        Ok(Vec::new())
    }

    async fn active_note_id(&self) -> HostResult<Option<String>> {
        self.ctx.denied(Namespace::Notes, "active_note_id");
        Ok(None)
    }
}

struct DeniedGraph {
    ctx: CallContext,
}

#[async_trait]
impl GraphApi for DeniedGraph {
    async fn links(&self, _note_id: &str) -> HostResult<Vec<Link>> {
        self.ctx.denied(Namespace::Graph, "links");
        Ok(Vec::new())
    }

    async fn all_links(&self) -> HostResult<Vec<Link>> {
        self.ctx.denied(Namespace::Graph, "all_links");
        Ok(Vec::new())
    }
}

struct DeniedAi {
    ctx: CallContext,
}

#[async_trait]
impl AiApi for DeniedAi {
    async fn is_available(&self) -> HostResult<bool> {
        self.ctx.denied(Namespace::Ai, "is_available");
        Ok(false)
    }

    async fn analyze_content(&self, _content: &str, _note_id: Option<&str>) -> HostResult<Analysis> {
        self.ctx.denied(Namespace::Ai, "analyze_content");
        Ok(Analysis::default())
    }
}

struct DeniedUi {
    ctx: CallContext,
}

#[async_trait]
impl UiApi for DeniedUi {
    async fn show_notification(&self, _message: &str, _severity: Severity) -> HostResult<()> {
        self.ctx.denied(Namespace::Ui, "show_notification");
        Ok(())
    }

    async fn show_modal(&self, _title: &str, _content: &str) -> HostResult<()> {
        self.ctx.denied(Namespace::Ui, "show_modal");
        Ok(())
    }

    async fn add_command(&self, _command: Command) -> HostResult<()> {
        self.ctx.denied(Namespace::Ui, "add_command");
        Ok(())
    }

    async fn add_view(&self, _view: ViewDescriptor) -> HostResult<()> {
        self.ctx.denied(Namespace::Ui, "add_view");
        Ok(())
    }

    async fn set_status_bar_text(&self, _text: &str) -> HostResult<()> {
        self.ctx.denied(Namespace::Ui, "set_status_bar_text");
        Ok(())
    }
}

struct DeniedEvents {
    ctx: CallContext,
}

#[async_trait]
impl EventsApi for DeniedEvents {
    async fn on(&self, _event: &str, _handler: EventHandler) -> HostResult<SubscriptionId> {
        self.ctx.denied(Namespace::Events, "on");
        Ok(SubscriptionId::nil())
    }

    async fn off(&self, _event: &str, _subscription: SubscriptionId) -> HostResult<bool> {
        self.ctx.denied(Namespace::Events, "off");
        Ok(false)
    }

    async fn emit(&self, _event: &str, _data: Value) -> HostResult<usize> {
        self.ctx.denied(Namespace::Events, "emit");
        Ok(0)
    }
}

struct DeniedSettings {
    ctx: CallContext,
}

#[async_trait]
impl SettingsApi for DeniedSettings {
    async fn get(&self, _key: &str) -> HostResult<Option<Value>> {
        self.ctx.denied(Namespace::Settings, "get");
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> HostResult<()> {
        self.ctx.denied(Namespace::Settings, "set");
        Ok(())
    }
}
