//! Shared fixtures for plugin host integration tests: in-memory host
//! collaborators, manifest builders and a storage backend whose writes can
//! be switched off.

#![allow(dead_code)]

use async_trait::async_trait;
use marginalia_plugin_host::{EventBus, HostServices};
use marginalia_plugin_sdk::{
    AiApi, Command, CommandDescriptor, ExtensionManifest, GraphApi, HostResult, NotesApi,
    Permission, PermissionKind, UiApi, ViewDescriptor,
};
use marginalia_store::{
    Collection, LOADED_SET_KEY, MemoryBackend, StorageBackend, StoreError, StoreResult,
};
use marginalia_types::{Analysis, Link, Note, NoteUpdate, SearchResult, Severity, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Routes log output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ================================================================
// Host collaborators
// ================================================================

#[derive(Default)]
pub struct FakeNotes {
    notes: Mutex<Vec<Note>>,
    next_id: AtomicUsize,
}

impl FakeNotes {
    pub fn count(&self) -> usize {
        self.notes.lock().unwrap().len()
    }
}

#[async_trait]
impl NotesApi for FakeNotes {
    async fn create(&self, name: &str, content: &str, folder: Option<&str>) -> HostResult<Note> {
        let mut note = Note::unsaved(name, content, folder);
        note.id = format!("note-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        note.created_at = Timestamp::now();
        note.updated_at = note.created_at;
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn update(&self, id: &str, update: NoteUpdate) -> HostResult<Option<Note>> {
        let mut notes = self.notes.lock().unwrap();
        let Some(note) = notes.iter_mut().find(|n| n.id == id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            note.name = name;
        }
        if let Some(content) = update.content {
            note.content = content;
        }
        note.updated_at = Timestamp::now();
        Ok(Some(note.clone()))
    }

    async fn delete(&self, id: &str) -> HostResult<bool> {
        let mut notes = self.notes.lock().unwrap();
        let before = notes.len();
        notes.retain(|n| n.id != id);
        Ok(notes.len() != before)
    }

    async fn get(&self, id: &str) -> HostResult<Option<Note>> {
        Ok(self.notes.lock().unwrap().iter().find(|n| n.id == id).cloned())
    }

    async fn get_all(&self) -> HostResult<Vec<Note>> {
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn search(&self, _query: &str) -> HostResult<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    async fn active_note_id(&self) -> HostResult<Option<String>> {
        Ok(self.notes.lock().unwrap().last().map(|n| n.id.clone()))
    }
}

/// Records every notification and status bar update.
#[derive(Default)]
pub struct RecordingUi {
    pub notifications: Mutex<Vec<(String, Severity)>>,
    pub status: Mutex<Option<String>>,
}

#[async_trait]
impl UiApi for RecordingUi {
    async fn show_notification(&self, message: &str, severity: Severity) -> HostResult<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
        Ok(())
    }

    async fn show_modal(&self, _title: &str, _content: &str) -> HostResult<()> {
        Ok(())
    }

    async fn add_command(&self, _command: Command) -> HostResult<()> {
        Ok(())
    }

    async fn add_view(&self, _view: ViewDescriptor) -> HostResult<()> {
        Ok(())
    }

    async fn set_status_bar_text(&self, text: &str) -> HostResult<()> {
        *self.status.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

pub struct FakeGraph;

#[async_trait]
impl GraphApi for FakeGraph {
    async fn links(&self, note_id: &str) -> HostResult<Vec<Link>> {
        Ok(vec![Link {
            source: note_id.to_string(),
            target: "other".to_string(),
            label: None,
        }])
    }

    async fn all_links(&self) -> HostResult<Vec<Link>> {
        Ok(Vec::new())
    }
}

pub struct FakeAi;

#[async_trait]
impl AiApi for FakeAi {
    async fn is_available(&self) -> HostResult<bool> {
        Ok(true)
    }

    async fn analyze_content(&self, content: &str, _note_id: Option<&str>) -> HostResult<Analysis> {
        Ok(Analysis {
            summary: format!("{} words", content.split_whitespace().count()),
            ..Analysis::default()
        })
    }
}

/// Host collaborators plus handles on the fakes so tests can inspect them.
pub struct Fixture {
    pub notes: Arc<FakeNotes>,
    pub ui: Arc<RecordingUi>,
    pub bus: Arc<EventBus>,
    pub services: HostServices,
}

pub fn fixture() -> Fixture {
    init_tracing();
    let notes = Arc::new(FakeNotes::default());
    let ui = Arc::new(RecordingUi::default());
    let bus = Arc::new(EventBus::new());
    let services = HostServices::new(notes.clone(), ui.clone())
        .with_events(bus.clone())
        .with_graph(Arc::new(FakeGraph))
        .with_ai(Arc::new(FakeAi));
    Fixture {
        notes,
        ui,
        bus,
        services,
    }
}

// ================================================================
// Manifests
// ================================================================

pub fn manifest(id: &str, permissions: &[&str]) -> ExtensionManifest {
    ExtensionManifest {
        id: id.into(),
        name: format!("{id} extension"),
        version: "1.0.0".into(),
        author: "tests".into(),
        entry_point: id.replace('-', "_"),
        permissions: permissions
            .iter()
            .map(|kind| Permission::new(PermissionKind::from(kind.to_string())))
            .collect(),
        ..Default::default()
    }
}

pub fn with_dependencies(mut manifest: ExtensionManifest, deps: &[&str]) -> ExtensionManifest {
    manifest.dependencies = deps.iter().map(|d| d.to_string()).collect();
    manifest
}

pub fn with_command(mut manifest: ExtensionManifest, command_id: &str) -> ExtensionManifest {
    manifest
        .commands
        .push(CommandDescriptor::new(command_id, command_id));
    manifest
}

// ================================================================
// Storage
// ================================================================

/// Memory backend whose writes fail while `failing` is set. Also counts
/// loaded-set snapshot writes.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    pub failing: AtomicBool,
    loaded_set_writes: AtomicUsize,
}

impl FlakyBackend {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful writes of the loaded-set snapshot so far.
    pub fn loaded_set_writes(&self) -> usize {
        self.loaded_set_writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("disk full".into()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(collection, key)
    }

    fn put(&self, collection: Collection, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.put(collection, key, value)?;
        if collection == Collection::Meta && key == LOADED_SET_KEY {
            self.loaded_set_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(collection, key)
    }

    fn delete_if(&self, collection: Collection, key: &str, expected: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete_if(collection, key, expected)
    }

    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, String)>> {
        self.inner.list(collection)
    }

    fn clear(&self, collection: Collection) -> StoreResult<usize> {
        self.check()?;
        self.inner.clear(collection)
    }
}
