//! Convenience re-exports for extension authors.

pub use crate::capabilities::{
    AiApi, Capabilities, CapabilityError, EventHandler, EventsApi, GraphApi, HostError,
    HostResult, NotesApi, SettingsApi, UiApi,
};
pub use crate::extension::{Command, CommandHandler, Extension, ExtensionPackage, FnCommand};
pub use crate::manifest::{
    CommandDescriptor, ExtensionManifest, Permission, PermissionKind, SettingDescriptor,
    SettingType, ViewDescriptor,
};
pub use crate::namespace::Namespace;
pub use async_trait::async_trait;
pub use marginalia_types::{Note, NoteUpdate, Severity};
