//! SDK for building Marginalia extensions.
//!
//! An extension is a manifest plus an [`Extension`] object. The host loads
//! the pair as an [`ExtensionPackage`], hands the extension a sandboxed
//! [`Capabilities`] surface and calls its hooks and command callbacks.
//!
//! # Example
//!
//! ```
//! use marginalia_plugin_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! struct WordCount;
//!
//! #[async_trait]
//! impl Extension for WordCount {
//!     async fn on_load(&self, caps: &dyn Capabilities) -> anyhow::Result<()> {
//!         caps.settings().set("enabled", serde_json::json!(true)).await?;
//!         Ok(())
//!     }
//! }
//!
//! let manifest = ExtensionManifest::from_json(
//!     r#"{"id":"word-count","name":"Word Count","version":"1.0.0",
//!         "author":"me","entryPoint":"word_count",
//!         "permissions":[{"type":"settings"}]}"#,
//! )
//! .unwrap();
//! let package = ExtensionPackage::new(manifest, Arc::new(WordCount));
//! assert_eq!(package.id(), "word-count");
//! ```

pub mod capabilities;
pub mod extension;
pub mod manifest;
pub mod namespace;
pub mod prelude;

pub use capabilities::{
    AiApi, Capabilities, CapabilityError, EventHandler, EventsApi, GraphApi, HostError,
    HostResult, NotesApi, SettingsApi, UiApi,
};
pub use extension::{Command, CommandHandler, Extension, ExtensionPackage, FnCommand, NoopExtension};
pub use manifest::{
    AiIntegration, CommandDescriptor, ExtensionManifest, ManifestError, Permission,
    PermissionKind, ProcessorDescriptor, SettingDescriptor, SettingType, ViewDescriptor,
};
pub use namespace::Namespace;
