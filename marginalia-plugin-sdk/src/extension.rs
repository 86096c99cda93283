//! Extension code: lifecycle hooks and command callbacks.

use crate::capabilities::Capabilities;
use crate::manifest::{CommandDescriptor, ExtensionManifest};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The code half of an extension. The manifest's `entryPoint` names it.
///
/// Every method has a default so a manifest-only extension needs no code.
/// Hook errors are logged by the host and never abort a load or unload.
#[async_trait]
pub trait Extension: Send + Sync {
    async fn on_load(&self, _caps: &dyn Capabilities) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_unload(&self, _caps: &dyn Capabilities) -> anyhow::Result<()> {
        Ok(())
    }

    /// Callback for a command declared in the manifest. Declared commands
    /// without a handler are registered but fail when executed.
    fn command_handler(&self, _command_id: &str) -> Option<Arc<dyn CommandHandler>> {
        None
    }
}

/// A command callback. It always receives the owning extension's own
/// sandboxed surface, never the caller's.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, caps: &dyn Capabilities, args: Value) -> anyhow::Result<Value>;
}

/// Adapts a plain closure that does not need the capability surface.
pub struct FnCommand<F>(pub F);

impl<F> FnCommand<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    async fn execute(&self, _caps: &dyn Capabilities, args: Value) -> anyhow::Result<Value> {
        (self.0)(args)
    }
}

/// A registered command: descriptor plus callback.
#[derive(Clone)]
pub struct Command {
    pub descriptor: CommandDescriptor,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

impl Command {
    pub fn new(descriptor: CommandDescriptor, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            descriptor,
            handler: Some(handler),
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("descriptor", &self.descriptor)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// An extension with no code.
#[derive(Debug, Default)]
pub struct NoopExtension;

#[async_trait]
impl Extension for NoopExtension {}

/// A manifest bound to the code it names.
#[derive(Clone)]
pub struct ExtensionPackage {
    pub manifest: ExtensionManifest,
    pub extension: Arc<dyn Extension>,
}

impl ExtensionPackage {
    pub fn new(manifest: ExtensionManifest, extension: Arc<dyn Extension>) -> Self {
        Self {
            manifest,
            extension,
        }
    }

    /// Package whose manifest needs no hooks or callbacks.
    pub fn manifest_only(manifest: ExtensionManifest) -> Self {
        Self::new(manifest, Arc::new(NoopExtension))
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}

impl fmt::Debug for ExtensionPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionPackage")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{
        AiApi, CapabilityError, EventsApi, GraphApi, HostResult, NotesApi, SettingsApi, UiApi,
    };
    use crate::namespace::Namespace;
    use serde_json::json;

    struct NoSettings;

    #[async_trait]
    impl SettingsApi for NoSettings {
        async fn get(&self, _key: &str) -> HostResult<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> HostResult<()> {
            Ok(())
        }
    }

    /// A surface that grants nothing but settings.
    struct Bare;

    impl Bare {
        fn denied(&self, namespace: Namespace) -> CapabilityError {
            CapabilityError::Unauthorized {
                extension_id: "bare".into(),
                namespace,
            }
        }
    }

    impl Capabilities for Bare {
        fn extension_id(&self) -> &str {
            "bare"
        }

        fn granted_namespaces(&self) -> Vec<Namespace> {
            vec![Namespace::Settings]
        }

        fn notes(&self) -> Result<Arc<dyn NotesApi>, CapabilityError> {
            Err(self.denied(Namespace::Notes))
        }

        fn graph(&self) -> Result<Arc<dyn GraphApi>, CapabilityError> {
            Err(self.denied(Namespace::Graph))
        }

        fn ai(&self) -> Result<Arc<dyn AiApi>, CapabilityError> {
            Err(CapabilityError::Unavailable(Namespace::Ai))
        }

        fn ui(&self) -> Result<Arc<dyn UiApi>, CapabilityError> {
            Err(self.denied(Namespace::Ui))
        }

        fn events(&self) -> Result<Arc<dyn EventsApi>, CapabilityError> {
            Err(self.denied(Namespace::Events))
        }

        fn settings(&self) -> Arc<dyn SettingsApi> {
            Arc::new(NoSettings)
        }
    }

    #[tokio::test]
    async fn fn_command_passes_arguments_through() {
        let handler = FnCommand::new(|args: Value| Ok(json!({ "echo": args })));
        let out = handler.execute(&Bare, json!([1, 2])).await.unwrap();
        assert_eq!(out, json!({ "echo": [1, 2] }));
    }

    #[tokio::test]
    async fn noop_extension_hooks_succeed() {
        let ext = NoopExtension;
        ext.on_load(&Bare).await.unwrap();
        ext.on_unload(&Bare).await.unwrap();
        assert!(ext.command_handler("anything").is_none());
    }

    #[test]
    fn command_debug_hides_handler() {
        let handler: Arc<dyn CommandHandler> = Arc::new(FnCommand::new(|v: Value| Ok(v)));
        let command = Command::new(CommandDescriptor::new("wc.count", "Count words"), handler);
        assert_eq!(command.id(), "wc.count");
        assert!(format!("{command:?}").contains("has_handler: true"));
    }
}
