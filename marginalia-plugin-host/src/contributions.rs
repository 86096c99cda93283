//! Host-level registry of extension contributions: commands, views and
//! processors.
//!
//! Command ids are flat at the host level. When two extensions register the
//! same id, both entries are kept in registration order and the most recent
//! one is discoverable. Unloading an extension removes exactly its own
//! entries, which makes a shadowed registration discoverable again.

use marginalia_plugin_sdk::{Command, ProcessorDescriptor, ViewDescriptor};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// A discoverable command and the extension that owns it.
#[derive(Debug, Clone)]
pub struct RegisteredCommand {
    pub owner: String,
    pub command: Command,
}

/// Counts of entries removed by [`HostRegistry::unregister_owner`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedContributions {
    pub commands: usize,
    pub views: usize,
    pub processors: usize,
}

#[derive(Debug, Default)]
struct Contributions {
    /// Owner stack per command id; last entry is discoverable.
    commands: HashMap<String, Vec<RegisteredCommand>>,
    /// Registration order of command ids, for stable listing.
    command_order: Vec<String>,
    views: Vec<(String, ViewDescriptor)>,
    processors: Vec<(String, ProcessorDescriptor)>,
}

#[derive(Debug, Default)]
pub struct HostRegistry {
    inner: Mutex<Contributions>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Contributions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a command under `owner`. A second registration of the same
    /// id by the same owner replaces its earlier one. Returns the owner that
    /// is now shadowed, if any.
    pub fn register_command(&self, owner: &str, command: Command) -> Option<String> {
        let mut inner = self.lock();
        let id = command.id().to_string();
        if !inner.command_order.contains(&id) {
            inner.command_order.push(id.clone());
        }

        let stack = inner.commands.entry(id.clone()).or_default();
        stack.retain(|entry| entry.owner != owner);
        let shadowed = stack.last().map(|entry| entry.owner.clone());
        stack.push(RegisteredCommand {
            owner: owner.to_string(),
            command,
        });

        if let Some(previous) = &shadowed {
            warn!(
                command_id = %id,
                extension_id = %owner,
                shadowed = %previous,
                "Command id collision, most recent registration wins"
            );
        }
        shadowed
    }

    /// The discoverable registration for a command id.
    pub fn resolve_command(&self, command_id: &str) -> Option<RegisteredCommand> {
        self.lock()
            .commands
            .get(command_id)
            .and_then(|stack| stack.last())
            .cloned()
    }

    pub fn register_view(&self, owner: &str, view: ViewDescriptor) {
        let mut inner = self.lock();
        inner
            .views
            .retain(|(o, existing)| !(o == owner && existing.id == view.id));
        inner.views.push((owner.to_string(), view));
    }

    pub fn register_processor(&self, owner: &str, processor: ProcessorDescriptor) {
        let mut inner = self.lock();
        inner
            .processors
            .retain(|(o, existing)| !(o == owner && existing.id == processor.id));
        inner.processors.push((owner.to_string(), processor));
    }

    /// Removes every contribution owned by `owner`.
    pub fn unregister_owner(&self, owner: &str) -> RemovedContributions {
        let mut inner = self.lock();
        let mut removed = RemovedContributions::default();

        for stack in inner.commands.values_mut() {
            let before = stack.len();
            stack.retain(|entry| entry.owner != owner);
            removed.commands += before - stack.len();
        }
        inner.commands.retain(|_, stack| !stack.is_empty());
        let Contributions {
            commands,
            command_order,
            ..
        } = &mut *inner;
        command_order.retain(|id| commands.contains_key(id));

        let before = inner.views.len();
        inner.views.retain(|(o, _)| o != owner);
        removed.views = before - inner.views.len();

        let before = inner.processors.len();
        inner.processors.retain(|(o, _)| o != owner);
        removed.processors = before - inner.processors.len();

        removed
    }

    /// Discoverable commands in first-registration order of their ids.
    pub fn commands(&self) -> Vec<RegisteredCommand> {
        let inner = self.lock();
        inner
            .command_order
            .iter()
            .filter_map(|id| inner.commands.get(id).and_then(|s| s.last()).cloned())
            .collect()
    }

    /// Command ids registered by one extension, shadowed or not.
    pub fn commands_of(&self, owner: &str) -> Vec<String> {
        let inner = self.lock();
        inner
            .command_order
            .iter()
            .filter(|id| {
                inner
                    .commands
                    .get(*id)
                    .is_some_and(|s| s.iter().any(|e| e.owner == owner))
            })
            .cloned()
            .collect()
    }

    pub fn views(&self) -> Vec<(String, ViewDescriptor)> {
        self.lock().views.clone()
    }

    pub fn processors(&self) -> Vec<(String, ProcessorDescriptor)> {
        self.lock().processors.clone()
    }
}
