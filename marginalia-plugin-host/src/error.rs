//! Error types for the plugin host.

use marginalia_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginHostError {
    #[error("invalid manifest for '{extension_id}': {reason}")]
    InvalidManifest {
        extension_id: String,
        reason: String,
    },

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("extension already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("cannot load '{extension_id}': dependency '{dependency}' is not loaded")]
    MissingDependency {
        extension_id: String,
        dependency: String,
    },

    #[error("extension not found: {0}")]
    NotFound(String),

    #[error("manifest already registered: {0}")]
    DuplicateManifest(String),

    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command '{command_id}' of '{extension_id}' failed: {message}")]
    CommandFailed {
        extension_id: String,
        command_id: String,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PluginHostError {
    /// True for the four load-time validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidManifest { .. }
                | Self::PolicyDenied(_)
                | Self::AlreadyLoaded(_)
                | Self::MissingDependency { .. }
        )
    }
}
