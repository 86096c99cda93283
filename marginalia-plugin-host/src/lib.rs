//! Extension host for Marginalia.
//!
//! Loads extension packages, checks them against policy and their declared
//! dependencies, and hands each one a sandboxed capability surface scoped to
//! its declared permissions. Every boundary crossing is audited.
//!
//! The sandbox is cooperative: extensions run in-process and are trusted
//! not to reach around the surface they are given.

mod audit;
mod config;
mod contributions;
mod error;
mod health;
mod manager;
mod permissions;
mod registry;
mod runtime;
mod sandbox;
mod surface;

pub use audit::{AuditEntry, AuditKind, AuditLog, DEFAULT_AUDIT_RETENTION};
pub use config::{
    AuditConfig, HealthConfig, HostConfig, PolicyConfig, PolicyEngine, PolicyMode, SandboxConfig,
    StorageConfig,
};
pub use contributions::{HostRegistry, RegisteredCommand, RemovedContributions};
pub use error::PluginHostError;
pub use health::{DEFAULT_ERROR_THRESHOLD, ExtensionHealth, ExtensionMetrics, HealthStatus};
pub use manager::{ExtensionManager, LifecycleState, LoadedExtension, RestoreReport};
pub use permissions::{NamespaceSet, PermissionReport, namespaces_for, validate_permissions};
pub use registry::{ManifestRegistry, RegistryIssue, check_manifest};
pub use runtime::PluginRuntime;
pub use sandbox::SandboxedSurface;
pub use surface::{
    EventBus, ExtensionSettings, FullSurface, HostServices, RegistryUi, ScopedEvents,
};
