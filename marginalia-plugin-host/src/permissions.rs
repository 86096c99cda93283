//! Permission-to-namespace mapping.
//!
//! | Permission | Namespaces       |
//! |------------|------------------|
//! | filesystem | `notes`, `graph` |
//! | network    | none             |
//! | ui         | `ui`             |
//! | settings   | `settings`       |
//! | analytics  | `events`         |
//!
//! `settings` is always granted. `ai` is granted exactly when the manifest
//! declares an AI integration.

use marginalia_plugin_sdk::{Namespace, Permission, PermissionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Namespaces a permission type opens.
pub fn namespaces_for(kind: &PermissionKind) -> &'static [Namespace] {
    match kind {
        PermissionKind::Filesystem => &[Namespace::Notes, Namespace::Graph],
        PermissionKind::Ui => &[Namespace::Ui],
        PermissionKind::Settings => &[Namespace::Settings],
        PermissionKind::Analytics => &[Namespace::Events],
        PermissionKind::Network | PermissionKind::Unknown(_) => &[],
    }
}

/// Namespaces currently granted to one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSet {
    granted: BTreeSet<Namespace>,
}

impl NamespaceSet {
    /// Only the always-granted `settings` namespace.
    pub fn baseline() -> Self {
        Self {
            granted: BTreeSet::from([Namespace::Settings]),
        }
    }

    /// Baseline plus everything the declared permissions map to.
    pub fn from_permissions(permissions: &[Permission], declares_ai: bool) -> Self {
        let mut set = Self::baseline();
        for permission in permissions {
            set.granted.extend(namespaces_for(&permission.kind));
        }
        if declares_ai {
            set.granted.insert(Namespace::Ai);
        }
        set
    }

    pub fn contains(&self, namespace: Namespace) -> bool {
        namespace == Namespace::Settings || self.granted.contains(&namespace)
    }

    /// Returns whether the set changed.
    pub fn grant(&mut self, namespace: Namespace) -> bool {
        self.granted.insert(namespace)
    }

    /// Returns whether the set changed. `settings` cannot be revoked.
    pub fn revoke(&mut self, namespace: Namespace) -> bool {
        if namespace == Namespace::Settings {
            return false;
        }
        self.granted.remove(&namespace)
    }

    pub fn to_vec(&self) -> Vec<Namespace> {
        self.granted.iter().copied().collect()
    }
}

/// Outcome of [`validate_permissions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionReport {
    /// False when an unknown permission type was declared.
    pub valid: bool,
    pub warnings: Vec<String>,
}

/// Flags unknown permission types and `network`, which no namespace gates
/// and so needs operator trust. Never rejects.
pub fn validate_permissions(permissions: &[Permission]) -> PermissionReport {
    let mut report = PermissionReport {
        valid: true,
        warnings: Vec::new(),
    };

    for permission in permissions {
        match &permission.kind {
            PermissionKind::Unknown(kind) => {
                report.valid = false;
                report
                    .warnings
                    .push(format!("unknown permission type '{kind}'"));
            }
            PermissionKind::Network => {
                report.warnings.push(
                    "'network' cannot be enforced by the sandbox and requires operator trust"
                        .to_string(),
                );
            }
            _ => {}
        }
    }
    report
}
