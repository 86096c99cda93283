//! Catalog of installable extensions.
//!
//! The registry is static data: packages keyed by manifest id, in insertion
//! order. It validates manifests and their dependency graph but never loads
//! anything; the manager consumes it on restore.

use crate::error::PluginHostError;
use crate::permissions::validate_permissions;
use marginalia_plugin_sdk::{ExtensionManifest, ExtensionPackage};
use marginalia_types::validate_extension_id;
use std::collections::{HashMap, HashSet};

/// Load-time checks on a single manifest: required fields present and
/// settings keys unique.
pub fn check_manifest(manifest: &ExtensionManifest) -> Result<(), PluginHostError> {
    let invalid = |reason: String| PluginHostError::InvalidManifest {
        extension_id: manifest.id.clone(),
        reason,
    };

    let missing = manifest.missing_required_fields();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let duplicates = manifest.duplicate_setting_keys();
    if !duplicates.is_empty() {
        return Err(invalid(format!(
            "duplicate settings key(s): {}",
            duplicates.join(", ")
        )));
    }
    Ok(())
}

/// One problem found by [`ManifestRegistry::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryIssue {
    pub extension_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    packages: Vec<ExtensionPackage>,
    index: HashMap<String, usize>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package. Ids must be unique.
    pub fn insert(&mut self, package: ExtensionPackage) -> Result<(), PluginHostError> {
        let id = package.id().to_string();
        if self.index.contains_key(&id) {
            return Err(PluginHostError::DuplicateManifest(id));
        }
        self.index.insert(id, self.packages.len());
        self.packages.push(package);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<ExtensionPackage> {
        let position = self.index.remove(id)?;
        let package = self.packages.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(package)
    }

    pub fn get(&self, id: &str) -> Option<&ExtensionPackage> {
        self.index.get(id).map(|&i| &self.packages[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionPackage> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Checks every manifest and the dependency graph. Returns every issue
    /// found; an empty list means the registry is consistent.
    pub fn validate(&self) -> Vec<RegistryIssue> {
        let mut issues = Vec::new();
        let mut issue = |id: &str, message: String| {
            issues.push(RegistryIssue {
                extension_id: id.to_string(),
                message,
            })
        };

        for package in &self.packages {
            let manifest = &package.manifest;
            let id = manifest.id.as_str();

            if let Err(e) = check_manifest(manifest) {
                issue(id, e.to_string());
            }
            if let Err(e) = validate_extension_id(id) {
                issue(id, e.to_string());
            }
            if !manifest.version.is_empty() {
                if let Err(e) = semver::Version::parse(&manifest.version) {
                    issue(id, format!("version '{}' is not semver: {e}", manifest.version));
                }
            }
            for warning in validate_permissions(&manifest.permissions).warnings {
                issue(id, warning);
            }
            for dependency in &manifest.dependencies {
                if dependency == id {
                    issue(id, "depends on itself".to_string());
                } else if !self.contains(dependency) {
                    issue(id, format!("dependency '{dependency}' is not in the registry"));
                }
            }
        }

        if let Err(PluginHostError::DependencyCycle(path)) = self.load_order(&self.ids()) {
            issue(path.split(" -> ").next().unwrap_or_default(), format!("dependency cycle: {path}"));
        }
        issues
    }

    /// Orders `ids` so every dependency inside the registry comes before its
    /// dependents; otherwise keeps the input order. Ids not in the registry
    /// are passed through in place. Dependencies not listed in `ids` are not
    /// added.
    pub fn load_order(&self, ids: &[String]) -> Result<Vec<String>, PluginHostError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut ordered = Vec::with_capacity(ids.len());
        let mut done: HashSet<String> = HashSet::new();

        for id in ids {
            let mut path = Vec::new();
            self.visit(id, &wanted, &mut done, &mut path, &mut ordered)?;
        }
        Ok(ordered)
    }

    fn visit(
        &self,
        id: &str,
        wanted: &HashSet<&str>,
        done: &mut HashSet<String>,
        path: &mut Vec<String>,
        ordered: &mut Vec<String>,
    ) -> Result<(), PluginHostError> {
        if done.contains(id) {
            return Ok(());
        }
        if path.iter().any(|p| p == id) {
            path.push(id.to_string());
            let start = path.iter().position(|p| p == id).unwrap_or(0);
            return Err(PluginHostError::DependencyCycle(path[start..].join(" -> ")));
        }

        path.push(id.to_string());
        if let Some(package) = self.get(id) {
            for dependency in &package.manifest.dependencies {
                if wanted.contains(dependency.as_str()) {
                    self.visit(dependency, wanted, done, path, ordered)?;
                }
            }
        }
        path.pop();

        done.insert(id.to_string());
        ordered.push(id.to_string());
        Ok(())
    }
}
