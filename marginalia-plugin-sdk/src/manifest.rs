//! Extension manifest: the static descriptor an extension ships with.
//!
//! Manifests are camelCase JSON (or the same keys in TOML). Every list field
//! may be omitted. Required scalar fields also default to empty so a manifest
//! with a missing `id` still parses and is rejected by the host with a
//! precise message instead of a serde error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors parsing a manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid manifest TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

// ---- Manifest ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    /// Semver string.
    pub version: String,
    pub author: String,
    /// Reference the host resolves to the extension's code.
    pub entry_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub permissions: Vec<Permission>,
    pub settings_schema: Vec<SettingDescriptor>,
    pub commands: Vec<CommandDescriptor>,
    pub views: Vec<ViewDescriptor>,
    pub processors: Vec<ProcessorDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_integration: Option<AiIntegration>,
}

impl ExtensionManifest {
    pub fn from_json(source: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_toml(source: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Names of required fields that are empty.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        [
            ("id", &self.id),
            ("name", &self.name),
            ("version", &self.version),
            ("author", &self.author),
            ("entryPoint", &self.entry_point),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Setting keys declared more than once, in first-repeat order.
    pub fn duplicate_setting_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for descriptor in &self.settings_schema {
            if !seen.insert(descriptor.key.as_str()) && !duplicates.contains(&descriptor.key) {
                duplicates.push(descriptor.key.clone());
            }
        }
        duplicates
    }

    pub fn setting(&self, key: &str) -> Option<&SettingDescriptor> {
        self.settings_schema.iter().find(|s| s.key == key)
    }

    pub fn declares_ai(&self) -> bool {
        self.ai_integration.is_some()
    }
}

// ---- Permissions ----

/// A manifest-declared grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub kind: PermissionKind,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(kind: PermissionKind) -> Self {
        Self {
            kind,
            description: String::new(),
        }
    }
}

/// Permission types. Strings outside the known set are kept as
/// [`PermissionKind::Unknown`] so a manifest from a newer host still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionKind {
    Filesystem,
    Network,
    Ui,
    Settings,
    Analytics,
    Unknown(String),
}

impl PermissionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Network => "network",
            Self::Ui => "ui",
            Self::Settings => "settings",
            Self::Analytics => "analytics",
            Self::Unknown(other) => other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for PermissionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "filesystem" => Self::Filesystem,
            "network" => Self::Network,
            "ui" => Self::Ui,
            "settings" => Self::Settings,
            "analytics" => Self::Analytics,
            _ => Self::Unknown(value),
        }
    }
}

impl From<PermissionKind> for String {
    fn from(kind: PermissionKind) -> Self {
        match kind {
            PermissionKind::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- Settings schema ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Number,
    Boolean,
    /// One of the descriptor's `options`.
    Select,
    /// Any JSON value.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDescriptor {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: SettingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

impl SettingDescriptor {
    pub fn new(key: impl Into<String>, kind: SettingType) -> Self {
        Self {
            key: key.into(),
            kind,
            default: None,
            label: None,
            description: None,
            options: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Checks a value against the declared type. `null` is always accepted
    /// and means "reset to default".
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        let ok = match self.kind {
            SettingType::String => value.is_string(),
            SettingType::Number => value.is_number(),
            SettingType::Boolean => value.is_boolean(),
            SettingType::Select => self.options.is_empty() || self.options.contains(value),
            SettingType::Json => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "setting '{}' expects {:?}, got {}",
                self.key, self.kind, value
            ))
        }
    }
}

// ---- Contributions ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
}

impl CommandDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            shortcut: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescriptor {
    pub id: String,
    pub name: String,
    /// Host-defined placement hint such as `"sidebar"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A content processor hook (e.g. a markdown post-processor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Content kinds the processor applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies_to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiIntegration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn minimal_manifest_defaults_lists() {
        let manifest = ExtensionManifest::from_json(
            r#"{"id":"word-count","name":"Word Count","version":"1.0.0",
                "author":"me","entryPoint":"word_count",
                "permissions":[{"type":"settings"}]}"#,
        )
        .unwrap();

        assert!(manifest.commands.is_empty());
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.permissions[0].kind, PermissionKind::Settings);
        assert!(manifest.missing_required_fields().is_empty());
        assert!(!manifest.declares_ai());
    }

    #[test]
    fn missing_fields_are_reported_not_rejected() {
        let manifest = ExtensionManifest::from_json(r#"{"name":"x"}"#).unwrap();
        assert_eq!(
            manifest.missing_required_fields(),
            vec!["id", "version", "author", "entryPoint"]
        );
    }

    #[test]
    fn unknown_permission_type_is_preserved() {
        let permission: Permission =
            serde_json::from_value(json!({"type": "telepathy", "description": "?"})).unwrap();
        assert_eq!(permission.kind, PermissionKind::Unknown("telepathy".into()));
        assert!(!permission.kind.is_known());

        let back = serde_json::to_value(&permission).unwrap();
        assert_eq!(back["type"], "telepathy");
    }

    #[test]
    fn toml_manifest() {
        let manifest = ExtensionManifest::from_toml(
            r#"
id = "backlinks"
name = "Backlinks"
version = "0.2.0"
author = "me"
entryPoint = "backlinks"
dependencies = ["graph-core"]

[[permissions]]
type = "filesystem"
description = "read notes"

[[settingsSchema]]
key = "depth"
type = "number"
default = 2

[aiIntegration]
provider = "openai"
"#,
        )
        .unwrap();

        assert_eq!(manifest.dependencies, vec!["graph-core"]);
        assert_eq!(manifest.permissions[0].kind, PermissionKind::Filesystem);
        assert_eq!(manifest.setting("depth").unwrap().default, Some(json!(2)));
        assert!(manifest.declares_ai());
    }

    #[test]
    fn duplicate_setting_keys() {
        let manifest = ExtensionManifest {
            settings_schema: vec![
                SettingDescriptor::new("a", SettingType::String),
                SettingDescriptor::new("b", SettingType::String),
                SettingDescriptor::new("a", SettingType::Number),
                SettingDescriptor::new("a", SettingType::Boolean),
            ],
            ..Default::default()
        };
        assert_eq!(manifest.duplicate_setting_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn setting_type_checks() {
        let flag = SettingDescriptor::new("flag", SettingType::Boolean);
        assert!(flag.check(&json!(true)).is_ok());
        assert!(flag.check(&json!("true")).is_err());
        assert!(flag.check(&Value::Null).is_ok());

        let mut mode = SettingDescriptor::new("mode", SettingType::Select);
        mode.options = vec![json!("words"), json!("chars")];
        assert!(mode.check(&json!("chars")).is_ok());
        assert!(mode.check(&json!("lines")).is_err());
    }
}
