//! Manifest parsing as extension authors write it.

use marginalia_plugin_sdk::*;
use pretty_assertions::assert_eq;
use serde_json::json;

const DAILY_SUMMARY: &str = r#"{
    "id": "daily-summary",
    "name": "Daily Summary",
    "version": "1.2.0",
    "author": "Marginalia Labs",
    "entryPoint": "daily_summary",
    "description": "Summarizes today's notes",
    "dependencies": ["word-count"],
    "permissions": [
        { "type": "filesystem", "description": "Read notes" },
        { "type": "ui", "description": "Show the summary" },
        { "type": "network", "description": "Call the AI provider" }
    ],
    "settingsSchema": [
        { "key": "language", "type": "select", "default": "en", "options": ["en", "de"] },
        { "key": "maxNotes", "type": "number", "default": 20 }
    ],
    "commands": [
        { "id": "daily-summary.run", "name": "Summarize today", "shortcut": "Mod+Shift+S" }
    ],
    "views": [
        { "id": "daily-summary.panel", "name": "Summary", "location": "sidebar" }
    ],
    "processors": [
        { "id": "daily-summary.embed", "name": "Embed summary", "appliesTo": ["markdown"] }
    ],
    "aiIntegration": { "provider": "openai", "capabilities": ["summarize"] }
}"#;

#[test]
fn full_manifest_parses() {
    let manifest = ExtensionManifest::from_json(DAILY_SUMMARY).unwrap();

    assert_eq!(manifest.id, "daily-summary");
    assert_eq!(manifest.entry_point, "daily_summary");
    assert_eq!(manifest.dependencies, vec!["word-count"]);
    assert_eq!(
        manifest
            .permissions
            .iter()
            .map(|p| p.kind.clone())
            .collect::<Vec<_>>(),
        vec![
            PermissionKind::Filesystem,
            PermissionKind::Ui,
            PermissionKind::Network
        ]
    );
    assert_eq!(manifest.commands[0].shortcut.as_deref(), Some("Mod+Shift+S"));
    assert_eq!(manifest.views[0].location.as_deref(), Some("sidebar"));
    assert_eq!(manifest.processors[0].applies_to, vec!["markdown"]);
    assert!(manifest.declares_ai());
    assert!(manifest.missing_required_fields().is_empty());
}

#[test]
fn schema_defaults_are_exposed() {
    let manifest = ExtensionManifest::from_json(DAILY_SUMMARY).unwrap();
    let language = manifest.setting("language").unwrap();
    assert_eq!(language.kind, SettingType::Select);
    assert_eq!(language.default, Some(json!("en")));
    assert!(language.check(&json!("de")).is_ok());
    assert!(language.check(&json!("fr")).is_err());
}

#[test]
fn json_roundtrip_keeps_camel_case() {
    let manifest = ExtensionManifest::from_json(DAILY_SUMMARY).unwrap();
    let rendered = manifest.to_json().unwrap();
    assert!(rendered.contains("\"entryPoint\""));
    assert!(rendered.contains("\"settingsSchema\""));
    assert_eq!(ExtensionManifest::from_json(&rendered).unwrap(), manifest);
}

#[test]
fn malformed_json_is_an_error() {
    assert!(matches!(
        ExtensionManifest::from_json("{"),
        Err(ManifestError::Json(_))
    ));
    assert!(matches!(
        ExtensionManifest::from_toml("id = "),
        Err(ManifestError::Toml(_))
    ));
}

#[test]
fn manifest_only_package() {
    let manifest = ExtensionManifest {
        id: "word-count".into(),
        ..Default::default()
    };
    let package = ExtensionPackage::manifest_only(manifest);
    assert_eq!(package.id(), "word-count");
    assert!(package.extension.command_handler("anything").is_none());
}
