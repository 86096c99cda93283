//! Values exchanged with the host collaborators (note store, link graph,
//! AI provider, UI). The runtime only passes these through; it never
//! interprets note content.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// A note as returned by the host note store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Note {
    /// A note that was never handed to the store. It has an empty id.
    #[must_use]
    pub fn unsaved(name: &str, content: &str, folder: Option<&str>) -> Self {
        let now = Timestamp::now();
        Self {
            id: String::new(),
            name: name.to_string(),
            content: content.to_string(),
            folder: folder.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    /// True if this note has a store-assigned id.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Partial update applied by `notes.update`. `None` fields are left as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// One hit from `notes.search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub note_id: String,
    pub name: String,
    #[serde(default)]
    pub snippet: String,
    pub score: f64,
}

/// A directed link between two notes in the graph engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Result of `ai.analyzeContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub suggested_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
}

/// Notification severity for `ui.showNotification`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}
