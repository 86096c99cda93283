//! Core value types for the Marginalia plugin runtime.
//!
//! This crate defines the small, dependency-free types shared by the store,
//! the extension SDK and the plugin host:
//! - Extension and command identifiers (plain strings, validated here)
//! - Event-bus subscription identifiers (UUID v7)
//! - Millisecond wall-clock timestamps
//! - The note, link and analysis values exchanged over the capability surface

mod ids;
mod note;
mod timestamp;

pub use ids::{validate_extension_id, CommandId, ExtensionId, SubscriptionId, MAX_ID_LEN};
pub use note::{Analysis, Link, Note, NoteUpdate, SearchResult, Severity};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid identifier '{id}': {reason}")]
    InvalidId { id: String, reason: String },
}
