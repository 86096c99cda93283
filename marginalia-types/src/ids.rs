//! Identifier types used by the plugin runtime.
//!
//! Extension and command ids are author-chosen strings (they appear in
//! manifests and in the persisted loaded-set), so they stay plain `String`s
//! and are checked with [`validate_extension_id`]. Event-bus subscriptions are
//! host-generated and use UUID v7.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique, stable identifier of an extension (e.g. `"word-count"`).
pub type ExtensionId = String;

/// Identifier of a command, flat across the host command registry.
pub type CommandId = String;

/// Longest extension id accepted by [`validate_extension_id`].
pub const MAX_ID_LEN: usize = 128;

/// Checks that an extension id is usable as a registry and storage key.
///
/// Ids must be non-empty, at most [`MAX_ID_LEN`] bytes, start with an ASCII
/// alphanumeric character and otherwise contain only ASCII alphanumerics,
/// `.`, `-` or `_`.
pub fn validate_extension_id(id: &str) -> Result<(), Error> {
    let invalid = |reason: &str| Error::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("id is empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid("id is too long"));
    }
    if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("id must start with a letter or digit"));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(invalid(&format!("unexpected character '{c}'")));
    }
    Ok(())
}

/// Handle returned by the event bus when a handler is subscribed.
/// Uses UUID v7 so handles sort by subscription time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a new subscription id with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The nil id, handed out by stubs that never register anything.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true for the nil id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
