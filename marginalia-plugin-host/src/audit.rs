//! Audit log of sandbox boundary crossings and policy changes.
//!
//! Every entry is also emitted through `tracing`: authorized calls on the
//! `marginalia::audit` target at `info`, denials and grant/revoke on
//! `marginalia::security` at `warn`. The in-memory ring buffer is bounded;
//! a retention of zero keeps nothing but still emits the events.

use chrono::{DateTime, Utc};
use marginalia_plugin_sdk::Namespace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub const DEFAULT_AUDIT_RETENTION: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    /// An authorized call was forwarded.
    Call,
    /// An unauthorized namespace was accessed or a stub method was invoked.
    Denied,
    /// The enforced policy changed (grant/revoke).
    Security,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub extension_id: String,
    pub namespace: Namespace,
    pub method: String,
    pub arguments: Value,
    pub kind: AuditKind,
}

#[derive(Debug, Default)]
struct AuditState {
    entries: VecDeque<AuditEntry>,
    next_sequence: u64,
    calls: u64,
    denied: u64,
    security: u64,
}

#[derive(Debug)]
pub struct AuditLog {
    enabled: bool,
    retention: usize,
    state: Mutex<AuditState>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(true, DEFAULT_AUDIT_RETENTION)
    }
}

impl AuditLog {
    pub fn new(enabled: bool, retention: usize) -> Self {
        Self {
            enabled,
            retention,
            state: Mutex::new(AuditState::default()),
        }
    }

    /// A log that only emits tracing events.
    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    fn lock(&self) -> MutexGuard<'_, AuditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_call(&self, extension_id: &str, namespace: Namespace, method: &str, arguments: Value) {
        info!(
            target: "marginalia::audit",
            extension_id = %extension_id,
            namespace = %namespace,
            method = %method,
            arguments = %arguments,
            "Capability call"
        );
        self.push(extension_id, namespace, method, arguments, AuditKind::Call);
    }

    pub fn record_denied(&self, extension_id: &str, namespace: Namespace, method: &str) {
        warn!(
            target: "marginalia::security",
            extension_id = %extension_id,
            namespace = %namespace,
            method = %method,
            "Unauthorized capability access"
        );
        self.push(extension_id, namespace, method, Value::Null, AuditKind::Denied);
    }

    /// `action` is `"grant"` or `"revoke"`; `applied` is whether the set changed.
    pub fn record_security(&self, extension_id: &str, namespace: Namespace, action: &str, applied: bool) {
        warn!(
            target: "marginalia::security",
            extension_id = %extension_id,
            namespace = %namespace,
            action = %action,
            applied,
            "Capability policy changed"
        );
        self.push(
            extension_id,
            namespace,
            action,
            serde_json::json!({ "applied": applied }),
            AuditKind::Security,
        );
    }

    fn push(&self, extension_id: &str, namespace: Namespace, method: &str, arguments: Value, kind: AuditKind) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        match kind {
            AuditKind::Call => state.calls += 1,
            AuditKind::Denied => state.denied += 1,
            AuditKind::Security => state.security += 1,
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        if self.retention == 0 {
            return;
        }
        if state.entries.len() == self.retention {
            state.entries.pop_front();
        }
        state.entries.push_back(AuditEntry {
            sequence,
            timestamp: Utc::now(),
            extension_id: extension_id.to_string(),
            namespace,
            method: method.to_string(),
            arguments,
            kind,
        });
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn entries_for(&self, extension_id: &str) -> Vec<AuditEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.extension_id == extension_id)
            .cloned()
            .collect()
    }

    /// Total entries of a kind ever recorded, including evicted ones.
    pub fn count(&self, kind: AuditKind) -> u64 {
        let state = self.lock();
        match kind {
            AuditKind::Call => state.calls,
            AuditKind::Denied => state.denied,
            AuditKind::Security => state.security,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}
