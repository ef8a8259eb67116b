//! Change events produced by watchers

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of difference between two observations of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The item was not present before
    #[serde(rename = "add")]
    Added,
    /// The item was present before with different metadata
    #[serde(rename = "change")]
    Changed,
    /// The item is no longer present
    #[serde(rename = "delete")]
    Deleted,
}

impl ChangeKind {
    /// Wire name used in the `event` field of emitted messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "add",
            ChangeKind::Changed => "change",
            ChangeKind::Deleted => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected difference
///
/// Produced transiently per poll cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Identifier of the item within the watched resource (key, path, id)
    pub item_id: String,
    /// Display name derived from `item_id`
    pub item_name: String,
    /// Item-specific metadata
    pub payload: Value,
}

impl ChangeEvent {
    /// Creates an event, deriving the display name from the identifier
    pub fn new(kind: ChangeKind, item_id: impl Into<String>, payload: Value) -> Self {
        let item_id = item_id.into();
        let item_name = display_name(&item_id).to_string();
        Self {
            kind,
            item_id,
            item_name,
            payload,
        }
    }

    pub fn added(item_id: impl Into<String>, payload: Value) -> Self {
        Self::new(ChangeKind::Added, item_id, payload)
    }

    pub fn changed(item_id: impl Into<String>, payload: Value) -> Self {
        Self::new(ChangeKind::Changed, item_id, payload)
    }

    pub fn deleted(item_id: impl Into<String>, payload: Value) -> Self {
        Self::new(ChangeKind::Deleted, item_id, payload)
    }
}

/// Last path segment of an identifier, ignoring a trailing separator
///
/// `photos/2024/beach.jpg` -> `beach.jpg`, `photos/2024/` -> `2024`.
pub fn display_name(item_id: &str) -> &str {
    let trimmed = item_id.trim_end_matches('/');
    if trimmed.is_empty() {
        return item_id;
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
