//! Last observed remote state for one polling subscription

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;

/// Opaque key identifying the watched resource (bucket+pattern, folder path, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Creates a subscription id
    ///
    /// # Errors
    /// Returns error if the id is empty
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidSubscriptionId(
                "Subscription id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubscriptionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubscriptionId> for String {
    fn from(id: SubscriptionId) -> Self {
        id.0
    }
}

/// Snapshot used to compute the next diff
///
/// Owned exclusively by one watcher task. A failed fetch never touches it;
/// a successful one replaces `entries` wholesale (snapshot sources) or
/// advances `cursor` (change-feed sources).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchState {
    subscription_id: SubscriptionId,
    /// item id -> last known metadata fingerprint
    entries: HashMap<String, Value>,
    cursor: Option<String>,
    initialized: bool,
    last_polled: Option<DateTime<Utc>>,
}

impl WatchState {
    /// Initial, empty state for a freshly started watcher
    pub fn new(subscription_id: SubscriptionId) -> Self {
        Self {
            subscription_id,
            entries: HashMap::new(),
            cursor: None,
            initialized: false,
            last_polled: None,
        }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    pub fn entries(&self) -> &HashMap<String, Value> {
        &self.entries
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Whether a baseline observation has been recorded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_polled(&self) -> Option<DateTime<Utc>> {
        self.last_polled
    }

    /// Replaces the snapshot after a successful full listing
    pub fn replace_entries(&mut self, entries: HashMap<String, Value>) {
        self.entries = entries;
        self.mark_polled();
    }

    /// Stores the continuation token returned by a change feed
    ///
    /// # Errors
    /// Returns error if the cursor is empty
    pub fn advance_cursor(&mut self, cursor: impl Into<String>) -> Result<(), DomainError> {
        let cursor = cursor.into();
        if cursor.is_empty() {
            return Err(DomainError::InvalidCursor(
                "Cursor cannot be empty".to_string(),
            ));
        }
        self.cursor = Some(cursor);
        self.mark_polled();
        Ok(())
    }

    /// Discards everything observed so far (server-side reset)
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.initialized = false;
    }

    fn mark_polled(&mut self) {
        self.initialized = true;
        self.last_polled = Some(Utc::now());
    }
}
