//! Change classification for the poll/diff/emit loop
//!
//! Two shapes of remote API are supported:
//!
//! - **Snapshot** APIs return the full current listing. [`diff_snapshot`]
//!   compares it against the entries stored in the [`WatchState`] and yields
//!   added / changed / deleted events.
//! - **Change-feed** APIs return only what changed since a cursor, each record
//!   tagged by the server. [`classify_changes`] maps the tags to events
//!   without diffing.
//!
//! In both cases the [`PathFilter`] only gates emission; bookkeeping always
//! covers every item so that a filter change never replays history.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::domain::{ChangeEvent, WatchState};
use crate::filter::PathFilter;

/// One item of a full remote listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    /// Identifier within the watched resource
    pub id: String,
    /// Metadata compared between polls and kept in the watch state
    pub metadata: Value,
    /// Value emitted with `added` / `changed` events
    pub payload: Value,
}

impl ListingEntry {
    /// An entry whose emitted payload is its metadata
    pub fn new(id: impl Into<String>, metadata: Value) -> Self {
        Self {
            id: id.into(),
            payload: metadata.clone(),
            metadata,
        }
    }

    /// An entry with a payload distinct from the compared metadata
    pub fn with_payload(id: impl Into<String>, metadata: Value, payload: Value) -> Self {
        Self {
            id: id.into(),
            metadata,
            payload,
        }
    }
}

/// One record of an incremental change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub id: String,
    /// Set when the server tagged the record as a deletion
    pub deleted: bool,
    pub payload: Value,
}

/// Whether a metadata difference on a known item is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangePolicy {
    /// Only additions and deletions produce events
    #[default]
    IgnoreMetadata,
    /// A metadata difference produces a `changed` event
    ReportChanged,
}

/// What happens on the first successful snapshot of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaselinePolicy {
    /// The first snapshot only seeds the state
    #[default]
    Silent,
    /// Every item of the first snapshot is reported as `added`
    Emit,
}

/// Per-module diffing options
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub filter: PathFilter,
    pub change_policy: ChangePolicy,
    pub baseline: BaselinePolicy,
}

/// Events produced by one snapshot comparison plus the replacement entries
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub events: Vec<ChangeEvent>,
    pub entries: HashMap<String, Value>,
}

/// Compares a full listing against the previous snapshot
///
/// Events are ordered: additions and changes in listing order, then
/// deletions sorted by identifier. Metadata is compared structurally, so
/// JSON field order never produces a spurious `changed`. Duplicate ids in
/// the listing are reported once.
pub fn diff_snapshot(
    state: &WatchState,
    listing: &[ListingEntry],
    options: &DiffOptions,
) -> SnapshotDiff {
    let previous = state.entries();
    let baseline = !state.is_initialized();
    let mut unseen: HashSet<&str> = previous.keys().map(String::as_str).collect();
    let mut entries = HashMap::with_capacity(listing.len());
    let mut events = Vec::new();

    for entry in listing {
        if entries.contains_key(&entry.id) {
            debug!(id = %entry.id, "Duplicate id in listing, ignoring");
            continue;
        }
        entries.insert(entry.id.clone(), entry.metadata.clone());

        let event = if baseline {
            (options.baseline == BaselinePolicy::Emit)
                .then(|| ChangeEvent::added(&entry.id, entry.payload.clone()))
        } else {
            match previous.get(&entry.id) {
                Some(old) => {
                    unseen.remove(entry.id.as_str());
                    (options.change_policy == ChangePolicy::ReportChanged
                        && *old != entry.metadata)
                        .then(|| ChangeEvent::changed(&entry.id, entry.payload.clone()))
                }
                None => Some(ChangeEvent::added(&entry.id, entry.payload.clone())),
            }
        };

        if let Some(event) = event {
            if options.filter.matches(&event.item_id) {
                events.push(event);
            }
        }
    }

    if !baseline {
        let mut gone: Vec<&str> = unseen.into_iter().collect();
        gone.sort_unstable();
        for id in gone {
            if options.filter.matches(id) {
                let last = previous.get(id).cloned().unwrap_or(Value::Null);
                events.push(ChangeEvent::deleted(id, last));
            }
        }
    }

    debug!(
        subscription = %state.subscription_id(),
        listed = listing.len(),
        events = events.len(),
        baseline,
        "Snapshot diff complete"
    );

    SnapshotDiff { events, entries }
}

/// Maps server-tagged change records to events, dropping filtered ids
pub fn classify_changes(records: Vec<ChangeRecord>, filter: &PathFilter) -> Vec<ChangeEvent> {
    records
        .into_iter()
        .filter(|r| filter.matches(&r.id))
        .map(|r| {
            if r.deleted {
                ChangeEvent::deleted(r.id, r.payload)
            } else {
                ChangeEvent::added(r.id, r.payload)
            }
        })
        .collect()
}
