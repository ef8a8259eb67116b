//! The provider side of a watcher
//!
//! A [`WatchSource`] knows how to fetch the current remote state of one
//! subscription and how to turn a detected change into a [`Message`]. The
//! [`Watcher`](crate::Watcher) decides when to fetch and what changed.

use std::time::Duration;

use async_trait::async_trait;
use webnodes_core::{
    diff::{ChangeRecord, DiffOptions, ListingEntry},
    ChangeEvent, Message, SubscriptionId, WatchState,
};

use crate::WatchError;

/// What one fetch returned
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// The full current listing, diffed against the stored entries
    Snapshot(Vec<ListingEntry>),
    /// Server-tagged records since the stored cursor, plus the next cursor
    ///
    /// An initial fetch (no stored cursor) returns the starting cursor with
    /// no records.
    Changes {
        records: Vec<ChangeRecord>,
        cursor: String,
    },
    /// The server invalidated the stored cursor; state must be rebuilt
    Reset,
}

/// A fetch result plus an optional scheduling hint
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub fetched: Fetched,
    /// Overrides the source interval for the next poll only
    pub next_poll: Option<Duration>,
}

impl FetchOutcome {
    pub fn snapshot(entries: Vec<ListingEntry>) -> Self {
        Self {
            fetched: Fetched::Snapshot(entries),
            next_poll: None,
        }
    }

    pub fn changes(records: Vec<ChangeRecord>, cursor: impl Into<String>) -> Self {
        Self {
            fetched: Fetched::Changes {
                records,
                cursor: cursor.into(),
            },
            next_poll: None,
        }
    }

    pub fn reset() -> Self {
        Self {
            fetched: Fetched::Reset,
            next_poll: None,
        }
    }

    /// Schedules the next poll after `delay` instead of the source interval
    pub fn poll_after(mut self, delay: Duration) -> Self {
        self.next_poll = Some(delay);
        self
    }
}

/// A remote resource that can be watched for changes
#[async_trait]
pub trait WatchSource: Send {
    /// Identifies what is being watched (bucket and pattern, folder, ...)
    fn subscription(&self) -> SubscriptionId;

    /// Delay between successful polls
    fn interval(&self) -> Duration;

    /// Filter and policies applied to fetched data
    fn diff_options(&self) -> DiffOptions {
        DiffOptions::default()
    }

    /// Fetches the current remote state
    ///
    /// `state` is the last successfully applied state; the source must not
    /// assume it will be updated if this call fails.
    async fn fetch(&mut self, state: &WatchState) -> Result<FetchOutcome, WatchError>;

    /// Builds the message emitted for one change
    fn message_for(&self, event: &ChangeEvent) -> Message {
        Message::from_change(event)
    }
}

/// Lets watchers of different providers share one collection
#[async_trait]
impl WatchSource for Box<dyn WatchSource> {
    fn subscription(&self) -> SubscriptionId {
        (**self).subscription()
    }

    fn interval(&self) -> Duration {
        (**self).interval()
    }

    fn diff_options(&self) -> DiffOptions {
        (**self).diff_options()
    }

    async fn fetch(&mut self, state: &WatchState) -> Result<FetchOutcome, WatchError> {
        (**self).fetch(state).await
    }

    fn message_for(&self, event: &ChangeEvent) -> Message {
        (**self).message_for(event)
    }
}
