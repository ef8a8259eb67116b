//! webnodes Watch - the poll/diff/emit loop
//!
//! Provides:
//! - A [`WatchSource`] abstraction over snapshot and change-feed APIs
//! - The [`Watcher`] loop that owns one [`WatchState`](webnodes_core::WatchState)
//! - Error backoff honoring server-provided retry hints
//! - A channel-backed [`NodeContext`](webnodes_core::ports::NodeContext)
//!
//! ## Modules
//!
//! - [`source`] - What a provider implements to be watched
//! - [`runner`] - The watcher task, its phases and its handle
//! - [`retry`] - Delay computation after failed fetches
//! - [`context`] - Host context that forwards node output over an mpsc channel

pub mod context;
pub mod retry;
pub mod runner;
pub mod source;

use std::time::Duration;

use thiserror::Error;
use webnodes_core::{DomainError, NodeError};

pub use context::{ChannelContext, NodeEvent};
pub use retry::RetryPolicy;
pub use runner::{WatchPhase, Watcher, WatcherHandle};
pub use source::{FetchOutcome, Fetched, WatchSource};

/// Errors that end a single watch cycle
///
/// None of these stop the watcher; the loop reports them and schedules the
/// next attempt.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The remote fetch failed
    #[error("{error}")]
    Fetch {
        error: NodeError,
        /// Server-provided delay before the next attempt
        retry_after: Option<Duration>,
    },

    /// The fetched data could not be applied to the watch state
    #[error("Invalid watch state: {0}")]
    State(#[from] DomainError),
}

impl WatchError {
    /// A failed fetch without a server retry hint
    pub fn fetch(error: impl Into<NodeError>) -> Self {
        WatchError::Fetch {
            error: error.into(),
            retry_after: None,
        }
    }

    /// A failed fetch the server asked to retry after `delay`
    pub fn retry_after(error: impl Into<NodeError>, delay: Duration) -> Self {
        WatchError::Fetch {
            error: error.into(),
            retry_after: Some(delay),
        }
    }

    /// The node-level error this maps to when reported to the host
    pub fn node_error(&self) -> NodeError {
        match self {
            WatchError::Fetch { error, .. } => error.clone(),
            WatchError::State(e) => NodeError::malformed(e.to_string()),
        }
    }
}

impl From<NodeError> for WatchError {
    fn from(error: NodeError) -> Self {
        WatchError::fetch(error)
    }
}
