//! Dropbox folder watcher
//!
//! Cursor-based: the first cycle takes the latest cursor of the folder
//! without listing it, so nothing is emitted for files that already exist.
//! Every later cycle long-polls with the cursor and, when the server reports
//! changes, pages through `list_folder/continue` until `has_more` is false.
//! A `reset` error discards the cursor and starts over.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webnodes_core::{
    diff::DiffOptions, filter::PathFilter, NodeError, SubscriptionId, WatchState,
};
use webnodes_watch::{FetchOutcome, WatchError, WatchSource};

use super::{change_record, is_reset, DropboxClient, DropboxSession};
use crate::ApiError;

/// Watches a folder (recursively) for added and deleted entries
pub struct DropboxWatch {
    session: Arc<dyn DropboxSession>,
    path: String,
    subscription: SubscriptionId,
    options: DiffOptions,
    min_interval: Duration,
}

impl DropboxWatch {
    /// `path` is the folder to watch; empty or `/` is the root
    pub fn new(
        session: Arc<dyn DropboxSession>,
        path: &str,
        filter: PathFilter,
    ) -> Result<Self, NodeError> {
        let path = normalize_path(path);
        let subscription = SubscriptionId::new(format!(
            "dropbox:{path}{}",
            filter.pattern().map(|p| format!(":{p}")).unwrap_or_default()
        ))?;

        Ok(Self {
            session,
            path,
            subscription,
            options: DiffOptions {
                filter,
                ..DiffOptions::default()
            },
            min_interval: Duration::ZERO,
        })
    }

    /// Minimum pause between long-poll cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn poll(
        &self,
        client: &DropboxClient,
        cursor: Option<&str>,
    ) -> Result<FetchOutcome, ApiError> {
        let Some(cursor) = cursor else {
            let cursor = client.get_latest_cursor(&self.path).await?;
            info!(path = %self.path, "Obtained Dropbox cursor");
            return Ok(FetchOutcome::changes(Vec::new(), cursor).poll_after(self.min_interval));
        };

        let longpoll = client.longpoll(cursor).await?;
        let wait = Duration::from_secs(longpoll.backoff.unwrap_or(0)).max(self.min_interval);
        if let Some(backoff) = longpoll.backoff {
            debug!(backoff, "Dropbox requested long-poll backoff");
        }
        if !longpoll.changes {
            return Ok(FetchOutcome::changes(Vec::new(), cursor).poll_after(wait));
        }

        let mut records = Vec::new();
        let mut cursor = cursor.to_string();
        loop {
            let page = client.list_folder_continue(&cursor).await?;
            records.extend(page.entries.into_iter().filter_map(change_record));
            cursor = page.cursor;
            if !page.has_more {
                break;
            }
        }
        debug!(path = %self.path, records = records.len(), "Fetched Dropbox changes");
        Ok(FetchOutcome::changes(records, cursor).poll_after(wait))
    }
}

#[async_trait]
impl WatchSource for DropboxWatch {
    fn subscription(&self) -> SubscriptionId {
        self.subscription.clone()
    }

    /// The long-poll paces the loop; this only applies when no hint is given
    fn interval(&self) -> Duration {
        self.min_interval
    }

    fn diff_options(&self) -> DiffOptions {
        self.options.clone()
    }

    async fn fetch(&mut self, state: &WatchState) -> Result<FetchOutcome, WatchError> {
        let client = self.session.client().await?;
        match self.poll(&client, state.cursor()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if is_reset(&e) => {
                warn!(path = %self.path, "Dropbox cursor reset, starting over");
                Ok(FetchOutcome::reset())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim().trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
