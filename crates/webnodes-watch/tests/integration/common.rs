//! Shared test helpers for watcher integration tests
//!
//! [`ScriptedSource`] replays a fixed list of fetch outcomes and records the
//! state it was handed on every fetch, so tests can assert both what was
//! emitted and what the watcher believed at each step.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::{sync::mpsc::UnboundedReceiver, time::Instant};
use webnodes_core::{
    diff::{DiffOptions, ListingEntry},
    ChangeKind, SubscriptionId, WatchState,
};
use webnodes_watch::{FetchOutcome, NodeEvent, WatchError, WatchSource};

/// One scripted step
pub enum Step {
    /// Return this result immediately
    Now(Result<FetchOutcome, WatchError>),
    /// Return this result after a delay
    After(Duration, Result<FetchOutcome, WatchError>),
}

/// What the source observed on one fetch
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub at: Instant,
    pub entries: usize,
    pub cursor: Option<String>,
}

pub struct ScriptedSource {
    steps: VecDeque<Step>,
    interval: Duration,
    options: DiffOptions,
    log: Arc<Mutex<Vec<FetchRecord>>>,
}

impl ScriptedSource {
    pub fn new(interval: Duration, steps: Vec<Step>) -> (Self, Arc<Mutex<Vec<FetchRecord>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = Self {
            steps: steps.into(),
            interval,
            options: DiffOptions::default(),
            log: log.clone(),
        };
        (source, log)
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl WatchSource for ScriptedSource {
    fn subscription(&self) -> SubscriptionId {
        SubscriptionId::new("scripted").unwrap()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn diff_options(&self) -> DiffOptions {
        self.options.clone()
    }

    async fn fetch(&mut self, state: &WatchState) -> Result<FetchOutcome, WatchError> {
        self.log.lock().unwrap().push(FetchRecord {
            at: Instant::now(),
            entries: state.entries().len(),
            cursor: state.cursor().map(str::to_string),
        });

        match self.steps.pop_front() {
            Some(Step::Now(result)) => result,
            Some(Step::After(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            // Script exhausted: hang until the watcher is stopped
            None => std::future::pending().await,
        }
    }
}

pub fn entry(id: &str) -> ListingEntry {
    ListingEntry::new(id, json!({ "etag": format!("\"{id}\"") }))
}

pub fn snapshot(ids: &[&str]) -> Step {
    Step::Now(Ok(FetchOutcome::snapshot(ids.iter().map(|id| entry(id)).collect())))
}

/// Waits for the next emitted message and returns its event kind and payload
pub async fn next_message(rx: &mut UnboundedReceiver<NodeEvent>) -> (ChangeKind, String) {
    loop {
        let event = rx.recv().await.expect("event channel closed");
        if let Some(msg) = event.as_message() {
            return (
                msg.event.expect("watcher messages carry an event"),
                msg.payload_str().unwrap_or_default().to_string(),
            );
        }
    }
}

/// Drains everything currently queued
pub fn drain(rx: &mut UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
