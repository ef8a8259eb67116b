//! The watcher task
//!
//! A [`Watcher`] owns one [`WatchSource`] and its [`WatchState`]. Each cycle
//! fetches, diffs against the stored state, emits one message per change and
//! stores the new state. A failed fetch leaves the state untouched and the
//! next attempt is scheduled after the retry backoff.
//!
//! ```text
//! Idle ──→ Fetching ──→ Diffing ──────────→ Idle
//!              │
//!              ├──→ FetchFailed ──────────→ Idle (after backoff)
//!              └──→ ReInitializing ──────→ Fetching (state discarded)
//! ```
//!
//! `Stopped` is reached only through cancellation. A fetch that is in flight
//! when the watcher is stopped is dropped and nothing is emitted.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webnodes_core::{
    diff::{classify_changes, diff_snapshot, BaselinePolicy},
    ports::{report_failure, NodeContext, NodeStatus},
    ChangeEvent, SubscriptionId, WatchState,
};

use crate::{
    retry::RetryPolicy,
    source::{FetchOutcome, Fetched, WatchSource},
    WatchError,
};

/// Where a watcher is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchPhase {
    Idle,
    Fetching,
    Diffing,
    FetchFailed,
    ReInitializing,
    Stopped,
}

// ============================================================================
// Watcher
// ============================================================================

/// Polls one source and emits what changed
pub struct Watcher<S> {
    source: S,
    state: WatchState,
    retry: RetryPolicy,
    phase: watch::Sender<WatchPhase>,
    consecutive_resets: u32,
}

impl<S: WatchSource> Watcher<S> {
    pub fn new(source: S) -> Self {
        let state = WatchState::new(source.subscription());
        let (phase, _) = watch::channel(WatchPhase::Idle);
        Self {
            source,
            state,
            retry: RetryPolicy::default(),
            phase,
            consecutive_resets: 0,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn phase(&self) -> WatchPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: WatchPhase) {
        self.phase.send_replace(phase);
    }

    /// Runs a single fetch/diff/emit cycle and returns the delay before the next
    pub async fn poll_once(&mut self, ctx: &dyn NodeContext) -> Duration {
        self.begin_fetch(ctx);
        let result = self.source.fetch(&self.state).await;
        self.apply(result, ctx)
    }

    /// Polls until `cancel` fires, then returns the final state
    ///
    /// The first fetch starts immediately.
    pub async fn run(mut self, ctx: &dyn NodeContext, cancel: CancellationToken) -> WatchState {
        info!(
            subscription = %self.state.subscription_id(),
            node = ctx.node_id(),
            interval_secs = self.source.interval().as_secs(),
            "Starting watcher"
        );

        let mut delay = Duration::ZERO;
        loop {
            if !delay.is_zero() {
                self.set_phase(WatchPhase::Idle);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            self.begin_fetch(ctx);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.source.fetch(&self.state) => Some(result),
            };
            let Some(result) = result else {
                debug!(
                    subscription = %self.state.subscription_id(),
                    "Stopped during fetch, discarding result"
                );
                break;
            };

            delay = self.apply(result, ctx);
        }

        self.set_phase(WatchPhase::Stopped);
        ctx.status(NodeStatus::clear());
        info!(subscription = %self.state.subscription_id(), "Watcher stopped");
        self.state
    }

    fn begin_fetch(&self, ctx: &dyn NodeContext) {
        self.set_phase(WatchPhase::Fetching);
        let text = if self.state.is_initialized() {
            "polling"
        } else {
            "connecting"
        };
        ctx.status(NodeStatus::busy(text));
    }

    fn apply(
        &mut self,
        result: Result<FetchOutcome, WatchError>,
        ctx: &dyn NodeContext,
    ) -> Duration {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e, ctx),
        };
        let next_poll = outcome.next_poll.unwrap_or_else(|| self.source.interval());

        match outcome.fetched {
            Fetched::Reset => {
                self.set_phase(WatchPhase::ReInitializing);
                self.consecutive_resets += 1;
                info!(
                    subscription = %self.state.subscription_id(),
                    resets = self.consecutive_resets,
                    "Server reset the watch state, re-initializing"
                );
                self.state.reset();
                // A second reset in a row means the fresh baseline was
                // rejected too, so back off instead of spinning.
                if self.consecutive_resets > 1 {
                    return self.retry.backoff();
                }
                return Duration::ZERO;
            }
            Fetched::Snapshot(listing) => {
                self.set_phase(WatchPhase::Diffing);
                let options = self.source.diff_options();
                let diff = diff_snapshot(&self.state, &listing, &options);
                self.state.replace_entries(diff.entries);
                self.emit(diff.events, ctx);
            }
            Fetched::Changes { records, cursor } => {
                self.set_phase(WatchPhase::Diffing);
                let options = self.source.diff_options();
                let baseline = !self.state.is_initialized();
                if let Err(e) = self.state.advance_cursor(cursor) {
                    return self.fail(WatchError::State(e), ctx);
                }
                let events = if baseline && options.baseline == BaselinePolicy::Silent {
                    debug!(
                        skipped = records.len(),
                        "Initial cursor stored, not emitting baseline records"
                    );
                    Vec::new()
                } else {
                    classify_changes(records, &options.filter)
                };
                self.emit(events, ctx);
            }
        }

        self.consecutive_resets = 0;
        ctx.status(NodeStatus::ok("idle"));
        next_poll
    }

    fn fail(&mut self, error: WatchError, ctx: &dyn NodeContext) -> Duration {
        self.set_phase(WatchPhase::FetchFailed);
        let delay = self.retry.delay_for(&error);
        warn!(
            subscription = %self.state.subscription_id(),
            error = %error,
            retry_in_secs = delay.as_secs(),
            "Fetch failed, keeping previous state"
        );
        report_failure(ctx, &error.node_error(), None);
        delay
    }

    fn emit(&self, events: Vec<ChangeEvent>, ctx: &dyn NodeContext) {
        if !events.is_empty() {
            debug!(
                subscription = %self.state.subscription_id(),
                count = events.len(),
                "Emitting changes"
            );
        }
        for event in &events {
            ctx.send(self.source.message_for(event));
        }
    }
}

impl<S: WatchSource + 'static> Watcher<S> {
    /// Runs the watcher as a tokio task until `cancel` fires or the handle is stopped
    pub fn spawn(self, ctx: Arc<dyn NodeContext>, cancel: CancellationToken) -> WatcherHandle {
        let subscription = self.state.subscription_id().clone();
        let phase = self.phase.subscribe();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(ctx.as_ref(), task_cancel).await });

        WatcherHandle {
            subscription,
            cancel,
            phase,
            task,
        }
    }
}

// ============================================================================
// WatcherHandle
// ============================================================================

/// Control handle of a spawned watcher
pub struct WatcherHandle {
    subscription: SubscriptionId,
    cancel: CancellationToken,
    phase: watch::Receiver<WatchPhase>,
    task: JoinHandle<WatchState>,
}

impl WatcherHandle {
    pub fn subscription(&self) -> &SubscriptionId {
        &self.subscription
    }

    /// The watcher's current phase
    pub fn phase(&self) -> WatchPhase {
        *self.phase.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the watcher and waits for its task to finish
    ///
    /// Returns the final state, or `None` if the task panicked.
    pub async fn stop(self) -> Option<WatchState> {
        self.cancel.cancel();
        match self.task.await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(subscription = %self.subscription, error = %e, "Watcher task failed");
                None
            }
        }
    }
}
