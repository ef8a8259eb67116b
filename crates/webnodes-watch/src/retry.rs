//! Delay after a failed fetch

use std::time::Duration;

use crate::WatchError;

/// Default wait after a failed fetch
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Fixed backoff that yields to server-provided hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// How long to wait before retrying after `error`
    pub fn delay_for(&self, error: &WatchError) -> Duration {
        match error {
            WatchError::Fetch {
                retry_after: Some(hint),
                ..
            } => *hint,
            _ => self.backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_BACKOFF)
    }
}
