//! Integration tests for webnodes-watch
//!
//! Drives spawned watchers with scripted sources under paused tokio time and
//! verifies scheduling, emission, failure handling and cancellation.

mod common;

mod test_scenarios;
