//! Integration tests for end-to-end watcher scenarios
//!
//! - Glob filters suppress events for non-matching ids
//! - A server reset discards the cursor and rebuilds from scratch
//! - Stopping during an in-flight fetch emits nothing

use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use webnodes_core::{
    diff::{BaselinePolicy, ChangePolicy, ChangeRecord, DiffOptions},
    filter::PathFilter,
    ChangeKind,
};
use webnodes_watch::{ChannelContext, FetchOutcome, NodeEvent, Watcher};

use crate::common::{drain, entry, next_message, snapshot, ScriptedSource, Step};

const INTERVAL: Duration = Duration::from_secs(60);

fn record(id: &str, deleted: bool) -> ChangeRecord {
    ChangeRecord {
        id: id.to_string(),
        deleted,
        payload: json!({ "path_display": id }),
    }
}

#[tokio::test(start_paused = true)]
async fn test_filter_drops_non_matching_ids() {
    let (source, _log) = ScriptedSource::new(
        INTERVAL,
        vec![
            snapshot(&["a.txt"]),
            snapshot(&["a.txt", "b.jpg", "c.txt"]),
            snapshot(&["c.txt"]),
        ],
    );
    let source = source.with_options(DiffOptions {
        filter: PathFilter::new(Some("*.txt")).unwrap(),
        ..DiffOptions::default()
    });
    let (ctx, mut rx) = ChannelContext::channel("s3-filter");

    let handle = Watcher::new(source).spawn(Arc::new(ctx), CancellationToken::new());

    assert_eq!(next_message(&mut rx).await, (ChangeKind::Added, "c.txt".into()));
    assert_eq!(next_message(&mut rx).await, (ChangeKind::Deleted, "a.txt".into()));

    let state = handle.stop().await.unwrap();
    assert!(drain(&mut rx).iter().all(|e| e.as_message().is_none()));
    assert_eq!(state.entries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_report_changed_and_emit_baseline() {
    let first = vec![entry("station-1")];
    let mut second = vec![entry("station-1")];
    second[0].metadata = json!({ "bikes": 3 });
    second[0].payload = second[0].metadata.clone();

    let (source, _log) = ScriptedSource::new(
        INTERVAL,
        vec![
            Step::Now(Ok(FetchOutcome::snapshot(first.clone()))),
            Step::Now(Ok(FetchOutcome::snapshot(first))),
            Step::Now(Ok(FetchOutcome::snapshot(second))),
        ],
    );
    let source = source.with_options(DiffOptions {
        change_policy: ChangePolicy::ReportChanged,
        baseline: BaselinePolicy::Emit,
        ..DiffOptions::default()
    });
    let (ctx, mut rx) = ChannelContext::channel("cyclehire");

    let handle = Watcher::new(source).spawn(Arc::new(ctx), CancellationToken::new());

    assert_eq!(
        next_message(&mut rx).await,
        (ChangeKind::Added, "station-1".into())
    );
    assert_eq!(
        next_message(&mut rx).await,
        (ChangeKind::Changed, "station-1".into())
    );

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_cursor_and_rebuilds() {
    let (source, log) = ScriptedSource::new(
        INTERVAL,
        vec![
            Step::Now(Ok(FetchOutcome::changes(vec![], "c1"))),
            Step::Now(Ok(FetchOutcome::changes(vec![record("/x", false)], "c2"))),
            Step::Now(Ok(FetchOutcome::reset())),
            Step::Now(Ok(FetchOutcome::changes(vec![record("/stale", false)], "c9"))),
            Step::Now(Ok(FetchOutcome::changes(vec![record("/y", true)], "c10"))),
        ],
    );
    let (ctx, mut rx) = ChannelContext::channel("dropbox");

    let handle = Watcher::new(source).spawn(Arc::new(ctx), CancellationToken::new());

    assert_eq!(next_message(&mut rx).await, (ChangeKind::Added, "/x".into()));
    assert_eq!(next_message(&mut rx).await, (ChangeKind::Deleted, "/y".into()));

    let log = log.lock().unwrap().clone();
    let cursors: Vec<_> = log.iter().map(|r| r.cursor.as_deref()).collect();
    assert_eq!(
        &cursors[..5],
        &[None, Some("c1"), Some("c2"), None, Some("c9")]
    );
    assert!(
        log[3].at - log[2].at < Duration::from_secs(1),
        "re-initialization starts without waiting"
    );

    let state = handle.stop().await.unwrap();
    assert_eq!(state.cursor(), Some("c10"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_fetch_emits_nothing() {
    let (source, _log) = ScriptedSource::new(
        INTERVAL,
        vec![Step::After(
            Duration::from_secs(3600),
            Ok(FetchOutcome::snapshot(vec![entry("late")])),
        )],
    );
    let source = source.with_options(DiffOptions {
        baseline: BaselinePolicy::Emit,
        ..DiffOptions::default()
    });
    let (ctx, mut rx) = ChannelContext::channel("slow");

    let handle = Watcher::new(source).spawn(Arc::new(ctx), CancellationToken::new());
    tokio::time::sleep(Duration::from_secs(60)).await;

    let state = handle.stop().await.unwrap();
    assert!(!state.is_initialized());

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| e.as_message().is_none()));
    assert!(matches!(
        events.last(),
        Some(NodeEvent::Status { status, .. }) if status.is_clear()
    ));
}

#[tokio::test(start_paused = true)]
async fn test_parent_token_stops_all_watchers() {
    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();
    for name in ["one", "two"] {
        let (source, _log) = ScriptedSource::new(INTERVAL, vec![snapshot(&["a"])]);
        let (ctx, _rx) = ChannelContext::channel(name);
        handles.push(Watcher::new(source).spawn(Arc::new(ctx), shutdown.child_token()));
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;

    for handle in handles {
        assert!(handle.is_finished());
        assert!(handle.stop().await.is_some());
    }
}
