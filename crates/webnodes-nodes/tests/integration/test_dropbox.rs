//! Dropbox cursor watcher: baseline cursor, long-poll backoff and reset

use std::{sync::Arc, time::Duration};

use serde_json::json;
use webnodes_core::{filter::PathFilter, ports::invoke, ChangeKind, Message};
use webnodes_nodes::dropbox::{
    DropboxAuth, DropboxDownloadNode, DropboxEndpoints, DropboxSession, DropboxUploadNode,
    DropboxWatch,
};
use webnodes_watch::{ChannelContext, Watcher};
use wiremock::matchers::{body_partial_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::common::{changes, drain, errors, messages, warnings};

fn session(server: &MockServer) -> Arc<DropboxAuth> {
    Arc::new(
        DropboxAuth::dev_token("sl.test").with_endpoints(DropboxEndpoints::single(server.uri())),
    )
}

fn watch(server: &MockServer) -> DropboxWatch {
    session(server)
        .event_stream("/Docs", PathFilter::any())
        .unwrap()
}

async fn mount_latest_cursor(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/get_latest_cursor"))
        .and(header("authorization", "Bearer sl.test"))
        .and(body_partial_json(json!({"path": "/Docs", "recursive": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cursor": "c1"})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_longpoll(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/longpoll"))
        .and(body_partial_json(json!({"cursor": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_changes_after_longpoll_honor_backoff() {
    let server = MockServer::start().await;
    mount_latest_cursor(&server, 1).await;
    mount_longpoll(&server, json!({"changes": true, "backoff": 60})).await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_partial_json(json!({"cursor": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                {".tag": "file", "name": "a.pdf", "path_display": "/Docs/a.pdf", "path_lower": "/docs/a.pdf"},
                {".tag": "deleted", "name": "old.pdf", "path_display": "/Docs/old.pdf", "path_lower": "/docs/old.pdf"}
            ],
            "cursor": "c2",
            "has_more": false
        })))
        .mount(&server)
        .await;

    let mut watcher = Watcher::new(watch(&server));
    let (ctx, mut rx) = ChannelContext::channel("dropbox-watch");

    let first = watcher.poll_once(&ctx).await;
    assert_eq!(first, Duration::ZERO);
    assert_eq!(watcher.state().cursor(), Some("c1"));
    assert!(changes(&drain(&mut rx)).is_empty());

    let second = watcher.poll_once(&ctx).await;
    assert_eq!(second, Duration::from_secs(60));
    assert_eq!(watcher.state().cursor(), Some("c2"));
    let mut found = changes(&drain(&mut rx));
    found.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        found,
        vec![
            (ChangeKind::Added, "/Docs/a.pdf".to_string()),
            (ChangeKind::Deleted, "/Docs/old.pdf".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_quiet_longpoll_keeps_cursor() {
    let server = MockServer::start().await;
    mount_latest_cursor(&server, 1).await;
    mount_longpoll(&server, json!({"changes": false})).await;

    let mut watcher = Watcher::new(watch(&server));
    let (ctx, mut rx) = ChannelContext::channel("dropbox-watch");
    watcher.poll_once(&ctx).await;
    watcher.poll_once(&ctx).await;

    assert_eq!(watcher.state().cursor(), Some("c1"));
    assert!(changes(&drain(&mut rx)).is_empty());
}

#[tokio::test]
async fn test_reset_discards_cursor_and_starts_over() {
    let server = MockServer::start().await;
    mount_latest_cursor(&server, 2).await;
    mount_longpoll(&server, json!({"changes": true})).await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_summary": "reset/..",
            "error": {".tag": "reset"}
        })))
        .mount(&server)
        .await;

    let mut watcher = Watcher::new(watch(&server));
    let (ctx, mut rx) = ChannelContext::channel("dropbox-watch");

    watcher.poll_once(&ctx).await;
    let after_reset = watcher.poll_once(&ctx).await;
    assert_eq!(after_reset, Duration::ZERO);
    assert_eq!(watcher.state().cursor(), None);
    assert!(!watcher.state().is_initialized());

    watcher.poll_once(&ctx).await;
    assert_eq!(watcher.state().cursor(), Some("c1"));
    let events = drain(&mut rx);
    assert!(changes(&events).is_empty());
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn test_download_node_sends_file_contents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/Docs/notes.txt"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let node = DropboxDownloadNode::new(session(&server));
    let (ctx, mut rx) = ChannelContext::channel("dropbox-in");
    invoke(
        &node,
        Message::new("").with_extra("filename", "/Docs/notes.txt"),
        &ctx,
    )
    .await;

    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].payload, "hello");
}

/// The `Dropbox-API-Arg` header, parsed
fn api_arg(request: &Request) -> Option<serde_json::Value> {
    let value = request.headers.get("Dropbox-API-Arg")?.to_str().ok()?;
    serde_json::from_str(value).ok()
}

#[tokio::test]
async fn test_upload_node_overwrites_target_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("authorization", "Bearer sl.test"))
        .and(header("content-type", "application/octet-stream"))
        .and(|request: &Request| {
            api_arg(request) == Some(json!({"path": "/Docs/out.txt", "mode": "overwrite"}))
        })
        .and(body_string("report body"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            ".tag": "file",
            "name": "out.txt",
            "path_display": "/Docs/out.txt",
            "id": "id:abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = DropboxUploadNode::new(session(&server)).with_path("/Docs/default.txt");
    let (ctx, mut rx) = ChannelContext::channel("dropbox-out");
    invoke(
        &node,
        Message::new("report body").with_extra("filename", "/Docs/out.txt"),
        &ctx,
    )
    .await;

    let events = drain(&mut rx);
    assert!(messages(&events).is_empty());
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn test_upload_node_without_payload_warns() {
    let server = MockServer::start().await;
    let node = DropboxUploadNode::new(session(&server)).with_path("/Docs/out.txt");
    let (ctx, mut rx) = ChannelContext::channel("dropbox-out");
    invoke(&node, Message::new(serde_json::Value::Null), &ctx).await;

    assert_eq!(
        warnings(&drain(&mut rx)),
        vec!["No payload specified".to_string()]
    );
}
