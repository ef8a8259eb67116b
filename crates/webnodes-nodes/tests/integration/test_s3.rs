//! S3 listing diff, 429 retry, object download and upload against a mock endpoint

use std::time::Duration;

use webnodes_core::{
    config::S3Config, filter::PathFilter, ports::invoke, ChangeKind, Credentials, Message,
};
use webnodes_nodes::s3::{S3Client, S3GetNode, S3PutNode, S3Target, S3Watch};
use webnodes_watch::{ChannelContext, Watcher};
use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{changes, credentials, drain, errors, messages, warnings};

fn listing(keys: &[(&str, &str)]) -> String {
    let contents: String = keys
        .iter()
        .map(|(key, etag)| {
            format!(
                "<Contents><Key>{key}</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified>\
                 <ETag>&quot;{etag}&quot;</ETag><Size>10</Size></Contents>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
<Name>my-bucket</Name><IsTruncated>false</IsTruncated>{contents}</ListBucketResult>"#
    )
}

async fn mount_listing_once(server: &MockServer, body: String, priority: u8) {
    Mock::given(method("GET"))
        .and(path("/my-bucket"))
        .and(query_param("list-type", "2"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .with_priority(priority)
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> S3Client {
    S3Client::new("AKID", "secret", "us-east-1", Some(&server.uri())).unwrap()
}

fn target(server: &MockServer) -> S3Target {
    S3Target::new(
        credentials(
            "aws",
            Credentials::AwsKeys {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
            },
        ),
        S3Config {
            region: "us-east-1".into(),
            endpoint: Some(server.uri()),
        },
    )
}

#[tokio::test]
async fn test_listing_diff_reports_added_and_deleted() {
    let server = MockServer::start().await;
    mount_listing_once(&server, listing(&[("a.txt", "1"), ("b.txt", "2")]), 1).await;
    mount_listing_once(&server, listing(&[("b.txt", "2"), ("c.txt", "3")]), 2).await;

    let watch = S3Watch::new(client(&server), "my-bucket", None, PathFilter::any()).unwrap();
    let mut watcher = Watcher::new(watch);
    let (ctx, mut rx) = ChannelContext::channel("s3-watch");

    watcher.poll_once(&ctx).await;
    assert!(changes(&drain(&mut rx)).is_empty(), "baseline is silent");

    watcher.poll_once(&ctx).await;
    let events = drain(&mut rx);
    let mut found = changes(&events);
    found.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        found,
        vec![
            (ChangeKind::Deleted, "a.txt".to_string()),
            (ChangeKind::Added, "c.txt".to_string()),
        ]
    );
    assert!(messages(&events)
        .iter()
        .all(|m| m.str_field("bucket") == Some("my-bucket")));
}

#[tokio::test]
async fn test_changed_etag_is_reported_and_filter_applies() {
    let server = MockServer::start().await;
    mount_listing_once(&server, listing(&[("a.jpg", "1"), ("notes.txt", "1")]), 1).await;
    mount_listing_once(&server, listing(&[("a.jpg", "2"), ("notes.txt", "2")]), 2).await;

    let filter = PathFilter::new(Some("*.jpg")).unwrap();
    let mut watcher = Watcher::new(S3Watch::new(client(&server), "my-bucket", None, filter).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("s3-watch");

    watcher.poll_once(&ctx).await;
    watcher.poll_once(&ctx).await;
    assert_eq!(
        changes(&drain(&mut rx)),
        vec![(ChangeKind::Changed, "a.jpg".to_string())]
    );
}

#[tokio::test]
async fn test_unchanged_listing_emits_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/my-bucket"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[("a.txt", "1")])))
        .mount(&server)
        .await;

    let mut watcher =
        Watcher::new(S3Watch::new(client(&server), "my-bucket", None, PathFilter::any()).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("s3-watch");
    watcher.poll_once(&ctx).await;
    watcher.poll_once(&ctx).await;
    assert!(changes(&drain(&mut rx)).is_empty());
}

#[tokio::test]
async fn test_429_is_retried_after_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/my-bucket/report.csv"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/my-bucket/report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let body = client(&server)
        .get_object("my-bucket", "report.csv")
        .await
        .unwrap();
    assert_eq!(body, b"a,b\n1,2\n");
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_get_node_base64_encodes_binary_objects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/my-bucket/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0xff, 0x00]))
        .mount(&server)
        .await;

    let node = S3GetNode::new(target(&server).with_bucket("my-bucket"));
    let (ctx, mut rx) = ChannelContext::channel("s3-get");
    invoke(&node, Message::new("").with_extra("filename", "logo.png"), &ctx).await;

    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].payload, "iVD/AA==");
    assert_eq!(out[0].str_field("encoding"), Some("base64"));
    assert_eq!(out[0].str_field("filename"), Some("logo.png"));
}

#[tokio::test]
async fn test_get_node_without_filename_warns() {
    let server = MockServer::start().await;
    let node = S3GetNode::new(target(&server).with_bucket("my-bucket"));
    let (ctx, mut rx) = ChannelContext::channel("s3-get");
    invoke(&node, Message::new(""), &ctx).await;

    let events = drain(&mut rx);
    assert_eq!(warnings(&events), vec!["No filename specified".to_string()]);
    assert!(messages(&events).is_empty());
}

#[tokio::test]
async fn test_put_node_uploads_signed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/my-bucket/reports/notes.txt"))
        .and(body_string("hello"))
        .and(header(
            "x-amz-content-sha256",
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        ))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"5d41402abc4b2a76\""))
        .expect(1)
        .mount(&server)
        .await;

    let node = S3PutNode::new(target(&server).with_bucket("my-bucket"));
    let (ctx, mut rx) = ChannelContext::channel("s3-put");
    invoke(
        &node,
        Message::new("hello").with_extra("filename", "reports/notes.txt"),
        &ctx,
    )
    .await;

    let events = drain(&mut rx);
    assert!(messages(&events).is_empty());
    assert!(warnings(&events).is_empty());
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn test_put_node_serializes_json_payload_to_message_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/other-bucket/data.json"))
        .and(body_string(r#"{"a":1}"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let node = S3PutNode::new(target(&server).with_bucket("my-bucket").with_key("data.json"));
    let (ctx, mut rx) = ChannelContext::channel("s3-put");
    invoke(
        &node,
        Message::new(serde_json::json!({"a": 1})).with_extra("bucket", "other-bucket"),
        &ctx,
    )
    .await;

    assert!(errors(&drain(&mut rx)).is_empty());
}
