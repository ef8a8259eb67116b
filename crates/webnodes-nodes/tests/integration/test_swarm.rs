//! Swarm latest check-in query and watcher cursor handling

use chrono::Utc;
use serde_json::{json, Value};
use webnodes_core::{ports::invoke, ChangeKind, Message};
use webnodes_nodes::swarm::{SwarmNode, SwarmSettings, SwarmWatch};
use webnodes_watch::{ChannelContext, Watcher};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{drain, errors, messages, oauth};

fn checkins(items: Value) -> Value {
    json!({
        "meta": {"code": 200},
        "response": {"checkins": {"count": items.as_array().map_or(0, Vec::len), "items": items}}
    })
}

fn checkin(id: &str, created_at: i64, venue: &str) -> Value {
    json!({
        "id": id,
        "createdAt": created_at,
        "type": "checkin",
        "venue": {"name": venue, "location": {"lat": 51.5, "lng": -0.12, "city": "London", "country": "United Kingdom"}}
    })
}

#[tokio::test]
async fn test_new_checkins_are_emitted_oldest_first() {
    let server = MockServer::start().await;
    let now = Utc::now().timestamp();
    let (first, second) = (now + 100, now + 200);

    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .and(query_param("oauth_token", "fsq-token"))
        .and(query_param("v", "20141016"))
        .respond_with(ResponseTemplate::new(200).set_body_json(checkins(json!([]))))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .and(query_param("afterTimestamp", second.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(checkins(json!([]))))
        .expect(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(checkins(json!([
            checkin("c2", second, "Blue Bottle"),
            checkin("c1", first, "Monmouth"),
        ]))))
        .up_to_n_times(1)
        .with_priority(3)
        .mount(&server)
        .await;

    let settings = SwarmSettings::new(oauth("fsq-token")).with_base_url(server.uri());
    let mut watcher = Watcher::new(SwarmWatch::new(settings).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("swarm-watch");

    watcher.poll_once(&ctx).await;
    assert!(messages(&drain(&mut rx)).is_empty());
    assert!(watcher.state().is_initialized());

    watcher.poll_once(&ctx).await;
    let out = messages(&drain(&mut rx));
    let titles: Vec<_> = out.iter().map(|m| m.title.clone().unwrap_or_default()).collect();
    assert_eq!(titles, vec!["Monmouth", "Blue Bottle"]);
    assert!(out.iter().all(|m| m.event == Some(ChangeKind::Added)));
    assert_eq!(watcher.state().cursor(), Some(second.to_string().as_str()));

    watcher.poll_once(&ctx).await;
    assert!(messages(&drain(&mut rx)).is_empty());
}

#[tokio::test]
async fn test_checkin_after_start_survives_failed_first_poll() {
    let server = MockServer::start().await;
    let created = Utc::now().timestamp() + 5;

    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(checkins(json!([checkin("c1", created, "Monmouth")]))),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let settings = SwarmSettings::new(oauth("fsq-token")).with_base_url(server.uri());
    let mut watcher = Watcher::new(SwarmWatch::new(settings).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("swarm-watch");

    watcher.poll_once(&ctx).await;
    let events = drain(&mut rx);
    assert!(messages(&events).is_empty());
    assert_eq!(errors(&events).len(), 1);
    assert_eq!(watcher.state().cursor(), None);

    watcher.poll_once(&ctx).await;
    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title.as_deref(), Some("Monmouth"));
    assert_eq!(out[0].event, Some(ChangeKind::Added));
    assert_eq!(watcher.state().cursor(), Some(created.to_string().as_str()));
}

#[tokio::test]
async fn test_query_node_emits_latest_checkin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/users/self/checkins"))
        .and(query_param("oauth_token", "fsq-token"))
        .and(query_param("sort", "newestfirst"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(checkins(json!([checkin(
            "c9",
            1_700_000_000,
            "Prufrock"
        )]))))
        .expect(1)
        .mount(&server)
        .await;

    let node = SwarmNode::new(SwarmSettings::new(oauth("fsq-token")).with_base_url(server.uri()));
    let (ctx, mut rx) = ChannelContext::channel("swarm");
    let mut msg = Message::new("");
    msg.topic = Some("checkins".to_string());
    invoke(&node, msg, &ctx).await;

    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title.as_deref(), Some("Prufrock"));
    assert_eq!(out[0].payload["id"], "c9");
    assert_eq!(out[0].topic.as_deref(), Some("checkins"));
    assert_eq!(out[0].location.as_ref().and_then(|l| l.coordinates()), Some((51.5, -0.12)));
    assert!(out[0].event.is_none());
}
