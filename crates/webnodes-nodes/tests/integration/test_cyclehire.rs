//! TfL cycle hire station lookup and availability watcher

use serde_json::{json, Value};
use webnodes_core::{ports::invoke, ChangeKind, Location, Message};
use webnodes_nodes::cyclehire::{CycleHireNode, CycleHireSettings, CycleHireWatch, StationQuery};
use webnodes_watch::{ChannelContext, Watcher};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{api_key, drain, messages, warnings};

fn place(id: &str, name: &str, bikes: u32, empty: u32, distance: Option<f64>) -> Value {
    let mut place = json!({
        "id": id,
        "commonName": name,
        "lat": 51.529163,
        "lon": -0.10997,
        "additionalProperties": [
            {"key": "NbBikes", "value": bikes.to_string()},
            {"key": "NbEmptyDocks", "value": empty.to_string()},
            {"key": "NbDocks", "value": (bikes + empty).to_string()},
            {"key": "Locked", "value": "false"}
        ]
    });
    if let Some(distance) = distance {
        place["distance"] = json!(distance);
    }
    place
}

fn settings(server: &MockServer) -> CycleHireSettings {
    CycleHireSettings::new(None).with_base_url(server.uri())
}

#[tokio::test]
async fn test_watch_emits_baseline_then_only_count_changes() {
    let server = MockServer::start().await;
    let counts = [(1u8, 11, 8), (2, 11, 8), (3, 10, 9)];
    for (priority, bikes, empty) in counts {
        Mock::given(method("GET"))
            .and(path("/BikePoint/BikePoints_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(place(
                "BikePoints_1",
                "River Street , Clerkenwell",
                bikes,
                empty,
                None,
            )))
            .up_to_n_times(1)
            .with_priority(priority)
            .mount(&server)
            .await;
    }

    let query = StationQuery::Station("BikePoints_1".into());
    let mut watcher = Watcher::new(CycleHireWatch::new(settings(&server), query).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("bikes");

    watcher.poll_once(&ctx).await;
    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].event, Some(ChangeKind::Added));
    assert_eq!(out[0].payload["bikes"], 11);
    assert_eq!(
        out[0].title.as_deref(),
        Some("Cycle hire station River Street , Clerkenwell")
    );

    watcher.poll_once(&ctx).await;
    assert!(messages(&drain(&mut rx)).is_empty());

    watcher.poll_once(&ctx).await;
    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].event, Some(ChangeKind::Changed));
    assert_eq!(out[0].payload["bikes"], 10);
    assert_eq!(out[0].payload["emptyDocks"], 9);
    assert_eq!(
        out[0].description.as_deref(),
        Some("10 bikes and 9 empty docks at River Street , Clerkenwell")
    );
}

#[tokio::test]
async fn test_nearest_station_is_the_closest_in_radius() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/BikePoint"))
        .and(query_param("lat", "51.53"))
        .and(query_param("lon", "-0.11"))
        .and(query_param("radius", "500"))
        .and(query_param("app_key", "tfl-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "centrePoint": [51.53, -0.11],
            "places": [
                place("BikePoints_2", "Phillimore Gardens", 3, 20, Some(410.0)),
                place("BikePoints_1", "River Street , Clerkenwell", 11, 8, Some(120.5)),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = CycleHireSettings::new(Some(api_key("tfl-key"))).with_base_url(server.uri());
    let node = CycleHireNode::new(settings, None);
    let (ctx, mut rx) = ChannelContext::channel("bikes");
    let mut msg = Message::new("");
    msg.location = Some(Location::at(51.53, -0.11));
    invoke(&node, msg, &ctx).await;

    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].payload["id"], "BikePoints_1");
    assert_eq!(out[0].payload["distance"], 120.5);
    assert_eq!(out[0].payload["totalDocks"], 19);
    assert!(out[0].event.is_none());
}

#[tokio::test]
async fn test_node_without_station_warns() {
    let server = MockServer::start().await;
    let node = CycleHireNode::new(settings(&server), None);
    let (ctx, mut rx) = ChannelContext::channel("bikes");
    invoke(&node, Message::new(""), &ctx).await;

    assert_eq!(
        warnings(&drain(&mut rx)),
        vec!["No station or location specified".to_string()]
    );
}
