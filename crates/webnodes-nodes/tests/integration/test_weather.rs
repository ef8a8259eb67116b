//! OpenWeatherMap query node and watcher

use serde_json::json;
use webnodes_core::{ports::invoke, Location, Message};
use webnodes_nodes::weather::{WeatherNode, WeatherQuery, WeatherSettings, WeatherWatch};
use webnodes_watch::{ChannelContext, Watcher};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{api_key, drain, errors, messages, warnings};

fn london(temp: f64) -> serde_json::Value {
    json!({
        "coord": {"lon": -0.13, "lat": 51.51},
        "weather": [{"id": 300, "main": "Drizzle", "description": "light intensity drizzle"}],
        "main": {"temp": temp, "pressure": 1012, "humidity": 81, "temp_min": 279.15, "temp_max": 281.15},
        "wind": {"speed": 4.1, "deg": 80},
        "clouds": {"all": 90},
        "sys": {"country": "GB", "sunrise": 1485762037, "sunset": 1485794875},
        "name": "London",
        "cod": 200
    })
}

fn settings(server: &MockServer) -> WeatherSettings {
    WeatherSettings::new(api_key("owm-key")).with_base_url(server.uri())
}

#[tokio::test]
async fn test_query_by_city_builds_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "London,uk"))
        .and(query_param("APPID", "owm-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london(280.32)))
        .mount(&server)
        .await;

    let query = WeatherQuery::from_parts(Some("London"), Some("uk"), None, None).unwrap();
    let node = WeatherNode::new(settings(&server), Some(query));
    let (ctx, mut rx) = ChannelContext::channel("weather");
    invoke(&node, Message::new("").with_topic("weather"), &ctx).await;

    let out = messages(&drain(&mut rx));
    assert_eq!(out.len(), 1);
    let msg = &out[0];
    assert_eq!(msg.topic.as_deref(), Some("weather"));
    assert_eq!(msg.payload["weather"], "Drizzle");
    assert_eq!(msg.payload["detail"], "light intensity drizzle");
    assert_eq!(msg.payload["tempc"], 7.2);
    assert_eq!(msg.payload["humidity"], 81.0);
    assert_eq!(msg.payload["location"], "London");
    assert_eq!(msg.title.as_deref(), Some("Current Weather Information"));
    assert_eq!(
        msg.description.as_deref(),
        Some("Current weather information at coordinates: 51.51, -0.13")
    );
    let location = msg.location.as_ref().unwrap();
    assert_eq!(location.country.as_deref(), Some("GB"));
}

#[tokio::test]
async fn test_message_location_overrides_configured_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "51.51"))
        .and(query_param("lon", "-0.13"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london(280.32)))
        .expect(1)
        .mount(&server)
        .await;

    let query = WeatherQuery::from_parts(Some("Paris"), None, None, None).unwrap();
    let node = WeatherNode::new(settings(&server), Some(query));
    let (ctx, mut rx) = ChannelContext::channel("weather");
    let mut msg = Message::new("");
    msg.location = Some(Location::at(51.51, -0.13));
    invoke(&node, msg, &ctx).await;

    assert_eq!(messages(&drain(&mut rx)).len(), 1);
}

#[tokio::test]
async fn test_upstream_cod_is_reported_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .mount(&server)
        .await;

    let query = WeatherQuery::from_parts(Some("Atlantis"), None, None, None).unwrap();
    let node = WeatherNode::new(settings(&server), Some(query));
    let (ctx, mut rx) = ChannelContext::channel("weather");
    invoke(&node, Message::new(""), &ctx).await;

    let events = drain(&mut rx);
    assert!(messages(&events).is_empty());
    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("city not found"), "{errors:?}");
}

#[tokio::test]
async fn test_not_found_status_reports_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Atlantis"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .mount(&server)
        .await;

    let query = WeatherQuery::from_parts(Some("Atlantis"), None, None, None).unwrap();
    let node = WeatherNode::new(settings(&server), Some(query));
    let (ctx, mut rx) = ChannelContext::channel("weather");
    invoke(&node, Message::new(""), &ctx).await;

    let events = drain(&mut rx);
    assert!(messages(&events).is_empty());
    assert_eq!(errors(&events), vec!["city not found".to_string()]);
}

#[tokio::test]
async fn test_missing_location_warns() {
    let server = MockServer::start().await;
    let node = WeatherNode::new(settings(&server), None);
    let (ctx, mut rx) = ChannelContext::channel("weather");
    invoke(&node, Message::new(""), &ctx).await;

    assert_eq!(
        warnings(&drain(&mut rx)),
        vec!["No location specified".to_string()]
    );
}

#[tokio::test]
async fn test_watch_emits_baseline_then_only_changes() {
    let server = MockServer::start().await;
    for (priority, temp) in [(1u8, 280.32), (2, 280.32)] {
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london(temp)))
            .up_to_n_times(1)
            .with_priority(priority)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london(283.15)))
        .with_priority(3)
        .mount(&server)
        .await;

    let query = WeatherQuery::from_parts(Some("London"), None, None, None).unwrap();
    let mut watcher = Watcher::new(WeatherWatch::new(settings(&server), query).unwrap());
    let (ctx, mut rx) = ChannelContext::channel("weather-watch");

    watcher.poll_once(&ctx).await;
    let first = messages(&drain(&mut rx));
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].payload["tempc"], 7.2);

    watcher.poll_once(&ctx).await;
    assert!(messages(&drain(&mut rx)).is_empty());

    watcher.poll_once(&ctx).await;
    let changed = messages(&drain(&mut rx));
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].payload["tempc"], 10.0);
}
