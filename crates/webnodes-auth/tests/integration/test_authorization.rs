//! Integration tests for the authorization round trip through the admin routes
//!
//! - Start stores a pending CSRF token and redirects with `state = id:token`
//! - A matching callback exchanges the code and stores OAuth2 credentials
//! - Mismatched state, provider errors and failed exchanges persist nothing

use serde_json::json;
use webnodes_core::{ports::CredentialStore, Credentials};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, encode, state_from, REDIRECT_URI};

fn start_uri(id: &str) -> String {
    format!(
        "/mock-credentials/auth?id={}&callback={}",
        encode(id),
        encode(REDIRECT_URI)
    )
}

fn callback_uri(code: &str, state: &str) -> String {
    format!(
        "/mock-credentials/auth/callback?code={}&state={}",
        encode(code),
        encode(state)
    )
}

#[tokio::test]
async fn test_full_round_trip_stores_credentials() {
    let (server, store, routes) = common::setup_routes().await;

    let start = routes.handle("GET", &start_uri("node-1")).await;
    assert_eq!(start.status, 302);
    let location = start.location.expect("redirect location");
    assert!(location.starts_with(&format!("{}/oauth2/authorize", server.uri())));

    let state = state_from(&location);
    assert!(state.starts_with("node-1:"));

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains("client_id=client-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    common::mount_profile(&server, "tok-1", "Jane Doe").await;

    let done = routes.handle("GET", &callback_uri("code-1", &state)).await;
    assert_eq!(done.status, 200, "{}", done.body);
    assert!(done.body.contains("Jane Doe"));

    match store.read("node-1").await.unwrap() {
        Some(Credentials::OAuth2 {
            access_token,
            refresh_token,
            expires_at,
            display_name,
        }) => {
            assert_eq!(access_token, "tok-1");
            assert_eq!(refresh_token.as_deref(), Some("ref-1"));
            assert!(expires_at.is_some());
            assert_eq!(display_name.as_deref(), Some("Jane Doe"));
        }
        other => panic!("expected OAuth2 credentials, got {other:?}"),
    }
}

#[tokio::test]
async fn test_token_response_without_expiry_or_type() {
    let (server, store, routes) = common::setup_routes().await;
    let start = routes.handle("GET", &start_uri("swarm-1")).await;
    let state = state_from(&start.location.unwrap());

    common::mount_token(&server, 200, json!({ "access_token": "forever" })).await;
    common::mount_profile(&server, "forever", "Sam").await;

    let done = routes.handle("GET", &callback_uri("c", &state)).await;
    assert_eq!(done.status, 200);
    assert_eq!(
        store.read("swarm-1").await.unwrap(),
        Some(Credentials::OAuth2 {
            access_token: "forever".into(),
            refresh_token: None,
            expires_at: None,
            display_name: Some("Sam".into()),
        })
    );
}

#[tokio::test]
async fn test_start_without_parameters_is_400() {
    let (_server, store, routes) = common::setup_routes().await;

    let response = routes.handle("GET", "/mock-credentials/auth?id=node-1").await;
    assert_eq!(response.status, 400);
    assert!(response
        .body
        .contains("ERROR: request does not contain the required parameters"));
    assert!(store.read("node-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_callback_without_code_is_400() {
    let (_server, _store, routes) = common::setup_routes().await;
    let response = routes
        .handle("GET", "/mock-credentials/auth/callback?state=node-1:abc")
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_mismatched_state_is_401_and_not_persisted() {
    let (server, store, routes) = common::setup_routes().await;
    routes.handle("GET", &start_uri("node-1")).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for state in ["node-1:forged", "unknown-node:abc"] {
        let response = routes.handle("GET", &callback_uri("code-1", state)).await;
        assert_eq!(response.status, 401);
        assert!(response
            .body
            .contains("CSRF token mismatch, possible cross site request forgery attempt."));
    }

    assert!(matches!(
        store.read("node-1").await.unwrap(),
        Some(Credentials::Pending { .. })
    ));
    assert!(store.read("unknown-node").await.unwrap().is_none());
}

#[tokio::test]
async fn test_provider_error_is_400() {
    let (_server, store, routes) = common::setup_routes().await;
    routes.handle("GET", &start_uri("node-1")).await;

    let response = routes
        .handle(
            "GET",
            "/mock-credentials/auth/callback?error=access_denied&error_description=User%20declined",
        )
        .await;
    assert_eq!(response.status, 400);
    assert!(response.body.contains("User declined"));
    assert!(matches!(
        store.read("node-1").await.unwrap(),
        Some(Credentials::Pending { .. })
    ));
}

#[tokio::test]
async fn test_failed_exchange_is_500_and_not_persisted() {
    let (server, store, routes) = common::setup_routes().await;
    let start = routes.handle("GET", &start_uri("node-1")).await;
    let state = state_from(&start.location.unwrap());

    common::mount_token(&server, 400, json!({ "error": "invalid_grant" })).await;

    let response = routes.handle("GET", &callback_uri("bad", &state)).await;
    assert_eq!(response.status, 500);
    assert!(response.body.contains("invalid_grant"));
    assert!(matches!(
        store.read("node-1").await.unwrap(),
        Some(Credentials::Pending { .. })
    ));
}

#[tokio::test]
async fn test_failed_profile_is_500_and_not_persisted() {
    let (server, store, routes) = common::setup_routes().await;
    let start = routes.handle("GET", &start_uri("node-1")).await;
    let state = state_from(&start.location.unwrap());

    common::mount_token(&server, 200, json!({ "access_token": "tok" })).await;
    // No profile mock: wiremock answers 404

    let response = routes.handle("GET", &callback_uri("code", &state)).await;
    assert_eq!(response.status, 500);
    assert!(matches!(
        store.read("node-1").await.unwrap(),
        Some(Credentials::Pending { .. })
    ));
}
