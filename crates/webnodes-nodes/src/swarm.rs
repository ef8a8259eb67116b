//! Foursquare Swarm check-ins
//!
//! Uses the v2 API (`users/self/checkins`) with the user's OAuth token passed
//! as `oauth_token`. [`SwarmWatch`] emits every new check-in, oldest first.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::debug;
use webnodes_auth::{AuthError, ClientAuth, OAuthEndpoints, OAuthProvider};
use webnodes_core::{
    diff::{BaselinePolicy, ChangeRecord, DiffOptions},
    ports::{InputNode, NodeContext, NodeStatus},
    ChangeEvent, Location, Message, NodeError, SubscriptionId, WatchState,
};
use webnodes_watch::{FetchOutcome, WatchError, WatchSource};

use crate::{
    client::{ApiAuth, ApiClient},
    credentials::CredentialSource,
    ApiError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.foursquare.com";

/// API version date sent with every request
const API_VERSION: &str = "20141016";

/// Default poll interval of a check-in watcher
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Unwraps the `{meta, response}` envelope
fn response_body(body: Value) -> Result<Value, ApiError> {
    let code = body.pointer("/meta/code").and_then(Value::as_i64);
    if code.is_some_and(|c| c != 200) {
        let detail = body
            .pointer("/meta/errorDetail")
            .and_then(Value::as_str)
            .unwrap_or("Foursquare API error");
        return Err(ApiError::Upstream(detail.to_string()));
    }
    body.get("response")
        .cloned()
        .ok_or_else(|| ApiError::InvalidResponse("missing response".to_string()))
}

fn created_at(checkin: &Value) -> Option<i64> {
    checkin.get("createdAt").and_then(Value::as_i64)
}

/// Builds the message for one check-in
pub fn checkin_message(checkin: &Value) -> Message {
    let venue = checkin.get("venue");
    let venue_location = venue.and_then(|v| v.get("location"));
    let field = |key: &str| venue_location.and_then(|l| l.get(key));

    let mut msg = Message::new(checkin.clone());
    if let (Some(lat), Some(lon)) = (
        field("lat").and_then(Value::as_f64),
        field("lng").and_then(Value::as_f64),
    ) {
        msg = msg.with_location(Location {
            lat: Some(lat),
            lon: Some(lon),
            city: field("city").and_then(Value::as_str).map(str::to_string),
            country: field("country").and_then(Value::as_str).map(str::to_string),
        });
    }
    if let Some(name) = venue.and_then(|v| v.get("name")).and_then(Value::as_str) {
        msg = msg.with_title(name);
    }
    if let Some(time) = created_at(checkin).and_then(|s| Utc.timestamp_opt(s, 0).single()) {
        msg = msg.with_time(time);
    }
    msg
}

// ============================================================================
// SwarmClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct SwarmClient {
    api: ApiClient,
}

impl SwarmClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, access_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(
                base_url,
                ApiAuth::QueryParam {
                    name: "oauth_token",
                    value: access_token.into(),
                },
            ),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http);
        self
    }

    /// Check-ins newest first, optionally only those after a Unix timestamp
    pub async fn checkins(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, ApiError> {
        let after = after.map(|t| t.to_string());
        let limit = limit.map(|l| l.to_string());
        let mut query = vec![("v", API_VERSION), ("sort", "newestfirst")];
        if let Some(after) = after.as_deref() {
            query.push(("afterTimestamp", after));
        }
        if let Some(limit) = limit.as_deref() {
            query.push(("limit", limit));
        }

        let body: Value = self.api.get_json("/v2/users/self/checkins", &query).await?;
        let response = response_body(body)?;
        let items = response
            .pointer("/checkins/items")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| ApiError::InvalidResponse("missing checkins.items".to_string()))?;
        debug!(count = items.len(), "Fetched check-ins");
        Ok(items)
    }

    /// `firstName lastName` of the authorized user
    pub async fn display_name(&self) -> Result<String, ApiError> {
        let body: Value = self
            .api
            .get_json("/v2/users/self", &[("v", API_VERSION)])
            .await?;
        let user = response_body(body)?
            .get("user")
            .cloned()
            .ok_or_else(|| ApiError::InvalidResponse("missing user".to_string()))?;
        let name = ["firstName", "lastName"]
            .iter()
            .filter_map(|k| user.get(*k).and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(name)
    }
}

/// Credentials and endpoint shared by the query node and the watcher
#[derive(Debug, Clone)]
pub struct SwarmSettings {
    pub credentials: CredentialSource,
    pub base_url: String,
    pub http: reqwest::Client,
}

impl SwarmSettings {
    pub fn new(credentials: CredentialSource) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn client(&self) -> Result<SwarmClient, NodeError> {
        let token = self.credentials.bearer_token().await?;
        Ok(SwarmClient::with_base_url(self.base_url.as_str(), token)
            .with_http_client(self.http.clone()))
    }
}

// ============================================================================
// SwarmNode
// ============================================================================

/// Emits the most recent check-in for each inbound message
pub struct SwarmNode {
    settings: SwarmSettings,
}

impl SwarmNode {
    pub fn new(settings: SwarmSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl InputNode for SwarmNode {
    fn kind(&self) -> &'static str {
        "swarm"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let client = self.settings.client().await?;
        ctx.status(NodeStatus::busy("requesting"));
        let latest = client.checkins(None, Some(1)).await?;
        ctx.status(NodeStatus::clear());

        match latest.first() {
            Some(checkin) => {
                let mut out = checkin_message(checkin);
                out.topic = msg.topic;
                ctx.send(out);
            }
            None => debug!(node = ctx.node_id(), "No check-ins"),
        }
        Ok(())
    }
}

// ============================================================================
// SwarmWatch
// ============================================================================

/// Emits check-ins made after the watcher started
///
/// The cursor is the `createdAt` of the newest check-in seen so far. A
/// failed first poll keeps the start time, so nothing made in between is lost.
pub struct SwarmWatch {
    settings: SwarmSettings,
    subscription: SubscriptionId,
    started_at: i64,
    interval: Duration,
}

impl SwarmWatch {
    pub fn new(settings: SwarmSettings) -> Result<Self, NodeError> {
        let subscription = SubscriptionId::new(format!("swarm:{}", settings.credentials.id()))?;
        Ok(Self {
            settings,
            subscription,
            started_at: Utc::now().timestamp(),
            interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl WatchSource for SwarmWatch {
    fn subscription(&self) -> SubscriptionId {
        self.subscription.clone()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    /// The starting cursor is already the watcher start time, so the first
    /// poll reports everything after it
    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            baseline: BaselinePolicy::Emit,
            ..DiffOptions::default()
        }
    }

    async fn fetch(&mut self, state: &WatchState) -> Result<FetchOutcome, WatchError> {
        let since = state
            .cursor()
            .and_then(|c| c.parse::<i64>().ok())
            .unwrap_or(self.started_at);
        let client = self.settings.client().await?;
        let mut items = client.checkins(Some(since), None).await?;

        // the API may include check-ins at exactly `since`
        items.retain(|c| created_at(c).is_some_and(|t| t > since));
        items.reverse();

        let newest = items.iter().filter_map(created_at).max().unwrap_or(since);
        let records = items
            .into_iter()
            .filter_map(|checkin| {
                let id = checkin.get("id").and_then(Value::as_str)?.to_string();
                Some(ChangeRecord {
                    id,
                    deleted: false,
                    payload: checkin,
                })
            })
            .collect();
        Ok(FetchOutcome::changes(records, newest.to_string()))
    }

    fn message_for(&self, event: &ChangeEvent) -> Message {
        let mut msg = checkin_message(&event.payload);
        msg.event = Some(event.kind);
        msg
    }
}

// ============================================================================
// OAuth provider
// ============================================================================

/// Foursquare authorization for the admin routes
pub struct SwarmProvider {
    endpoints: OAuthEndpoints,
    api_base: String,
}

impl SwarmProvider {
    pub fn new() -> Self {
        Self::with_urls(
            "https://foursquare.com/oauth2/authenticate",
            "https://foursquare.com/oauth2/access_token",
            DEFAULT_BASE_URL,
        )
    }

    pub fn with_urls(
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            endpoints: OAuthEndpoints::new(auth_url, token_url)
                .with_client_auth(ClientAuth::RequestBody),
            api_base: api_base.into(),
        }
    }
}

impl Default for SwarmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthProvider for SwarmProvider {
    fn name(&self) -> &str {
        "swarm"
    }

    fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    async fn display_name(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<String, AuthError> {
        SwarmClient::with_base_url(self.api_base.as_str(), access_token)
            .with_http_client(http.clone())
            .display_name()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))
    }
}
