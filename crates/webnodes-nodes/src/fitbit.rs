//! Fitbit activity, sleep and badges
//!
//! Tokens come from the admin-route authorization and expire after a few
//! hours, so nodes are normally built with a refreshing
//! [`CredentialSource`].

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;
use webnodes_auth::{AuthError, ClientAuth, OAuthEndpoints, OAuthProvider};
use webnodes_core::{
    ports::{InputNode, NodeContext, NodeStatus},
    Message, NodeError,
};

use crate::{
    client::{ApiAuth, ApiClient},
    credentials::CredentialSource,
    ApiError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.fitbit.com";

const SCOPES: &[&str] = &["activity", "sleep", "profile"];

/// The data a [`FitbitNode`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitbitResource {
    /// Daily activity summary
    Activities,
    /// Sleep log for a night
    Sleep,
    /// Badges earned so far
    Badges,
}

impl FitbitResource {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "activities" => Some(Self::Activities),
            "sleep" => Some(Self::Sleep),
            "badges" => Some(Self::Badges),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activities => "activities",
            Self::Sleep => "sleep",
            Self::Badges => "badges",
        }
    }

    fn path(&self, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        match self {
            Self::Activities => format!("/1/user/-/activities/date/{date}.json"),
            Self::Sleep => format!("/1.2/user/-/sleep/date/{date}.json"),
            Self::Badges => "/1/user/-/badges.json".to_string(),
        }
    }

    fn title(&self, date: NaiveDate) -> String {
        match self {
            Self::Activities => format!("Activities for {date}"),
            Self::Sleep => format!("Sleep for {date}"),
            Self::Badges => "Badges".to_string(),
        }
    }
}

/// Parses `YYYY-MM-DD`
pub fn parse_date(value: &str) -> Result<NaiveDate, NodeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| NodeError::config(format!("Invalid date '{value}', expected YYYY-MM-DD")))
}

// ============================================================================
// FitbitClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct FitbitClient {
    api: ApiClient,
}

impl FitbitClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, access_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(base_url, ApiAuth::Bearer(access_token.into())),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http);
        self
    }

    pub async fn fetch(&self, resource: FitbitResource, date: NaiveDate) -> Result<Value, ApiError> {
        let path = resource.path(date);
        debug!(resource = resource.as_str(), %date, "Fetching Fitbit data");
        self.api.get_json(&path, &[]).await
    }

    /// `user.displayName` from the profile
    pub async fn display_name(&self) -> Result<String, ApiError> {
        let body: Value = self.api.get_json("/1/user/-/profile.json", &[]).await?;
        body.pointer("/user/displayName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidResponse("missing user.displayName".to_string()))
    }
}

// ============================================================================
// FitbitNode
// ============================================================================

/// Reports one resource for each inbound message
///
/// The date defaults to today (UTC); `msg.date` overrides it.
pub struct FitbitNode {
    credentials: CredentialSource,
    resource: FitbitResource,
    base_url: String,
    http: reqwest::Client,
}

impl FitbitNode {
    pub fn new(credentials: CredentialSource, resource: FitbitResource) -> Self {
        Self {
            credentials,
            resource,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl InputNode for FitbitNode {
    fn kind(&self) -> &'static str {
        "fitbit"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let date = match msg.str_field("date") {
            Some(value) => parse_date(value)?,
            None => Utc::now().date_naive(),
        };
        let token = self.credentials.bearer_token().await?;
        let client =
            FitbitClient::with_base_url(self.base_url.as_str(), token).with_http_client(self.http.clone());

        ctx.status(NodeStatus::busy("requesting"));
        let body = client.fetch(self.resource, date).await?;
        ctx.status(NodeStatus::clear());

        let mut out = Message::new(body).with_title(self.resource.title(date));
        out.topic = msg.topic;
        ctx.send(out.with_extra("date", date.to_string()));
        Ok(())
    }
}

// ============================================================================
// OAuth provider
// ============================================================================

/// Fitbit authorization for the admin routes
pub struct FitbitProvider {
    endpoints: OAuthEndpoints,
    api_base: String,
}

impl FitbitProvider {
    pub fn new() -> Self {
        Self::with_urls(
            "https://www.fitbit.com/oauth2/authorize",
            "https://api.fitbit.com/oauth2/token",
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
                .with_scopes(SCOPES)
                .with_client_auth(ClientAuth::BasicAuth),
            api_base: api_base.into(),
        }
    }
}

impl Default for FitbitProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthProvider for FitbitProvider {
    fn name(&self) -> &str {
        "fitbit"
    }

    fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    async fn display_name(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<String, AuthError> {
        FitbitClient::with_base_url(self.api_base.as_str(), access_token)
            .with_http_client(http.clone())
            .display_name()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))
    }
}
