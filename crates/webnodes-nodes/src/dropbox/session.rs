//! Dropbox authentication modes
//!
//! A node is configured with one [`DropboxAuth`] variant. Each variant has
//! its own [`DropboxSession`] implementation:
//!
//! - [`OAuth2Session`] - tokens obtained through the admin routes and kept
//!   in the credential store
//! - [`AppSession`] - an app key/secret pair plus a long-lived refresh token;
//!   short-lived access tokens are fetched and cached in memory
//! - [`DevTokenSession`] - a fixed access token generated in the app console

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use webnodes_auth::flow::REFRESH_MARGIN_MINUTES;
use webnodes_core::{filter::PathFilter, NodeError};

use super::{DropboxClient, DropboxEndpoints, DropboxWatch};
use crate::{
    client::{check_status, parse_json},
    credentials::CredentialSource,
};

/// What a Dropbox node needs from its authentication mode
#[async_trait]
pub trait DropboxSession: Send + Sync {
    /// Whether enough is configured to attempt authentication
    fn has_credentials(&self) -> bool;

    /// A currently valid access token
    async fn access_token(&self) -> Result<String, NodeError>;

    fn endpoints(&self) -> &DropboxEndpoints;

    fn http_client(&self) -> &reqwest::Client;

    /// An API client authenticated for this session
    async fn client(&self) -> Result<DropboxClient, NodeError> {
        if !self.has_credentials() {
            return Err(NodeError::config("Missing Dropbox credentials"));
        }
        let token = self.access_token().await?;
        Ok(DropboxClient::new(token, self.endpoints()).with_http_client(self.http_client().clone()))
    }

    /// A watcher over `path` authenticated through this session
    fn event_stream(
        self: Arc<Self>,
        path: &str,
        filter: PathFilter,
    ) -> Result<DropboxWatch, NodeError>
    where
        Self: Sized + 'static,
    {
        DropboxWatch::new(self, path, filter)
    }
}

/// Endpoints and HTTP client shared by every session kind
#[derive(Debug, Clone, Default)]
struct Connection {
    endpoints: DropboxEndpoints,
    http: reqwest::Client,
}

// ============================================================================
// OAuth2Session
// ============================================================================

/// Tokens from the admin-route authorization
#[derive(Debug, Clone)]
pub struct OAuth2Session {
    credentials: CredentialSource,
    connection: Connection,
}

impl OAuth2Session {
    pub fn new(credentials: CredentialSource) -> Self {
        Self {
            credentials,
            connection: Connection::default(),
        }
    }
}

#[async_trait]
impl DropboxSession for OAuth2Session {
    fn has_credentials(&self) -> bool {
        !self.credentials.id().is_empty()
    }

    async fn access_token(&self) -> Result<String, NodeError> {
        self.credentials.bearer_token().await
    }

    fn endpoints(&self) -> &DropboxEndpoints {
        &self.connection.endpoints
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.connection.http
    }
}

// ============================================================================
// AppSession
// ============================================================================

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + Duration::minutes(REFRESH_MARGIN_MINUTES) < at,
            None => true,
        }
    }
}

/// App key/secret with a refresh token
pub struct AppSession {
    app_key: String,
    app_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
    connection: Connection,
}

impl AppSession {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            refresh_token: refresh_token.into(),
            cached: Mutex::new(None),
            connection: Connection::default(),
        }
    }

    async fn refresh(&self) -> Result<CachedToken, NodeError> {
        let url = format!("{}/oauth2/token", self.connection.endpoints.api);
        info!(app_key = %self.app_key, "Refreshing Dropbox app access token");
        let response = self
            .connection
            .http
            .post(url)
            .basic_auth(&self.app_key, Some(&self.app_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NodeError::transient(format!("Token refresh failed: {e}")))?;
        let tokens: RefreshResponse = parse_json(check_status(response).await?).await?;

        Ok(CachedToken {
            access_token: tokens.access_token,
            expires_at: tokens
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

impl std::fmt::Debug for AppSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSession")
            .field("app_key", &self.app_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DropboxSession for AppSession {
    fn has_credentials(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty() && !self.refresh_token.is_empty()
    }

    async fn access_token(&self) -> Result<String, NodeError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            debug!("Using cached Dropbox app token");
            return Ok(token.access_token.clone());
        }
        let token = self.refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    fn endpoints(&self) -> &DropboxEndpoints {
        &self.connection.endpoints
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.connection.http
    }
}

// ============================================================================
// DevTokenSession
// ============================================================================

/// A fixed developer access token
#[derive(Clone)]
pub struct DevTokenSession {
    token: String,
    connection: Connection,
}

impl DevTokenSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            connection: Connection::default(),
        }
    }
}

impl std::fmt::Debug for DevTokenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevTokenSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl DropboxSession for DevTokenSession {
    fn has_credentials(&self) -> bool {
        !self.token.trim().is_empty()
    }

    async fn access_token(&self) -> Result<String, NodeError> {
        Ok(self.token.clone())
    }

    fn endpoints(&self) -> &DropboxEndpoints {
        &self.connection.endpoints
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.connection.http
    }
}

// ============================================================================
// DropboxAuth
// ============================================================================

/// The authentication mode a Dropbox node is configured with
#[derive(Debug)]
pub enum DropboxAuth {
    OAuth2(OAuth2Session),
    App(AppSession),
    DevToken(DevTokenSession),
}

impl DropboxAuth {
    pub fn oauth2(credentials: CredentialSource) -> Self {
        Self::OAuth2(OAuth2Session::new(credentials))
    }

    pub fn app(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self::App(AppSession::new(app_key, app_secret, refresh_token))
    }

    pub fn dev_token(token: impl Into<String>) -> Self {
        Self::DevToken(DevTokenSession::new(token))
    }

    fn connection_mut(&mut self) -> &mut Connection {
        match self {
            Self::OAuth2(s) => &mut s.connection,
            Self::App(s) => &mut s.connection,
            Self::DevToken(s) => &mut s.connection,
        }
    }

    fn session(&self) -> &dyn DropboxSession {
        match self {
            Self::OAuth2(s) => s,
            Self::App(s) => s,
            Self::DevToken(s) => s,
        }
    }

    /// Points every API host at other base URLs
    pub fn with_endpoints(mut self, endpoints: DropboxEndpoints) -> Self {
        self.connection_mut().endpoints = endpoints;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.connection_mut().http = http;
        self
    }
}

#[async_trait]
impl DropboxSession for DropboxAuth {
    fn has_credentials(&self) -> bool {
        self.session().has_credentials()
    }

    async fn access_token(&self) -> Result<String, NodeError> {
        self.session().access_token().await
    }

    fn endpoints(&self) -> &DropboxEndpoints {
        self.session().endpoints()
    }

    fn http_client(&self) -> &reqwest::Client {
        self.session().http_client()
    }
}
