//! OAuth2 authorization code flow
//!
//! [`AuthorizationFlow::start`] generates a random CSRF token, remembers it
//! as [`Credentials::Pending`] under the credentials id and returns the
//! provider's authorization URL with `state = "{id}:{token}"`. Credentials
//! already stored under the id are kept inside the pending entry and stay
//! usable until the callback succeeds.
//! [`AuthorizationFlow::complete`] checks the returned state against the
//! pending entry, exchanges the code, looks up the account name and only
//! then replaces the pending entry with [`Credentials::OAuth2`].
//!
//! Token responses are parsed leniently (`token_type` is optional) because
//! not every provider sends one.

use std::sync::Arc;

use chrono::{Duration, Utc};
use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use webnodes_core::{
    config::OAuthClientConfig,
    ports::{credentials::require, CredentialStore},
    Credentials, NodeError,
};

use crate::{
    provider::{ClientAuth, OAuthProvider},
    AuthError,
};

/// Tokens expiring within this margin are refreshed before use
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Longest token-endpoint body quoted in an error
const MAX_ERROR_BODY: usize = 200;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_credentials(
        self,
        display_name: Option<String>,
        previous_refresh_token: Option<String>,
    ) -> Credentials {
        Credentials::OAuth2 {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            display_name,
        }
    }
}

/// A completed authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Credentials id the tokens were stored under
    pub id: String,
    pub credentials: Credentials,
}

/// Authorization and refresh for one provider
pub struct AuthorizationFlow {
    provider: Arc<dyn OAuthProvider>,
    client: OAuthClientConfig,
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        client: OAuthClientConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            provider,
            client,
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Replaces the HTTP client used for token and profile requests
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn provider(&self) -> &dyn OAuthProvider {
        self.provider.as_ref()
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Begins an authorization for credentials `id`
    ///
    /// # Returns
    /// The provider authorization URL the user should be redirected to
    pub async fn start(&self, id: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let endpoints = self.provider.endpoints();
        let client = BasicClient::new(ClientId::new(self.client.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(endpoints.auth_url.clone())
                    .map_err(|e| AuthError::InvalidConfig(format!("authorization URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string())
                    .map_err(|e| AuthError::InvalidConfig(format!("redirect URI: {e}")))?,
            );

        let csrf = CsrfToken::new_random();
        let state = format!("{id}:{}", csrf.secret());

        let mut request = client.authorize_url(|| CsrfToken::new(state));
        for scope in &endpoints.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        for (name, value) in &endpoints.extra_params {
            request = request.add_extra_param(name.as_str(), value.as_str());
        }
        let (auth_url, _state) = request.url();

        let existing = self.store.read(id).await.map_err(AuthError::store)?;
        let pending = Credentials::Pending {
            csrf_token: csrf.secret().clone(),
            redirect_uri: redirect_uri.to_string(),
            previous: existing
                .as_ref()
                .and_then(Credentials::current)
                .cloned()
                .map(Box::new),
        };
        self.store
            .write(id, &pending)
            .await
            .map_err(AuthError::store)?;

        info!(provider = self.provider.name(), id, "Started authorization");
        Ok(auth_url.to_string())
    }

    /// Finishes an authorization from the callback's `code` and `state`
    ///
    /// Nothing is persisted unless the state matches, the code exchange
    /// succeeds and the account name can be fetched.
    pub async fn complete(&self, code: &str, state: &str) -> Result<Authorization, AuthError> {
        let (id, token) = state.rsplit_once(':').ok_or(AuthError::CsrfMismatch)?;

        let pending = self.store.read(id).await.map_err(AuthError::store)?;
        let redirect_uri = match pending {
            Some(Credentials::Pending {
                csrf_token,
                redirect_uri,
                ..
            }) if bool::from(csrf_token.as_bytes().ct_eq(token.as_bytes())) => redirect_uri,
            _ => {
                warn!(provider = self.provider.name(), id, "Callback state does not match");
                return Err(AuthError::CsrfMismatch);
            }
        };

        let tokens = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;

        let display_name = self
            .provider
            .display_name(&self.http, &tokens.access_token)
            .await?;
        debug!(provider = self.provider.name(), id, account = %display_name, "Fetched account name");

        let credentials = tokens.into_credentials(Some(display_name), None);
        self.store
            .write(id, &credentials)
            .await
            .map_err(AuthError::store)?;

        info!(provider = self.provider.name(), id, "Authorization completed");
        Ok(Authorization {
            id: id.to_string(),
            credentials,
        })
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Exchanges the stored refresh token for a new access token
    ///
    /// A pending re-authorization is left in place with the refreshed
    /// tokens as its previous credentials.
    pub async fn refresh(&self, id: &str) -> Result<Credentials, AuthError> {
        let stored = self.store.read(id).await.map_err(AuthError::store)?;
        let Some(Credentials::OAuth2 {
            refresh_token: Some(refresh_token),
            display_name,
            ..
        }) = stored.as_ref().and_then(Credentials::current).cloned()
        else {
            return Err(AuthError::NoRefreshToken(id.to_string()));
        };

        info!(provider = self.provider.name(), id, "Refreshing access token");
        let tokens = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await?;

        let credentials = tokens.into_credentials(display_name, Some(refresh_token));
        let updated = match stored {
            Some(Credentials::Pending {
                csrf_token,
                redirect_uri,
                ..
            }) => Credentials::Pending {
                csrf_token,
                redirect_uri,
                previous: Some(Box::new(credentials.clone())),
            },
            _ => credentials.clone(),
        };
        self.store
            .write(id, &updated)
            .await
            .map_err(AuthError::store)?;
        Ok(credentials)
    }

    /// Reads credentials for `id`, refreshing tokens that are about to expire
    pub async fn fresh_credentials(&self, id: &str) -> Result<Credentials, NodeError> {
        let credentials = require(self.store.as_ref(), id).await?;
        if !credentials.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES)) {
            return Ok(credentials);
        }

        match &credentials {
            Credentials::OAuth2 {
                refresh_token: Some(_),
                ..
            } => Ok(self.refresh(id).await?),
            _ => {
                warn!(id, "Access token is expiring and cannot be refreshed");
                Ok(credentials)
            }
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let endpoints = self.provider.endpoints();
        let mut form = params.to_vec();
        let mut request = self
            .http
            .post(&endpoints.token_url)
            .header(ACCEPT, "application/json");

        match endpoints.client_auth {
            ClientAuth::RequestBody => {
                form.push(("client_id", self.client.client_id.as_str()));
                form.push(("client_secret", self.client.client_secret.as_str()));
            }
            ClientAuth::BasicAuth => {
                request = request.basic_auth(&self.client.client_id, Some(&self.client.client_secret));
            }
        }

        let response = request.form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
            warn!(provider = self.provider.name(), status = %status, "Token endpoint rejected request");
            return Err(AuthError::TokenExchange(format!("HTTP {status}: {excerpt}")));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::TokenExchange(format!("unexpected token response: {e}")))
    }
}
