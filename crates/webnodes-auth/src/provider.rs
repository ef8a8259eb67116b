//! Per-provider OAuth settings
//!
//! Each service that authorizes through the admin routes implements
//! [`OAuthProvider`]: where to send the user, where to exchange the code, how
//! the client authenticates there, and how to find a human-readable account
//! name once a token is in hand.

use async_trait::async_trait;

use crate::AuthError;

/// How the client proves its identity at the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` and `client_secret` as form fields
    RequestBody,
    /// HTTP basic authentication with the client id and secret
    BasicAuth,
}

/// OAuth endpoints and request options of one provider
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub client_auth: ClientAuth,
    /// Extra query parameters on the authorization URL
    pub extra_params: Vec<(String, String)>,
}

impl OAuthEndpoints {
    pub fn new(auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            scopes: Vec::new(),
            client_auth: ClientAuth::RequestBody,
            extra_params: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_client_auth(mut self, client_auth: ClientAuth) -> Self {
        self.client_auth = client_auth;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }
}

/// A service that issues OAuth2 tokens through the admin routes
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Route prefix, e.g. `dropbox` for `/dropbox-credentials/auth`
    fn name(&self) -> &str;

    fn endpoints(&self) -> &OAuthEndpoints;

    /// Looks up the account name shown to the user after authorizing
    async fn display_name(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<String, AuthError>;
}
