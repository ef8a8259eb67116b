//! webnodes Auth - OAuth authorization and credential storage
//!
//! Provides:
//! - The authorization code flow with CSRF-protected state
//! - Token exchange and refresh against provider token endpoints
//! - Admin routes (`/{provider}-credentials/auth[/callback]`) and the HTTP
//!   server that mounts them
//! - In-memory and OS keyring credential stores
//!
//! ## Modules
//!
//! - [`provider`] - Per-provider OAuth endpoints and profile lookup
//! - [`flow`] - Authorization start/complete and token refresh
//! - [`routes`] - Transport-independent admin route handling
//! - [`server`] - hyper server for the admin routes
//! - [`store`] - [`CredentialStore`](webnodes_core::ports::CredentialStore) adapters

pub mod flow;
pub mod provider;
pub mod routes;
pub mod server;
pub mod store;

use thiserror::Error;
use webnodes_core::NodeError;

pub use flow::AuthorizationFlow;
pub use provider::{ClientAuth, OAuthEndpoints, OAuthProvider};
pub use routes::{AdminResponse, AdminRoutes};
pub use server::AdminServer;
pub use store::{KeyringCredentialStore, MemoryCredentialStore};

/// Errors raised while authorizing or refreshing credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required query parameter was absent
    #[error("request does not contain the required parameters")]
    MissingParameters,

    /// The callback state does not match a pending authorization
    #[error("CSRF token mismatch, possible cross site request forgery attempt.")]
    CsrfMismatch,

    /// The provider reported an error instead of a code
    #[error("Authorization denied: {0}")]
    Denied(String),

    /// The token endpoint rejected the request or answered nonsense
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The profile lookup after the exchange failed
    #[error("Failed to fetch account details: {0}")]
    Profile(String),

    /// Refresh requested for credentials without a refresh token
    #[error("No refresh token stored for {0}")]
    NoRefreshToken(String),

    /// Malformed endpoint or redirect URL
    #[error("Invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    /// The credential store failed
    #[error("Credential store error: {0}")]
    Store(String),

    /// Network error talking to the provider
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AuthError {
    /// HTTP status the admin routes answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingParameters | AuthError::Denied(_) | AuthError::InvalidConfig(_) => {
                400
            }
            AuthError::CsrfMismatch => 401,
            _ => 500,
        }
    }

    pub(crate) fn store(e: anyhow::Error) -> Self {
        AuthError::Store(format!("{e:#}"))
    }
}

impl From<AuthError> for NodeError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Network(_) | AuthError::Store(_) => NodeError::transient(e.to_string()),
            other => NodeError::Auth(other.to_string()),
        }
    }
}
