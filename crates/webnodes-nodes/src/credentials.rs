//! Where a node instance gets its credentials from

use std::sync::Arc;

use webnodes_auth::AuthorizationFlow;
use webnodes_core::{
    ports::{credentials::require, CredentialStore},
    Credentials, NodeError,
};

/// Credentials lookup for one node instance
///
/// OAuth providers with expiring tokens go through their
/// [`AuthorizationFlow`] so the token is refreshed before use.
#[derive(Clone)]
pub enum CredentialSource {
    Store {
        store: Arc<dyn CredentialStore>,
        id: String,
    },
    Refreshing {
        flow: Arc<AuthorizationFlow>,
        id: String,
    },
}

impl CredentialSource {
    pub fn store(store: Arc<dyn CredentialStore>, id: impl Into<String>) -> Self {
        Self::Store {
            store,
            id: id.into(),
        }
    }

    pub fn refreshing(flow: Arc<AuthorizationFlow>, id: impl Into<String>) -> Self {
        Self::Refreshing {
            flow,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Store { id, .. } | Self::Refreshing { id, .. } => id,
        }
    }

    /// Reads completed credentials, failing with a configuration error when absent
    pub async fn load(&self) -> Result<Credentials, NodeError> {
        match self {
            Self::Store { store, id } => require(store.as_ref(), id).await,
            Self::Refreshing { flow, id } => flow.fresh_credentials(id).await,
        }
    }

    /// Reads an OAuth2 access token
    pub async fn bearer_token(&self) -> Result<String, NodeError> {
        Ok(self.load().await?.bearer_token()?.to_string())
    }

    /// Reads an API key
    pub async fn api_key(&self) -> Result<String, NodeError> {
        Ok(self.load().await?.api_key()?.to_string())
    }
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Store { .. } => "store",
            Self::Refreshing { .. } => "refreshing",
        };
        f.debug_struct("CredentialSource")
            .field("kind", &kind)
            .field("id", &self.id())
            .finish()
    }
}
