//! Credential store port
//!
//! The host owns credential persistence. Nodes only ever see this narrow
//! interface and never write secrets anywhere else.

use crate::domain::{Credentials, NodeError};

/// Read/write/clear access to credentials keyed by node or credentials id
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the credentials stored under `id`, if any
    async fn read(&self, id: &str) -> anyhow::Result<Option<Credentials>>;

    /// Stores credentials under `id`, replacing any previous value
    async fn write(&self, id: &str, credentials: &Credentials) -> anyhow::Result<()>;

    /// Removes credentials stored under `id`; clearing a missing id succeeds
    async fn clear(&self, id: &str) -> anyhow::Result<()>;
}

/// Reads credentials that a handler cannot work without
///
/// While a re-authorization is pending the earlier credentials are returned.
/// A missing entry or a first authorization that has not finished is a
/// configuration error; a store failure is transient.
pub async fn require(store: &dyn CredentialStore, id: &str) -> Result<Credentials, NodeError> {
    match store.read(id).await {
        Ok(Some(creds)) => creds.current().cloned().ok_or_else(|| {
            NodeError::config(format!("Authorization for {id} has not been completed"))
        }),
        Ok(None) => Err(NodeError::config(format!("Missing credentials for {id}"))),
        Err(e) => Err(NodeError::transient(format!(
            "Failed to read credentials for {id}: {e:#}"
        ))),
    }
}
