//! Credential store adapters
//!
//! - [`MemoryCredentialStore`] - process-local map, used by tests and
//!   one-shot queries
//! - [`KeyringCredentialStore`] - OS credential store (GNOME Keyring, KDE
//!   Wallet, macOS Keychain) with credentials serialized as JSON

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};
use webnodes_core::{ports::CredentialStore, Credentials};

/// Keyring service name used unless another is configured
pub const DEFAULT_KEYRING_SERVICE: &str = "webnodes";

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// Credentials held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `entries`
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Credentials)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self, id: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn write(&self, id: &str, credentials: &Credentials) -> Result<()> {
        self.entries.insert(id.to_string(), credentials.clone());
        Ok(())
    }

    async fn clear(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }
}

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores credentials in the system keyring
///
/// Each credentials id becomes a keyring entry under the configured service
/// name, holding the JSON-serialized [`Credentials`].
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, id).context("Failed to create keyring entry")
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn read(&self, id: &str) -> Result<Option<Credentials>> {
        match self.entry(id)?.get_password() {
            Ok(json) => {
                let credentials = serde_json::from_str(&json)
                    .context("Failed to deserialize credentials from keyring")?;
                debug!(id, "Loaded credentials from keyring");
                Ok(Some(credentials))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(id, "No credentials in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    async fn write(&self, id: &str, credentials: &Credentials) -> Result<()> {
        let json = serde_json::to_string(credentials).context("Failed to serialize credentials")?;
        self.entry(id)?
            .set_password(&json)
            .context("Failed to store credentials in keyring")?;
        debug!(id, kind = credentials.kind(), "Stored credentials in keyring");
        Ok(())
    }

    async fn clear(&self, id: &str) -> Result<()> {
        match self.entry(id)?.delete_credential() {
            Ok(()) => {
                info!(id, "Cleared credentials from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(id, "No credentials to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}
