//! Subcommands and the helpers they share

pub mod config;
pub mod query;
pub mod serve_auth;
pub mod watch;

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use webnodes_auth::KeyringCredentialStore;
use webnodes_core::{config::Config, ports::CredentialStore};

use crate::output::OutputFormatter;

/// Loads and validates the configuration file
///
/// Every validation error is printed before failing.
pub fn load_config(path: &Path, formatter: &dyn OutputFormatter) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            formatter.error(&error.to_string());
        }
        bail!("Configuration has {} error(s)", errors.len());
    }
    info!(config_path = %path.display(), watchers = config.watchers.len(), "Loaded configuration");
    Ok(config)
}

/// The OS keyring holding provider credentials
pub fn credential_store() -> Arc<dyn CredentialStore> {
    Arc::new(KeyringCredentialStore::default())
}

/// Waits for SIGTERM or SIGINT and cancels `token`
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}
