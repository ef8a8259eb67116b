//! Watch command - run every configured watcher
//!
//! Builds one watcher per `watchers` entry, runs them as independent tasks
//! and prints what they emit until Ctrl+C.

use std::{path::Path, sync::Arc};

use anyhow::{bail, Result};
use clap::Args;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use webnodes_nodes::factory::{authorization_flows, WatcherFactory};
use webnodes_watch::ChannelContext;

use super::{credential_store, load_config, shutdown_signal};
use crate::output::{get_formatter, print_event, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Only run the watcher with this name
    #[arg(long)]
    only: Option<String>,
}

impl WatchCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let mut config = load_config(config_path, formatter.as_ref())?;
        if let Some(only) = &self.only {
            config.watchers.retain(|w| &w.name == only);
            if config.watchers.is_empty() {
                bail!("No watcher named '{only}' in {}", config_path.display());
            }
        }

        let store = credential_store();
        let http = reqwest::Client::new();
        let factory = authorization_flows(&config, store.clone(), &http)
            .into_iter()
            .fold(
                WatcherFactory::new(config, store).with_http_client(http),
                WatcherFactory::with_flow,
            );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for (name, built) in factory.build_all().await {
            match built {
                Ok(watcher) => {
                    let ctx = ChannelContext::new(name, tx.clone());
                    handles.push(watcher.spawn(Arc::new(ctx), cancel.child_token()));
                }
                Err(e) => formatter.error(&format!("Watcher '{name}' not started: {e}")),
            }
        }
        drop(tx);

        if handles.is_empty() {
            bail!("No watchers could be started");
        }
        formatter.success(&format!(
            "Running {} watcher(s). Press Ctrl+C to stop.",
            handles.len()
        ));

        tokio::spawn(shutdown_signal(cancel.clone()));

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => print_event(formatter.as_ref(), &event),
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        info!(watchers = handles.len(), "Stopping watchers");
        for handle in handles {
            handle.stop().await;
        }
        formatter.success("Stopped");
        Ok(())
    }
}
