//! Serve-auth command - host the OAuth admin routes
//!
//! Mounts `/{provider}-credentials/auth` and its callback for every
//! provider with a client registration in `providers`.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use webnodes_auth::{AdminRoutes, AdminServer};
use webnodes_nodes::factory::authorization_flows;

use super::{credential_store, load_config, shutdown_signal};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ServeAuthCommand {
    /// Address to listen on (defaults to admin.bind)
    #[arg(long)]
    bind: Option<String>,
}

impl ServeAuthCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config = load_config(config_path, formatter.as_ref())?;

        let routes = authorization_flows(&config, credential_store(), &reqwest::Client::new())
            .into_iter()
            .fold(AdminRoutes::new(), AdminRoutes::with_flow);
        let providers: Vec<String> = routes.providers().iter().map(|p| p.to_string()).collect();
        if providers.is_empty() {
            formatter.warn("No OAuth providers configured; every route will answer 404");
        }

        let bind = self.bind.as_deref().unwrap_or(&config.admin.bind);
        let listener = AdminServer::bind(bind).await?;

        formatter.success(&format!("Admin routes listening on {bind}"));
        for provider in &providers {
            formatter.info(&format!(
                "{}/{provider}-credentials/auth?id=<credentials id>&callback=<redirect url>",
                config.admin.public_url.trim_end_matches('/')
            ));
        }

        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_signal(cancel.clone()));
        AdminServer::new(routes).serve(listener, cancel).await
    }
}
