//! Query command - one-shot provider requests
//!
//! Runs the provider's input node once against an empty message and prints
//! what it emits.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use clap::Subcommand;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use webnodes_core::{
    config::Config,
    ports::{invoke, InputNode},
    Message,
};
use webnodes_nodes::{
    credentials::CredentialSource,
    cyclehire::{CycleHireNode, CycleHireSettings, StationQuery},
    factory::authorization_flows,
    fitbit::{FitbitNode, FitbitResource},
    swarm::{SwarmNode, SwarmSettings},
    weather::{WeatherNode, WeatherQuery, WeatherSettings},
};
use webnodes_watch::{ChannelContext, NodeEvent};

use super::credential_store;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    /// Current weather from OpenWeatherMap
    Weather {
        /// Credentials id holding the API key
        #[arg(long)]
        credentials: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Bikes and docks at a TfL cycle hire station
    Cyclehire {
        /// BikePoint id, e.g. BikePoints_1
        #[arg(long)]
        station: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Credentials id holding a TfL app key
        #[arg(long)]
        credentials: Option<String>,
    },
    /// Latest Swarm check-in
    Swarm {
        #[arg(long)]
        credentials: String,
    },
    /// Fitbit activities, sleep or badges
    Fitbit {
        /// One of: activities, sleep, badges
        resource: String,
        /// Day to report (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        credentials: String,
    },
}

impl QueryCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let store = credential_store();
        let mut msg = Message::new("");

        let node: Box<dyn InputNode> = match self {
            QueryCommand::Weather {
                credentials,
                city,
                country,
                lat,
                lon,
            } => {
                let query =
                    WeatherQuery::from_parts(city.as_deref(), country.as_deref(), *lat, *lon)?;
                let settings = WeatherSettings::new(CredentialSource::store(store, credentials));
                Box::new(WeatherNode::new(settings, Some(query)))
            }
            QueryCommand::Cyclehire {
                station,
                lat,
                lon,
                credentials,
            } => {
                let query = StationQuery::from_parts(station.as_deref(), *lat, *lon)?;
                let credentials = credentials
                    .as_ref()
                    .map(|id| CredentialSource::store(store, id));
                Box::new(CycleHireNode::new(
                    CycleHireSettings::new(credentials),
                    Some(query),
                ))
            }
            QueryCommand::Swarm { credentials } => Box::new(SwarmNode::new(SwarmSettings::new(
                CredentialSource::store(store, credentials),
            ))),
            QueryCommand::Fitbit {
                resource,
                date,
                credentials,
            } => {
                let resource = FitbitResource::parse(resource)
                    .ok_or_else(|| anyhow!("Unknown Fitbit resource '{resource}'"))?;
                if let Some(date) = date {
                    msg = msg.with_extra("date", date.as_str());
                }
                let config = Config::load_or_default(config_path);
                let source = match authorization_flows(&config, store.clone(), &reqwest::Client::new())
                    .into_iter()
                    .find(|flow| flow.provider().name() == "fitbit")
                {
                    Some(flow) => CredentialSource::refreshing(flow, credentials),
                    None => CredentialSource::store(store, credentials),
                };
                Box::new(FitbitNode::new(source, resource))
            }
        };

        debug!(kind = node.kind(), "Running one-shot query");
        let (ctx, rx) = ChannelContext::channel(node.kind());
        invoke(node.as_ref(), msg, &ctx).await;
        drop(ctx);
        report(formatter.as_ref(), rx)
    }
}

/// Prints emitted messages; fails if the node reported a problem
fn report(formatter: &dyn OutputFormatter, mut rx: UnboundedReceiver<NodeEvent>) -> Result<()> {
    let mut failure = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            NodeEvent::Message { message, .. } => match serde_json::to_value(&message) {
                Ok(value) => formatter.print_json(&value),
                Err(e) => bail!("Failed to serialize message: {e}"),
            },
            NodeEvent::Warn { text, .. } | NodeEvent::Error { text, .. } => failure = Some(text),
            NodeEvent::Status { .. } => {}
        }
    }
    match failure {
        Some(text) => bail!(text),
        None => Ok(()),
    }
}
