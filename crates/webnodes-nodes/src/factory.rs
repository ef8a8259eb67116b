//! Builds watchers and authorization flows from configuration

use std::{collections::HashMap, sync::Arc, time::Duration};

use tracing::{debug, info};
use webnodes_auth::{AuthorizationFlow, OAuthProvider};
use webnodes_core::{
    config::{Config, WatcherConfig, WatcherSpec},
    filter::PathFilter,
    ports::CredentialStore,
    NodeError,
};
use webnodes_watch::{RetryPolicy, WatchSource, Watcher};

use crate::{
    credentials::CredentialSource,
    cyclehire::{CycleHireSettings, CycleHireWatch, StationQuery},
    dropbox::{DropboxAuth, DropboxProvider, DropboxSession},
    fitbit::FitbitProvider,
    s3::{S3Client, S3Watch},
    swarm::{SwarmProvider, SwarmSettings, SwarmWatch},
    weather::{WeatherQuery, WeatherSettings, WeatherWatch},
};

/// A watcher over any provider
pub type DynWatcher = Watcher<Box<dyn WatchSource>>;

/// One [`AuthorizationFlow`] per provider with a client registration
pub fn authorization_flows(
    config: &Config,
    store: Arc<dyn CredentialStore>,
    http: &reqwest::Client,
) -> Vec<Arc<AuthorizationFlow>> {
    let providers: [(Arc<dyn OAuthProvider>, _); 3] = [
        (Arc::new(DropboxProvider::new()), &config.providers.dropbox),
        (Arc::new(SwarmProvider::new()), &config.providers.swarm),
        (Arc::new(FitbitProvider::new()), &config.providers.fitbit),
    ];

    providers
        .into_iter()
        .filter_map(|(provider, client)| {
            let client = client.clone()?;
            debug!(provider = provider.name(), "Registering OAuth provider");
            Some(Arc::new(
                AuthorizationFlow::new(provider, client, store.clone())
                    .with_http_client(http.clone()),
            ))
        })
        .collect()
}

/// Turns [`WatcherConfig`] entries into ready-to-run watchers
pub struct WatcherFactory {
    config: Config,
    store: Arc<dyn CredentialStore>,
    flows: HashMap<String, Arc<AuthorizationFlow>>,
    http: reqwest::Client,
}

impl WatcherFactory {
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            store,
            flows: HashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Credentials of this flow's provider are refreshed before use
    pub fn with_flow(mut self, flow: Arc<AuthorizationFlow>) -> Self {
        self.flows.insert(flow.provider().name().to_string(), flow);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn credentials(&self, watcher: &WatcherConfig) -> Result<CredentialSource, NodeError> {
        let id = watcher.credentials.as_deref().ok_or_else(|| {
            NodeError::config(format!("Watcher '{}' has no credentials id", watcher.name))
        })?;
        Ok(match self.flows.get(watcher.spec.kind()) {
            Some(flow) => CredentialSource::refreshing(flow.clone(), id),
            None => CredentialSource::store(self.store.clone(), id),
        })
    }

    /// Builds the watch source for one configured watcher
    ///
    /// S3 credentials are read here because the request signer needs them.
    pub async fn source(&self, watcher: &WatcherConfig) -> Result<Box<dyn WatchSource>, NodeError> {
        let interval = watcher.interval_secs.map(Duration::from_secs);

        let source: Box<dyn WatchSource> = match &watcher.spec {
            WatcherSpec::S3 {
                bucket,
                prefix,
                pattern,
            } => {
                let credentials = self.credentials(watcher)?.load().await?;
                let client = S3Client::from_credentials(&credentials, &self.config.providers.s3)?
                    .with_http_client(self.http.clone());
                let filter = PathFilter::new(pattern.as_deref())?;
                let watch = S3Watch::new(client, bucket.as_str(), prefix.clone(), filter)?;
                match interval {
                    Some(i) => Box::new(watch.with_interval(i)),
                    None => Box::new(watch),
                }
            }
            WatcherSpec::Dropbox { path, pattern } => {
                let session = Arc::new(
                    DropboxAuth::oauth2(self.credentials(watcher)?).with_http_client(self.http.clone()),
                );
                let watch = session.event_stream(path, PathFilter::new(pattern.as_deref())?)?;
                match interval {
                    Some(i) => Box::new(watch.with_interval(i)),
                    None => Box::new(watch),
                }
            }
            WatcherSpec::Weather {
                city,
                country,
                lat,
                lon,
            } => {
                let query =
                    WeatherQuery::from_parts(city.as_deref(), country.as_deref(), *lat, *lon)?;
                let mut settings = WeatherSettings::new(self.credentials(watcher)?);
                settings.http = self.http.clone();
                let watch = WeatherWatch::new(settings, query)?;
                match interval {
                    Some(i) => Box::new(watch.with_interval(i)),
                    None => Box::new(watch),
                }
            }
            WatcherSpec::Swarm => {
                let mut settings = SwarmSettings::new(self.credentials(watcher)?);
                settings.http = self.http.clone();
                let watch = SwarmWatch::new(settings)?;
                match interval {
                    Some(i) => Box::new(watch.with_interval(i)),
                    None => Box::new(watch),
                }
            }
            WatcherSpec::Cyclehire { station, lat, lon } => {
                let query = StationQuery::from_parts(station.as_deref(), *lat, *lon)?;
                let credentials = match watcher.credentials {
                    Some(_) => Some(self.credentials(watcher)?),
                    None => None,
                };
                let mut settings = CycleHireSettings::new(credentials);
                settings.http = self.http.clone();
                let watch = CycleHireWatch::new(settings, query)?;
                match interval {
                    Some(i) => Box::new(watch.with_interval(i)),
                    None => Box::new(watch),
                }
            }
        };

        info!(
            watcher = %watcher.name,
            kind = watcher.spec.kind(),
            subscription = %source.subscription(),
            "Built watcher"
        );
        Ok(source)
    }

    /// Builds a watcher with the configured error backoff
    pub async fn build(&self, watcher: &WatcherConfig) -> Result<DynWatcher, NodeError> {
        let source = self.source(watcher).await?;
        let backoff = Duration::from_secs(self.config.polling.error_backoff_secs);
        Ok(Watcher::new(source).with_retry_policy(RetryPolicy::new(backoff)))
    }

    /// Builds every configured watcher, keeping failures per watcher name
    pub async fn build_all(&self) -> Vec<(String, Result<DynWatcher, NodeError>)> {
        let mut built = Vec::with_capacity(self.config.watchers.len());
        for watcher in &self.config.watchers {
            built.push((watcher.name.clone(), self.build(watcher).await));
        }
        built
    }
}
