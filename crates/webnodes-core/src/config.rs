//! Configuration module for webnodes.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation and defaults.

use std::{
    collections::HashSet,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::filter::PathFilter;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for webnodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub admin: AdminConfig,
    pub polling: PollingConfig,
    pub providers: ProvidersConfig,
    pub watchers: Vec<WatcherConfig>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Admin HTTP server hosting the OAuth routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Socket address to bind, e.g. `127.0.0.1:1880`.
    pub bind: String,
    /// Externally visible base URL used to build OAuth redirect URIs.
    pub public_url: String,
}

/// Shared polling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds to wait after a failed fetch before retrying.
    pub error_backoff_secs: u64,
}

/// OAuth client registration for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// S3 endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    /// Override for S3-compatible services; defaults to AWS for `region`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Per-provider application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropbox: Option<OAuthClientConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm: Option<OAuthClientConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitbit: Option<OAuthClientConfig>,
    pub s3: S3Config,
}

/// One configured watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Unique name, also used as the node id in logs and output.
    pub name: String,
    /// Credentials id in the credential store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    /// Poll interval override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(flatten)]
    pub spec: WatcherSpec,
}

/// What a watcher observes, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WatcherSpec {
    S3 {
        bucket: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Dropbox {
        #[serde(default)]
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Weather {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        country: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lon: Option<f64>,
    },
    Swarm,
    Cyclehire {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        station: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lon: Option<f64>,
    },
}

impl WatcherSpec {
    /// The `kind` tag value
    pub fn kind(&self) -> &'static str {
        match self {
            WatcherSpec::S3 { .. } => "s3",
            WatcherSpec::Dropbox { .. } => "dropbox",
            WatcherSpec::Weather { .. } => "weather",
            WatcherSpec::Swarm => "swarm",
            WatcherSpec::Cyclehire { .. } => "cyclehire",
        }
    }

    fn pattern(&self) -> Option<&str> {
        match self {
            WatcherSpec::S3 { pattern, .. } | WatcherSpec::Dropbox { pattern, .. } => {
                pattern.as_deref()
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/webnodes/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("webnodes")
            .join("config.yaml")
    }

    /// Looks up a configured watcher by name.
    pub fn watcher(&self, name: &str) -> Option<&WatcherConfig> {
        self.watchers.iter().find(|w| w.name == name)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:1880".to_string(),
            public_url: "http://127.0.0.1:1880".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            error_backoff_secs: 15 * 60,
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"polling.error_backoff_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: String| {
            errors.push(ValidationError { field, message });
        };

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level".into(),
                format!(
                    "invalid log level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        // --- admin ---
        if self.admin.bind.parse::<SocketAddr>().is_err() {
            push(
                "admin.bind".into(),
                format!("not a socket address: {}", self.admin.bind),
            );
        }
        if url::Url::parse(&self.admin.public_url).is_err() {
            push(
                "admin.public_url".into(),
                format!("not a URL: {}", self.admin.public_url),
            );
        }

        // --- polling ---
        if self.polling.error_backoff_secs == 0 {
            push(
                "polling.error_backoff_secs".into(),
                "must be greater than 0".into(),
            );
        }

        // --- providers ---
        for (name, client) in [
            ("dropbox", &self.providers.dropbox),
            ("swarm", &self.providers.swarm),
            ("fitbit", &self.providers.fitbit),
        ] {
            if let Some(client) = client {
                if client.client_id.trim().is_empty() {
                    push(
                        format!("providers.{name}.client_id"),
                        "must not be empty".into(),
                    );
                }
            }
        }
        if self.providers.s3.region.trim().is_empty() {
            push("providers.s3.region".into(), "must not be empty".into());
        }

        // --- watchers ---
        let mut names = HashSet::new();
        for (i, watcher) in self.watchers.iter().enumerate() {
            let field = |name: &str| format!("watchers[{i}].{name}");

            if watcher.name.trim().is_empty() {
                push(field("name"), "must not be empty".into());
            } else if !names.insert(watcher.name.as_str()) {
                push(
                    field("name"),
                    format!("duplicate watcher name '{}'", watcher.name),
                );
            }

            if watcher.interval_secs == Some(0) {
                push(field("interval_secs"), "must be greater than 0".into());
            }

            if let Err(e) = PathFilter::new(watcher.spec.pattern()) {
                push(field("pattern"), e.to_string());
            }

            match &watcher.spec {
                WatcherSpec::S3 { bucket, .. } if bucket.trim().is_empty() => {
                    push(field("bucket"), "must not be empty".into());
                }
                WatcherSpec::Weather {
                    city, lat, lon, ..
                } if city.is_none() && (lat.is_none() || lon.is_none()) => {
                    push(
                        field("city"),
                        "either city or both lat and lon are required".into(),
                    );
                }
                WatcherSpec::Cyclehire { station, lat, lon }
                    if station.is_none() && (lat.is_none() || lon.is_none()) =>
                {
                    push(
                        field("station"),
                        "either station or both lat and lon are required".into(),
                    );
                }
                _ => {}
            }

            let needs_credentials = !matches!(watcher.spec, WatcherSpec::Cyclehire { .. });
            if needs_credentials && watcher.credentials.is_none() {
                push(
                    field("credentials"),
                    format!("{} watchers require a credentials id", watcher.spec.kind()),
                );
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
