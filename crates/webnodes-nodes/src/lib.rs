//! webnodes Nodes - web service provider nodes
//!
//! Each module wraps one web service and exposes input handlers
//! ([`InputNode`](webnodes_core::ports::InputNode)) and, where the service
//! has something worth watching, a [`WatchSource`](webnodes_watch::WatchSource).
//!
//! ## Modules
//!
//! - [`client`] - Shared HTTP client with auth, status mapping and 429 retry
//! - [`credentials`] - Credential lookup per node instance
//! - [`s3`] - Amazon S3 (SigV4) object watch, get and put
//! - [`dropbox`] - Dropbox folder watch (cursor + long-poll), download, upload
//! - [`weather`] - OpenWeatherMap current conditions
//! - [`swarm`] - Foursquare Swarm check-ins
//! - [`cyclehire`] - TfL cycle hire docking stations
//! - [`fitbit`] - Fitbit activity, sleep and badges
//! - [`pinboard`] - Pinboard bookmarks
//! - [`factory`] - Builds watchers from configuration

pub mod client;
pub mod credentials;
pub mod cyclehire;
pub mod dropbox;
pub mod factory;
pub mod fitbit;
pub mod pinboard;
pub mod s3;
pub mod swarm;
pub mod weather;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;
use webnodes_core::NodeError;
use webnodes_watch::WatchError;

/// Errors that can occur when calling a provider API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with the resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// A server-side error occurred (5xx) or an unexpected status
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The service answered successfully but reported an error in the body
    #[error("{0}")]
    Upstream(String),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Server-provided delay before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::TooManyRequests { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<ApiError> for NodeError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) => NodeError::Auth(e.to_string()),
            ApiError::InvalidResponse(_) => NodeError::malformed(e.to_string()),
            other => NodeError::transient(other.to_string()),
        }
    }
}

impl From<ApiError> for WatchError {
    fn from(e: ApiError) -> Self {
        match e.retry_after() {
            Some(delay) => WatchError::retry_after(e, delay),
            None => WatchError::fetch(e),
        }
    }
}

/// Downloaded bytes as a message payload plus its `encoding` label
///
/// UTF-8 content is kept as text, anything else becomes base64.
pub(crate) fn body_payload(bytes: Vec<u8>) -> (String, &'static str) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, "utf8"),
        Err(e) => (BASE64.encode(e.into_bytes()), "base64"),
    }
}
