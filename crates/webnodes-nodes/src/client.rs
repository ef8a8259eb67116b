//! Shared HTTP client for provider APIs
//!
//! Wraps `reqwest::Client` with a base URL, the provider's authentication
//! style, HTTP status mapping to [`ApiError`] and automatic retry of 429
//! responses honoring `Retry-After`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use webnodes_nodes::client::{ApiAuth, ApiClient};
//!
//! # async fn example() -> Result<(), webnodes_nodes::ApiError> {
//! let client = ApiClient::new("https://api.example.com", ApiAuth::Bearer("token".into()));
//! let profile: serde_json::Value = client.get_json("/me", &[]).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::ApiError;

/// Default retry-after duration when the header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Longest response body quoted in an error
const MAX_ERROR_BODY: usize = 300;

/// How requests authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuth {
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// A query parameter such as `APPID` or `oauth_token`
    QueryParam { name: &'static str, value: String },
}

/// HTTP client bound to one provider API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: ApiAuth,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, auth: ApiAuth) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Shares an existing `reqwest::Client` (connection pool)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Creates an authenticated request builder for `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            ApiAuth::None => builder,
            ApiAuth::Bearer(token) => builder.bearer_auth(token),
            ApiAuth::QueryParam { name, value } => builder.query(&[(*name, value.as_str())]),
        }
    }

    /// Sends the request built by `make`, retrying 429 responses
    ///
    /// `make` is called once per attempt so signed requests can be re-signed.
    /// The returned response may carry any status other than 429.
    pub async fn execute_with_retry<F>(&self, make: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = make().send().await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                if attempt > 0 {
                    info!(url = %response.url(), attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                .unwrap_or(DEFAULT_RETRY_AFTER);

            if attempt >= self.max_retries {
                warn!(url = %response.url(), attempts = attempt + 1, "429 retry limit exhausted");
                return Err(ApiError::TooManyRequests { retry_after });
            }

            info!(
                url = %response.url(),
                attempt,
                retry_after_ms = retry_after.as_millis() as u64,
                "Received 429, backing off"
            );
            tokio::time::sleep(retry_after).await;
            attempt += 1;
        }
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry) but maps error statuses
    pub async fn send<F>(&self, make: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        check_status(self.execute_with_retry(make).await?).await
    }

    /// GETs `path` with extra query parameters and parses the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self
            .send(|| self.request(Method::GET, path).query(query))
            .await?;
        parse_json(response).await
    }
}

/// Maps error statuses to [`ApiError`], passing successful responses through
pub async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!(
        "HTTP {status}: {}",
        body.chars().take(MAX_ERROR_BODY).collect::<String>()
    );
    debug!(%status, "API returned error status");
    Err(status_error(status, detail))
}

/// Maps an error status and its description to [`ApiError`]
pub fn status_error(status: StatusCode, detail: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(detail),
        StatusCode::FORBIDDEN => ApiError::Forbidden(detail),
        StatusCode::NOT_FOUND => ApiError::NotFound(detail),
        StatusCode::CONFLICT => ApiError::Conflict(detail),
        StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests {
            retry_after: DEFAULT_RETRY_AFTER,
        },
        _ => ApiError::ServerError(detail),
    }
}

/// Reads a JSON body, reporting shape mismatches as invalid responses
pub async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds or an HTTP date (RFC 2822). Dates in the past or
/// more than an hour away fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
