//! Amazon S3 nodes
//!
//! Path-style requests (`{endpoint}/{bucket}/{key}`) signed with SigV4, so
//! any S3-compatible service works by overriding the endpoint.
//!
//! ## Components
//!
//! - [`S3Client`] - list, get and put objects
//! - [`S3Watch`] - snapshot watcher over a bucket (optionally a prefix)
//! - [`S3GetNode`] / [`S3PutNode`] - input handlers
//! - [`sigv4`] - request signing

pub mod sigv4;
mod xml;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::AUTHORIZATION, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, info};
use webnodes_core::{
    config::S3Config,
    diff::{ChangePolicy, DiffOptions, ListingEntry},
    filter::PathFilter,
    ports::{InputNode, NodeContext, NodeStatus},
    ChangeEvent, Credentials, DomainError, Message, NodeError, SubscriptionId, WatchState,
};
use webnodes_watch::{FetchOutcome, WatchError, WatchSource};

use crate::{
    client::{status_error, ApiAuth, ApiClient},
    body_payload,
    credentials::CredentialSource,
    ApiError,
};

use self::sigv4::{encode_component, encode_path, payload_hash, Signer};

/// Default poll interval of an S3 watcher
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Longest non-XML error body quoted in an error
const MAX_ERROR_BODY: usize = 300;

/// Metadata of one object in a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    /// ETag without surrounding quotes
    pub etag: String,
    pub last_modified: String,
    pub size: u64,
}

impl ObjectInfo {
    /// Compared between polls
    pub fn fingerprint(&self) -> Value {
        json!({ "etag": self.etag, "lastModified": self.last_modified })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "key": self.key,
            "etag": self.etag,
            "lastModified": self.last_modified,
            "size": self.size,
        })
    }
}

// ============================================================================
// S3Client
// ============================================================================

/// Signed client for one endpoint and region
#[derive(Debug, Clone)]
pub struct S3Client {
    api: ApiClient,
    signer: Signer,
    scheme: String,
    /// `host[:port]` as sent in the `Host` header
    host: String,
    /// Path prefix of the endpoint, usually empty
    base_path: String,
}

impl S3Client {
    /// Creates a client; `endpoint` defaults to `https://s3.{region}.amazonaws.com`
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, NodeError> {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
        let url = url::Url::parse(&endpoint)
            .map_err(|e| NodeError::config(format!("Invalid S3 endpoint {endpoint}: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(NodeError::config(format!(
                    "Invalid S3 endpoint {endpoint}: no host"
                )))
            }
        };

        Ok(Self {
            api: ApiClient::new(endpoint.as_str(), ApiAuth::None),
            signer: Signer::new(access_key_id, secret_access_key, region),
            scheme: url.scheme().to_string(),
            host,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a client from stored [`Credentials::AwsKeys`]
    pub fn from_credentials(credentials: &Credentials, config: &S3Config) -> Result<Self, NodeError> {
        match credentials {
            Credentials::AwsKeys {
                access_key_id,
                secret_access_key,
            } => Self::new(
                access_key_id.as_str(),
                secret_access_key.as_str(),
                &config.region,
                config.endpoint.as_deref(),
            ),
            other => Err(DomainError::CredentialsMismatch {
                expected: "aws_keys".to_string(),
                found: other.kind().to_string(),
            }
            .into()),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(client);
        self
    }

    fn object_path(&self, bucket: &str, key: &str) -> String {
        let mut path = format!("{}/{}", self.base_path, encode_component(bucket));
        if !key.is_empty() {
            path.push('/');
            path.push_str(&encode_path(key));
        }
        path
    }

    fn signed_request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: &[u8],
    ) -> RequestBuilder {
        let content_sha256 = payload_hash(body);
        let signed = self.signer.sign(
            method.as_str(),
            &self.host,
            path,
            query,
            &content_sha256,
            Utc::now(),
        );

        let mut url = format!("{}://{}{}", self.scheme, self.host, path);
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
                .collect();
            url.push('?');
            url.push_str(&encoded.join("&"));
        }

        self.api
            .http_client()
            .request(method, url)
            .header(AUTHORIZATION, signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .body(body.to_vec())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: &[u8],
    ) -> Result<Response, ApiError> {
        let response = self
            .api
            .execute_with_retry(|| self.signed_request(method.clone(), path, query, body))
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = xml::error_summary(&body)
            .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());
        debug!(%status, path, "S3 returned error status");
        Err(status_error(status, format!("HTTP {status}: {detail}")))
    }

    /// Lists every object under `prefix`, following continuation tokens
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>, ApiError> {
        let path = self.object_path(bucket, "");
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("list-type".to_string(), "2".to_string())];
            if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let body = self.send(Method::GET, &path, &query, &[]).await?.text().await?;
            let page = xml::parse_list_objects(&body)?;
            objects.extend(page.contents.into_iter().map(|c| ObjectInfo {
                key: c.key,
                etag: c.etag.trim_matches('"').to_string(),
                last_modified: c.last_modified,
                size: c.size,
            }));

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(token)) => continuation = Some(token),
                (true, None) => {
                    return Err(ApiError::InvalidResponse(
                        "truncated listing without continuation token".to_string(),
                    ))
                }
                (false, _) => break,
            }
        }

        debug!(bucket, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.object_path(bucket, key);
        let response = self.send(Method::GET, &path, &[], &[]).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Uploads an object, returning its ETag when the server sends one
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> Result<Option<String>, ApiError> {
        let path = self.object_path(bucket, key);
        let response = self.send(Method::PUT, &path, &[], body).await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        info!(bucket, key, bytes = body.len(), "Uploaded object");
        Ok(etag)
    }
}

// ============================================================================
// S3Watch
// ============================================================================

/// Watches a bucket for added, changed and deleted objects
///
/// The first listing only seeds the state. An object whose ETag or
/// LastModified changes is reported as `change`.
pub struct S3Watch {
    client: S3Client,
    bucket: String,
    prefix: Option<String>,
    subscription: SubscriptionId,
    options: DiffOptions,
    interval: Duration,
}

impl S3Watch {
    pub fn new(
        client: S3Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
        filter: PathFilter,
    ) -> Result<Self, NodeError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(NodeError::config("No bucket specified"));
        }
        let subscription = SubscriptionId::new(format!(
            "s3:{bucket}/{}{}",
            prefix.as_deref().unwrap_or(""),
            filter.pattern().map(|p| format!(":{p}")).unwrap_or_default()
        ))?;

        Ok(Self {
            client,
            bucket,
            prefix,
            subscription,
            options: DiffOptions {
                filter,
                change_policy: ChangePolicy::ReportChanged,
                ..DiffOptions::default()
            },
            interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl WatchSource for S3Watch {
    fn subscription(&self) -> SubscriptionId {
        self.subscription.clone()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn diff_options(&self) -> DiffOptions {
        self.options.clone()
    }

    async fn fetch(&mut self, _state: &WatchState) -> Result<FetchOutcome, WatchError> {
        let objects = self
            .client
            .list_objects(&self.bucket, self.prefix.as_deref())
            .await?;
        Ok(FetchOutcome::snapshot(
            objects
                .iter()
                .map(|o| ListingEntry::with_payload(&o.key, o.fingerprint(), o.to_value()))
                .collect(),
        ))
    }

    fn message_for(&self, event: &ChangeEvent) -> Message {
        Message::from_change(event).with_extra("bucket", self.bucket.clone())
    }
}

// ============================================================================
// Input nodes
// ============================================================================

/// Credentials, endpoint and default object of the get and put handlers
#[derive(Debug, Clone)]
pub struct S3Target {
    credentials: CredentialSource,
    config: S3Config,
    bucket: Option<String>,
    key: Option<String>,
    http: reqwest::Client,
}

impl S3Target {
    pub fn new(credentials: CredentialSource, config: S3Config) -> Self {
        Self {
            credentials,
            config,
            bucket: None,
            key: None,
            http: reqwest::Client::new(),
        }
    }

    /// Bucket used when the message has no `bucket`
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Key used when the message has no `filename`
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Bucket and key from the message, falling back to the node settings
    fn resolve(&self, msg: &Message) -> Result<(String, String), NodeError> {
        let bucket = msg
            .str_field("bucket")
            .or(self.bucket.as_deref())
            .ok_or_else(|| NodeError::config("No bucket specified"))?;
        let key = msg
            .str_field("filename")
            .or(self.key.as_deref())
            .ok_or_else(|| NodeError::config("No filename specified"))?;
        Ok((bucket.to_string(), key.to_string()))
    }

    async fn client(&self) -> Result<S3Client, NodeError> {
        let credentials = self.credentials.load().await?;
        Ok(S3Client::from_credentials(&credentials, &self.config)?
            .with_http_client(self.http.clone()))
    }
}

/// Downloads an object into `payload`
///
/// UTF-8 content is sent as text; anything else is base64-encoded and the
/// message carries `encoding: "base64"`.
#[derive(Debug, Clone)]
pub struct S3GetNode {
    target: S3Target,
}

impl S3GetNode {
    pub fn new(target: S3Target) -> Self {
        Self { target }
    }
}

#[async_trait]
impl InputNode for S3GetNode {
    fn kind(&self) -> &'static str {
        "s3 get"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let (bucket, key) = self.target.resolve(&msg)?;
        let client = self.target.client().await?;

        ctx.status(NodeStatus::busy("downloading"));
        let bytes = client.get_object(&bucket, &key).await?;
        let (payload, encoding) = body_payload(bytes);

        let mut out = msg
            .with_extra("bucket", bucket)
            .with_extra("filename", key)
            .with_extra("encoding", encoding);
        out.payload = Value::String(payload);
        ctx.status(NodeStatus::clear());
        ctx.send(out);
        Ok(())
    }
}

/// Uploads `payload` as an object
#[derive(Debug, Clone)]
pub struct S3PutNode {
    target: S3Target,
}

impl S3PutNode {
    pub fn new(target: S3Target) -> Self {
        Self { target }
    }
}

#[async_trait]
impl InputNode for S3PutNode {
    fn kind(&self) -> &'static str {
        "s3 put"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let (bucket, key) = self.target.resolve(&msg)?;
        let body = msg
            .payload_bytes()
            .ok_or_else(|| NodeError::config("No payload specified"))?;
        let client = self.target.client().await?;

        ctx.status(NodeStatus::busy("uploading"));
        client.put_object(&bucket, &key, &body).await?;
        ctx.status(NodeStatus::clear());
        Ok(())
    }
}
