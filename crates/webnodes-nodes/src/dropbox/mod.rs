//! Dropbox nodes
//!
//! Uses the Dropbox API v2 RPC endpoints (`api.dropboxapi.com`), the content
//! endpoints for file transfer (`content.dropboxapi.com`, arguments in the
//! `Dropbox-API-Arg` header) and the long-poll endpoint
//! (`notify.dropboxapi.com`).
//!
//! ## Components
//!
//! - [`DropboxClient`] - authenticated API calls
//! - [`session`] - how a node authenticates ([`DropboxAuth`])
//! - [`watch`] - cursor + long-poll folder watcher
//! - [`DropboxDownloadNode`] / [`DropboxUploadNode`] - input handlers
//! - [`DropboxProvider`] - OAuth provider for the admin routes

pub mod session;
pub mod watch;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use webnodes_auth::{AuthError, ClientAuth, OAuthEndpoints, OAuthProvider};
use webnodes_core::{
    diff::ChangeRecord,
    ports::{InputNode, NodeContext, NodeStatus},
    Message, NodeError,
};

use crate::{
    body_payload,
    client::{check_status, parse_json, ApiAuth, ApiClient},
    ApiError,
};

pub use session::{AppSession, DevTokenSession, DropboxAuth, DropboxSession, OAuth2Session};
pub use watch::DropboxWatch;

/// Long-poll wait requested from the server, in seconds (30 to 480)
pub const LONGPOLL_TIMEOUT_SECS: u64 = 30;

const CONTENT_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Base URLs of the three Dropbox API hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxEndpoints {
    pub api: String,
    pub content: String,
    pub notify: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            api: "https://api.dropboxapi.com".to_string(),
            content: "https://content.dropboxapi.com".to_string(),
            notify: "https://notify.dropboxapi.com".to_string(),
        }
    }
}

impl DropboxEndpoints {
    /// All three hosts on one base URL (mock servers)
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            api: base.clone(),
            content: base.clone(),
            notify: base,
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ListFolderResult {
    pub entries: Vec<Value>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LongpollResult {
    pub changes: bool,
    /// Seconds the client must wait before calling long-poll again
    #[serde(default)]
    pub backoff: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LatestCursor {
    cursor: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    name: AccountName,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

/// Converts a metadata entry into a change record
///
/// Entries tagged `deleted` are deletions; files and folders are additions.
pub fn change_record(entry: Value) -> Option<ChangeRecord> {
    let id = entry
        .get("path_display")
        .or_else(|| entry.get("path_lower"))
        .and_then(Value::as_str)?
        .to_string();
    let deleted = entry.get(".tag").and_then(Value::as_str) == Some("deleted");
    Some(ChangeRecord {
        id,
        deleted,
        payload: entry,
    })
}

/// Encodes a `Dropbox-API-Arg` header value
///
/// HTTP headers must be ASCII, so non-ASCII characters are escaped as
/// `\uXXXX` JSON sequences.
fn api_arg(value: &Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

// ============================================================================
// DropboxClient
// ============================================================================

/// Client for one access token
#[derive(Debug, Clone)]
pub struct DropboxClient {
    api: ApiClient,
    content: ApiClient,
    notify: ApiClient,
}

impl DropboxClient {
    pub fn new(access_token: impl Into<String>, endpoints: &DropboxEndpoints) -> Self {
        let token = access_token.into();
        Self {
            api: ApiClient::new(endpoints.api.as_str(), ApiAuth::Bearer(token.clone())),
            content: ApiClient::new(endpoints.content.as_str(), ApiAuth::Bearer(token)),
            // long-poll requests must not carry credentials
            notify: ApiClient::new(endpoints.notify.as_str(), ApiAuth::None),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http.clone());
        self.content = self.content.with_http_client(http.clone());
        self.notify = self.notify.with_http_client(http);
        self
    }

    /// Calls an RPC endpoint with a JSON body
    ///
    /// A 409 answer is an endpoint-specific error; its `error_summary` (e.g.
    /// `reset/..`, `path/not_found/..`) is returned as [`ApiError::Conflict`].
    async fn rpc<T: DeserializeOwned>(
        &self,
        client: &ApiClient,
        path: &str,
        body: &Value,
    ) -> Result<T, ApiError> {
        debug!(path, "Dropbox RPC");
        let response = client
            .execute_with_retry(|| client.request(Method::POST, path).json(body))
            .await?;
        parse_json(check_rpc_status(response).await?).await
    }

    pub async fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderResult, ApiError> {
        self.rpc(
            &self.api,
            "/2/files/list_folder/continue",
            &json!({ "cursor": cursor }),
        )
        .await
    }

    /// A cursor for the current state of `path`, without listing it
    pub async fn get_latest_cursor(&self, path: &str) -> Result<String, ApiError> {
        let latest: LatestCursor = self
            .rpc(
                &self.api,
                "/2/files/list_folder/get_latest_cursor",
                &json!({ "path": path, "recursive": true }),
            )
            .await?;
        Ok(latest.cursor)
    }

    /// Blocks until something changes under `cursor` or the timeout passes
    pub async fn longpoll(&self, cursor: &str) -> Result<LongpollResult, ApiError> {
        self.rpc(
            &self.notify,
            "/2/files/list_folder/longpoll",
            &json!({ "cursor": cursor, "timeout": LONGPOLL_TIMEOUT_SECS }),
        )
        .await
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let arg = api_arg(&json!({ "path": path }));
        let response = self
            .content
            .send(|| {
                self.content
                    .request(Method::POST, "/2/files/download")
                    .header(CONTENT_ARG_HEADER, arg.as_str())
            })
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Uploads `body` to `path`, overwriting, and returns the file metadata
    pub async fn upload(&self, path: &str, body: &[u8]) -> Result<Value, ApiError> {
        let arg = api_arg(&json!({ "path": path, "mode": "overwrite" }));
        let response = self
            .content
            .send(|| {
                self.content
                    .request(Method::POST, "/2/files/upload")
                    .header(CONTENT_ARG_HEADER, arg.as_str())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(body.to_vec())
            })
            .await?;
        info!(path, bytes = body.len(), "Uploaded file to Dropbox");
        parse_json(response).await
    }

    pub async fn current_account_name(&self) -> Result<String, ApiError> {
        let account: Account = self
            .rpc(&self.api, "/2/users/get_current_account", &Value::Null)
            .await?;
        Ok(account.name.display_name)
    }
}

async fn check_rpc_status(response: Response) -> Result<Response, ApiError> {
    if response.status() != StatusCode::CONFLICT {
        return check_status(response).await;
    }
    let body: Value = parse_json(response).await?;
    let summary = body
        .get("error_summary")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(ApiError::Conflict(summary.to_string()))
}

/// Returns true for the 409 error telling the client to restart from scratch
pub fn is_reset(error: &ApiError) -> bool {
    matches!(error, ApiError::Conflict(summary) if summary.starts_with("reset"))
}

// ============================================================================
// Input nodes
// ============================================================================

/// Downloads a file into `payload`
pub struct DropboxDownloadNode {
    session: Arc<dyn DropboxSession>,
    path: Option<String>,
}

impl DropboxDownloadNode {
    pub fn new(session: Arc<dyn DropboxSession>) -> Self {
        Self {
            session,
            path: None,
        }
    }

    /// File used when the message has no `filename`
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[async_trait]
impl InputNode for DropboxDownloadNode {
    fn kind(&self) -> &'static str {
        "dropbox in"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let path = msg
            .str_field("filename")
            .or(self.path.as_deref())
            .ok_or_else(|| NodeError::config("No filename specified"))?
            .to_string();
        let client = self.session.client().await?;

        ctx.status(NodeStatus::busy("downloading"));
        let (payload, encoding) = body_payload(client.download(&path).await?);

        let mut out = msg
            .with_extra("filename", path)
            .with_extra("encoding", encoding);
        out.payload = Value::String(payload);
        ctx.status(NodeStatus::clear());
        ctx.send(out);
        Ok(())
    }
}

/// Uploads `payload` to a file
pub struct DropboxUploadNode {
    session: Arc<dyn DropboxSession>,
    path: Option<String>,
}

impl DropboxUploadNode {
    pub fn new(session: Arc<dyn DropboxSession>) -> Self {
        Self {
            session,
            path: None,
        }
    }

    /// File used when the message has no `filename`
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[async_trait]
impl InputNode for DropboxUploadNode {
    fn kind(&self) -> &'static str {
        "dropbox out"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let path = msg
            .str_field("filename")
            .or(self.path.as_deref())
            .ok_or_else(|| NodeError::config("No filename specified"))?;
        let body = msg
            .payload_bytes()
            .ok_or_else(|| NodeError::config("No payload specified"))?;
        let client = self.session.client().await?;

        ctx.status(NodeStatus::busy("uploading"));
        client.upload(path, &body).await?;
        ctx.status(NodeStatus::clear());
        Ok(())
    }
}

// ============================================================================
// OAuth provider
// ============================================================================

/// Dropbox authorization for the admin routes
///
/// Requests offline access so a refresh token is issued.
pub struct DropboxProvider {
    endpoints: OAuthEndpoints,
    api: DropboxEndpoints,
}

impl DropboxProvider {
    pub fn new() -> Self {
        Self::with_urls(
            "https://www.dropbox.com/oauth2/authorize",
            "https://api.dropboxapi.com/oauth2/token",
            DropboxEndpoints::default(),
        )
    }

    pub fn with_urls(
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        api: DropboxEndpoints,
    ) -> Self {
        Self {
            endpoints: OAuthEndpoints::new(auth_url, token_url)
                .with_client_auth(ClientAuth::RequestBody)
                .with_param("token_access_type", "offline"),
            api,
        }
    }
}

impl Default for DropboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthProvider for DropboxProvider {
    fn name(&self) -> &str {
        "dropbox"
    }

    fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    async fn display_name(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<String, AuthError> {
        DropboxClient::new(access_token, &self.api)
            .with_http_client(http.clone())
            .current_account_name()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))
    }
}
