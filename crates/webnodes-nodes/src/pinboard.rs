//! Pinboard bookmarks
//!
//! [`PinboardAddNode`] saves a bookmark through `v1/posts/add`. The API
//! token (`user:HEX`) is stored as an API key credential.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use webnodes_core::{
    ports::{InputNode, NodeContext, NodeStatus},
    Message, NodeError,
};

use crate::{
    client::{ApiAuth, ApiClient},
    credentials::CredentialSource,
    ApiError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.pinboard.in";

/// One bookmark to save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub url: String,
    pub description: String,
    pub tags: Option<String>,
    pub toread: Option<bool>,
}

impl Bookmark {
    /// Reads the bookmark from a message
    ///
    /// The URL comes from a string `payload` or `msg.url`; the description
    /// from `title` or `description`. `tags` may be a string or an array.
    pub fn from_message(msg: &Message) -> Result<Self, NodeError> {
        let url = msg
            .payload_str()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| msg.str_field("url"))
            .ok_or_else(|| NodeError::config("No url specified"))?;
        let description = msg
            .title
            .as_deref()
            .or(msg.description.as_deref())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| NodeError::config("No title specified"))?;
        let tags = match msg.extra.get("tags") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            }
            _ => None,
        };

        Ok(Self {
            url: url.trim().to_string(),
            description: description.to_string(),
            tags,
            toread: msg.extra.get("toread").and_then(Value::as_bool),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    result_code: String,
}

// ============================================================================
// PinboardClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct PinboardClient {
    api: ApiClient,
}

impl PinboardClient {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, auth_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(
                base_url,
                ApiAuth::QueryParam {
                    name: "auth_token",
                    value: auth_token.into(),
                },
            ),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http);
        self
    }

    pub async fn add(&self, bookmark: &Bookmark) -> Result<(), ApiError> {
        let mut query = vec![
            ("url", bookmark.url.as_str()),
            ("description", bookmark.description.as_str()),
            ("format", "json"),
        ];
        if let Some(tags) = bookmark.tags.as_deref() {
            query.push(("tags", tags));
        }
        if let Some(toread) = bookmark.toread {
            query.push(("toread", if toread { "yes" } else { "no" }));
        }

        let response: AddResponse = self.api.get_json("/v1/posts/add", &query).await?;
        if response.result_code != "done" {
            return Err(ApiError::Upstream(response.result_code));
        }
        debug!(url = %bookmark.url, "Bookmark saved");
        Ok(())
    }
}

// ============================================================================
// PinboardAddNode
// ============================================================================

/// Saves each inbound message as a bookmark; emits nothing
pub struct PinboardAddNode {
    credentials: CredentialSource,
    base_url: String,
    http: reqwest::Client,
}

impl PinboardAddNode {
    pub fn new(credentials: CredentialSource) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl InputNode for PinboardAddNode {
    fn kind(&self) -> &'static str {
        "pinboard out"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let bookmark = Bookmark::from_message(&msg)?;
        let token = self.credentials.api_key().await?;
        let client = PinboardClient::with_base_url(self.base_url.as_str(), token)
            .with_http_client(self.http.clone());

        ctx.status(NodeStatus::busy("saving"));
        client.add(&bookmark).await?;
        ctx.status(NodeStatus::clear());
        info!(node = ctx.node_id(), url = %bookmark.url, "Saved bookmark");
        Ok(())
    }
}
