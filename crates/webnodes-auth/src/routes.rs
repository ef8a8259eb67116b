//! Admin routes for interactive authorization
//!
//! For every registered provider `p`:
//!
//! - `GET /{p}-credentials/auth?id=..&callback=..` starts an authorization
//!   and redirects to the provider
//! - `GET /{p}-credentials/auth/callback?code=..&state=..` completes it
//!
//! Handling is independent of the HTTP transport so it can be tested without
//! a socket; [`AdminServer`](crate::AdminServer) adapts it to hyper.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};
use webnodes_core::Credentials;

use crate::{flow::AuthorizationFlow, AuthError};

const MISSING_PARAMETERS: &str = "ERROR: request does not contain the required parameters";

/// Response produced by an admin route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    pub status: u16,
    /// `Location` header for redirects
    pub location: Option<String>,
    pub body: String,
}

impl AdminResponse {
    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            location: None,
            body,
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            location: Some(location),
            body: String::new(),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::html(status, error_html(message))
    }

    pub fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Start(&'a str),
    Callback(&'a str),
}

fn parse_route(path: &str) -> Option<Route<'_>> {
    let (provider, tail) = path.strip_prefix('/')?.split_once("-credentials/")?;
    match tail {
        "auth" => Some(Route::Start(provider)),
        "auth/callback" => Some(Route::Callback(provider)),
        _ => None,
    }
}

/// Splits a request URI into its path and non-empty query parameters
fn parse_uri(uri: &str) -> Option<(String, HashMap<String, String>)> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let params = url
        .query_pairs()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    Some((url.path().to_string(), params))
}

/// Authorization flows keyed by provider name
#[derive(Default)]
pub struct AdminRoutes {
    flows: HashMap<String, Arc<AuthorizationFlow>>,
}

impl AdminRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts the routes of the flow's provider
    pub fn with_flow(mut self, flow: impl Into<Arc<AuthorizationFlow>>) -> Self {
        let flow = flow.into();
        self.flows.insert(flow.provider().name().to_string(), flow);
        self
    }

    /// Names of the mounted providers
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Handles one request
    pub async fn handle(&self, method: &str, uri: &str) -> AdminResponse {
        if method != "GET" {
            return AdminResponse::error(405, "Method not allowed");
        }
        let Some((path, params)) = parse_uri(uri) else {
            return AdminResponse::error(400, "Malformed request");
        };

        let route = parse_route(&path);
        let flow = match route {
            Some(Route::Start(name)) | Some(Route::Callback(name)) => self.flows.get(name),
            None => None,
        };
        let (Some(route), Some(flow)) = (route, flow) else {
            debug!(path = %path, "No admin route");
            return AdminResponse::error(404, "Not found");
        };

        match route {
            Route::Start(_) => self.start(flow, &params).await,
            Route::Callback(_) => self.callback(flow, &params).await,
        }
    }

    async fn start(
        &self,
        flow: &AuthorizationFlow,
        params: &HashMap<String, String>,
    ) -> AdminResponse {
        let (Some(id), Some(callback)) = (params.get("id"), params.get("callback")) else {
            return AdminResponse::error(400, MISSING_PARAMETERS);
        };

        match flow.start(id, callback).await {
            Ok(url) => AdminResponse::redirect(url),
            Err(e) => failure(flow, e),
        }
    }

    async fn callback(
        &self,
        flow: &AuthorizationFlow,
        params: &HashMap<String, String>,
    ) -> AdminResponse {
        if let Some(error) = params.get("error") {
            let description = params.get("error_description").unwrap_or(error);
            return failure(flow, AuthError::Denied(description.clone()));
        }
        let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
            return AdminResponse::error(400, MISSING_PARAMETERS);
        };

        match flow.complete(code, state).await {
            Ok(authorization) => {
                let account = match &authorization.credentials {
                    Credentials::OAuth2 {
                        display_name: Some(name),
                        ..
                    } => name.as_str(),
                    _ => "your account",
                };
                AdminResponse::html(200, success_html(flow.provider().name(), account))
            }
            Err(e) => failure(flow, e),
        }
    }
}

fn failure(flow: &AuthorizationFlow, error: AuthError) -> AdminResponse {
    warn!(provider = flow.provider().name(), error = %error, "Authorization failed");
    AdminResponse::error(error.status_code(), &error.to_string())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Returns the HTML for a successful authorization page
fn success_html(provider: &str, account: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>webnodes - Authorized</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authorized</h1>
    <p>Connected to {} as {}.</p>
    <p>You can close this window.</p>
</body>
</html>"#,
        escape_html(provider),
        escape_html(account)
    )
}

/// Returns the HTML for an authorization error page
fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>webnodes - Authorization Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authorization Error</h1>
    <p>{}</p>
</body>
</html>"#,
        escape_html(message)
    )
}
