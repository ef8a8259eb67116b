//! Credential kinds read from and written to the host's credential store

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Stored credentials for one node
///
/// Serialized with a `type` tag so the store can hold any kind under a
/// single id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Bearer tokens obtained through an OAuth2 authorization
    #[serde(rename = "oauth2")]
    OAuth2 {
        access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        /// Account name shown to the user after authorization
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// A single API key or token
    ApiKey { key: String },

    /// Username and password (HTTP basic auth)
    Basic { username: String, password: String },

    /// AWS access key pair for SigV4 signing
    AwsKeys {
        access_key_id: String,
        secret_access_key: String,
    },

    /// An authorization that has been started but not completed
    ///
    /// Credentials that were in use before the authorization started stay
    /// in `previous` until the callback replaces them.
    Pending {
        csrf_token: String,
        redirect_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<Box<Credentials>>,
    },
}

impl Credentials {
    /// Short kind name, used in logs and mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::OAuth2 { .. } => "oauth2",
            Credentials::ApiKey { .. } => "api_key",
            Credentials::Basic { .. } => "basic",
            Credentials::AwsKeys { .. } => "aws_keys",
            Credentials::Pending { .. } => "pending",
        }
    }

    /// Access token of completed OAuth2 credentials
    pub fn bearer_token(&self) -> Result<&str, DomainError> {
        match self {
            Credentials::OAuth2 { access_token, .. } => Ok(access_token),
            other => Err(DomainError::CredentialsMismatch {
                expected: "oauth2".to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    /// Key of API-key credentials
    pub fn api_key(&self) -> Result<&str, DomainError> {
        match self {
            Credentials::ApiKey { key } => Ok(key),
            other => Err(DomainError::CredentialsMismatch {
                expected: "api_key".to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    /// Returns true if the access token expires within `margin`
    ///
    /// Credentials without an expiry never report as expiring.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self {
            Credentials::OAuth2 {
                expires_at: Some(at),
                ..
            } => Utc::now() + margin >= *at,
            _ => false,
        }
    }

    /// Returns true once an authorization has completed
    pub fn is_complete(&self) -> bool {
        !matches!(self, Credentials::Pending { .. })
    }

    /// Credentials usable right now
    ///
    /// A pending entry resolves to the credentials it replaces, if any.
    pub fn current(&self) -> Option<&Credentials> {
        match self {
            Credentials::Pending { previous, .. } => previous.as_deref(),
            other => Some(other),
        }
    }
}
