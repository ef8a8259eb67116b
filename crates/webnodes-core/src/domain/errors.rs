//! Domain error types
//!
//! [`DomainError`] covers validation of domain values. [`NodeError`] is the
//! taxonomy every handler reports through, and decides how the failure is
//! surfaced to the host (warning, error against the message, or auth failure).

use thiserror::Error;

/// Errors that can occur when building domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Subscription identifiers must not be empty
    #[error("Invalid subscription id: {0}")]
    InvalidSubscriptionId(String),

    /// Cursors are opaque but must not be empty
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Stored credentials have the wrong kind for the node
    #[error("Credentials mismatch: expected {expected}, found {found}")]
    CredentialsMismatch { expected: String, found: String },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failure of a single node invocation or watcher cycle
///
/// Nothing here is fatal to the host process; every variant is scoped to the
/// node instance that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Missing credentials, bucket, filename, or similar configuration.
    /// Reported once through the warning channel; the message is dropped.
    #[error("{0}")]
    Config(String),

    /// Network or remote API failure. Reported as an error against the
    /// current message; watchers reschedule.
    #[error("{0}")]
    Transient(String),

    /// Invalid or rejected credentials, CSRF mismatch
    #[error("{0}")]
    Auth(String),

    /// Upstream response did not have the expected shape
    #[error("{0}")]
    Malformed(String),
}

impl NodeError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Shorthand for a malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Returns true if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short category name, used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transient(_) => "transient",
            Self::Auth(_) => "auth",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<DomainError> for NodeError {
    fn from(err: DomainError) -> Self {
        NodeError::Config(err.to_string())
    }
}
