//! Host context port
//!
//! The automation host invokes nodes and receives their output through a
//! [`NodeContext`]. Emission is fire-and-forget: the host takes ownership of
//! every [`Message`] it is given.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Message, NodeError};

/// Status indicator colour shown by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Red,
    Green,
    Yellow,
    Blue,
    Grey,
}

/// Status indicator shape shown by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    Ring,
    Dot,
}

/// Node status reported to the host; an all-`None` status clears it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<StatusColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<StatusShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl NodeStatus {
    pub fn clear() -> Self {
        Self::default()
    }

    fn with(fill: StatusColor, shape: StatusShape, text: impl Into<String>) -> Self {
        Self {
            fill: Some(fill),
            shape: Some(shape),
            text: Some(text.into()),
        }
    }

    /// Waiting on a remote call
    pub fn busy(text: impl Into<String>) -> Self {
        Self::with(StatusColor::Blue, StatusShape::Dot, text)
    }

    /// Idle between polls
    pub fn ok(text: impl Into<String>) -> Self {
        Self::with(StatusColor::Green, StatusShape::Dot, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with(StatusColor::Red, StatusShape::Ring, text)
    }

    pub fn is_clear(&self) -> bool {
        self.fill.is_none() && self.shape.is_none() && self.text.is_none()
    }
}

/// Callbacks a node uses to talk back to its host
pub trait NodeContext: Send + Sync {
    /// Identifier of the node instance, used in logs
    fn node_id(&self) -> &str;

    /// Emits a message downstream
    fn send(&self, msg: Message);

    /// Updates the node's status indicator
    fn status(&self, status: NodeStatus);

    /// Reports a warning (configuration problems)
    fn warn(&self, text: &str);

    /// Reports an error, optionally against the message being handled
    fn error(&self, text: &str, msg: Option<&Message>);
}

/// A handler the host invokes with inbound messages
#[async_trait::async_trait]
pub trait InputNode: Send + Sync {
    /// Node type name (`s3 get`, `weather`, ...)
    fn kind(&self) -> &'static str;

    /// Handles one inbound message, sending zero or more messages via `ctx`
    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError>;
}

/// Surfaces a node failure through the channel its category calls for
///
/// Configuration errors go to the warning channel and leave the status
/// alone; everything else is reported as an error against the message and
/// flags the status.
pub fn report_failure(ctx: &dyn NodeContext, err: &NodeError, msg: Option<&Message>) {
    match err {
        NodeError::Config(text) => {
            debug!(node = ctx.node_id(), error = %text, "Configuration error");
            ctx.warn(text);
        }
        other => {
            warn!(
                node = ctx.node_id(),
                category = other.category(),
                error = %other,
                "Node invocation failed"
            );
            ctx.error(&other.to_string(), msg);
            ctx.status(NodeStatus::error(other.category()));
        }
    }
}

/// Runs one input handler, reporting a failure against the inbound message
pub async fn invoke(node: &dyn InputNode, msg: Message, ctx: &dyn NodeContext) {
    let inbound = msg.clone();
    if let Err(err) = node.on_input(msg, ctx).await {
        report_failure(ctx, &err, Some(&inbound));
    }
}
