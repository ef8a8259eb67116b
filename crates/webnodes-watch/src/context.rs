//! Channel-backed host context
//!
//! [`ChannelContext`] turns every host callback into a [`NodeEvent`] on an
//! unbounded mpsc channel. The runner binary drains the channel and prints
//! the events; tests use it to observe what a node did.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;
use webnodes_core::{
    ports::{NodeContext, NodeStatus},
    Message,
};

/// One host callback made by a node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum NodeEvent {
    Message {
        node: String,
        message: Message,
    },
    Status {
        node: String,
        status: NodeStatus,
    },
    Warn {
        node: String,
        text: String,
    },
    Error {
        node: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
    },
}

impl NodeEvent {
    /// The emitted message, for `Message` events
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            NodeEvent::Message { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            NodeEvent::Message { node, .. }
            | NodeEvent::Status { node, .. }
            | NodeEvent::Warn { node, .. }
            | NodeEvent::Error { node, .. } => node,
        }
    }
}

/// A [`NodeContext`] that forwards callbacks over a channel
#[derive(Debug, Clone)]
pub struct ChannelContext {
    node_id: String,
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl ChannelContext {
    pub fn new(node_id: impl Into<String>, tx: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self {
            node_id: node_id.into(),
            tx,
        }
    }

    /// Creates a context together with the receiving end of its channel
    pub fn channel(node_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(node_id, tx), rx)
    }

    fn forward(&self, event: NodeEvent) {
        if self.tx.send(event).is_err() {
            trace!(node = %self.node_id, "Event receiver dropped");
        }
    }
}

impl NodeContext for ChannelContext {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn send(&self, msg: Message) {
        self.forward(NodeEvent::Message {
            node: self.node_id.clone(),
            message: msg,
        });
    }

    fn status(&self, status: NodeStatus) {
        self.forward(NodeEvent::Status {
            node: self.node_id.clone(),
            status,
        });
    }

    fn warn(&self, text: &str) {
        self.forward(NodeEvent::Warn {
            node: self.node_id.clone(),
            text: text.to_string(),
        });
    }

    fn error(&self, text: &str, msg: Option<&Message>) {
        self.forward(NodeEvent::Error {
            node: self.node_id.clone(),
            text: text.to_string(),
            message: msg.cloned(),
        });
    }
}
