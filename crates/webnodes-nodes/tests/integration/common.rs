//! Shared helpers for provider integration tests

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use webnodes_auth::MemoryCredentialStore;
use webnodes_core::{ports::CredentialStore, ChangeKind, Credentials, Message};
use webnodes_nodes::credentials::CredentialSource;
use webnodes_watch::NodeEvent;

/// A credential source over an in-memory store holding one entry
pub fn credentials(id: &str, credentials: Credentials) -> CredentialSource {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_entries([(
        id.to_string(),
        credentials,
    )]));
    CredentialSource::store(store, id)
}

pub fn api_key(key: &str) -> CredentialSource {
    credentials("key", Credentials::ApiKey { key: key.to_string() })
}

pub fn oauth(token: &str) -> CredentialSource {
    credentials(
        "oauth",
        Credentials::OAuth2 {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
            display_name: Some("Test User".to_string()),
        },
    )
}

/// Everything the node has reported so far
pub fn drain(rx: &mut UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Emitted messages only
pub fn messages(events: &[NodeEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(NodeEvent::as_message)
        .cloned()
        .collect()
}

/// `(kind, payload string)` of each emitted change message
pub fn changes(events: &[NodeEvent]) -> Vec<(ChangeKind, String)> {
    messages(events)
        .into_iter()
        .filter_map(|m| Some((m.event?, m.payload.as_str()?.to_string())))
        .collect()
}

/// Text of reported errors
pub fn errors(events: &[NodeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::Error { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Text of reported warnings
pub fn warnings(events: &[NodeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::Warn { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
