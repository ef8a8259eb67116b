//! The message envelope exchanged with the host
//!
//! A [`Message`] is created fresh for every emission; ownership passes to the
//! host once it is sent. Inbound messages use the same shape, and handlers
//! read their override fields (`location`, `filename`, `bucket`, ...) from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::change::{ChangeEvent, ChangeKind};

/// Geographic context attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Location {
    /// A location from coordinates only
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            ..Self::default()
        }
    }

    /// Returns both coordinates when present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// The common envelope emitted downstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Primary result value
    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Raw upstream response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Change kind, set by watchers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<ChangeKind>,

    /// Display name of the changed item, set by watchers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Provider-specific fields (`filename`, `bucket`, `url`, `tags`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Creates a message carrying only a payload
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Builds the default watcher message for a change event
    ///
    /// `payload` is the item identifier, `file` the display name, `event`
    /// the change kind and `data` the item metadata.
    pub fn from_change(event: &ChangeEvent) -> Self {
        Self {
            payload: Value::String(event.item_id.clone()),
            file: Some(event.item_name.clone()),
            event: Some(event.kind),
            data: Some(event.payload.clone()),
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets a provider-specific field
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Reads a provider-specific string field, ignoring empty strings
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The payload as text, if it is a string
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }

    /// Payload bytes for upload-style handlers
    ///
    /// Strings are sent verbatim, `null` yields `None`, and any other JSON
    /// value is serialized.
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        match &self.payload {
            Value::Null => None,
            Value::String(s) => Some(s.clone().into_bytes()),
            other => Some(other.to_string().into_bytes()),
        }
    }
}
