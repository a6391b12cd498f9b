//! Event - the orchestrator feed record
//!
//! Field names follow the Nomad event stream wire format (PascalCase).

use serde::{Deserialize, Serialize};

/// A single event emitted by the Nomad event stream
///
/// Immutable once produced. `payload` is kept opaque; the core never
/// inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Event topic (e.g. "Deployment", "Node")
    pub topic: String,

    /// Event subtype (e.g. "DeploymentStatusUpdate")
    #[serde(rename = "Type")]
    pub event_type: String,

    /// Object key the event refers to (job id, node id, ...)
    #[serde(default)]
    pub key: String,

    /// Namespace of the object (empty for cluster-scoped topics)
    #[serde(default)]
    pub namespace: String,

    /// Additional keys the event can be filtered on
    #[serde(default)]
    pub filter_keys: Option<Vec<String>>,

    /// Feed position, non-decreasing across the stream
    pub index: u64,

    /// Opaque payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event with an empty payload
    pub fn new(index: u64, topic: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event_type: event_type.into(),
            key: String::new(),
            namespace: String::new(),
            filter_keys: None,
            index,
            payload: serde_json::Value::Null,
        }
    }

    /// Set the object key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Delivery metadata attached by the consumer to every event
///
/// Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Meta {
    /// Feed position of the event
    pub index: u64,

    /// Connection generation (incremented on every successful connect)
    pub generation: u64,
}

/// One NDJSON frame of the event stream
///
/// `{}` on the wire is a heartbeat; a frame carrying `Err` reports a
/// server-side stream failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedFrame {
    /// Raft index shared by all events of the frame
    #[serde(default)]
    pub index: u64,

    /// Events carried by the frame
    #[serde(default)]
    pub events: Vec<Event>,

    /// Server-side error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl FeedFrame {
    /// Build a data frame
    pub fn new(index: u64, events: Vec<Event>) -> Self {
        Self {
            index,
            events,
            err: None,
        }
    }

    /// Heartbeat frames carry neither events nor an error
    pub fn is_heartbeat(&self) -> bool {
        self.index == 0 && self.events.is_empty() && self.err.is_none()
    }
}
