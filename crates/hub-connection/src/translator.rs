//! Translates `state_changed` events into topic messages.

use serde::Serialize;
use serde_json::{Map, Value};

use hassbridge_protocol::StateChangedEvent;

/// Headers attached to both messages of a state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicHeaders {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

/// Payload of a topic message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TopicPayload {
    /// Bare state string.
    State(String),
    /// Attribute mapping of the entity.
    Attributes(Map<String, Value>),
}

/// One message handed to the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicMessage {
    pub topic: String,
    pub headers: TopicHeaders,
    pub payload: TopicPayload,
}

/// Maps entity events onto `<prefix>/<domain>/<object_id>/{state,attributes}`.
#[derive(Debug, Clone)]
pub struct EventTranslator {
    prefix: String,
}

impl EventTranslator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the state message followed by the attributes message.
    ///
    /// `last_updated` goes into both headers unchanged.
    pub fn translate(&self, event: &StateChangedEvent) -> (TopicMessage, TopicMessage) {
        let entity_path = event.entity_id.replace('.', "/");
        let headers = TopicHeaders {
            date: event.timestamp.clone(),
            timestamp: event.timestamp.clone(),
        };

        let state = TopicMessage {
            topic: self.topic(&entity_path, "state"),
            headers: headers.clone(),
            payload: TopicPayload::State(event.new_state.clone()),
        };
        let attributes = TopicMessage {
            topic: self.topic(&entity_path, "attributes"),
            headers,
            payload: TopicPayload::Attributes(event.attributes.clone()),
        };
        (state, attributes)
    }

    fn topic(&self, entity_path: &str, leaf: &str) -> String {
        [self.prefix.as_str(), entity_path, leaf].join("/")
    }
}
