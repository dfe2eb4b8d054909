use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// Frames sent by the bridge. The `type` tag is written first.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Request<'a> {
    Auth {
        access_token: &'a str,
    },
    SubscribeEvents {
        id: u64,
        event_type: &'a str,
    },
    CallService {
        id: u64,
        domain: &'a str,
        service: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<&'a Map<String, Value>>,
    },
}

/// A `call_service` command relayed to the hub.
///
/// Built per call and dropped once written; nothing tracks delivery
/// beyond the correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    pub correlation_id: u64,
    pub domain: String,
    pub service: String,
    pub service_data: Option<Map<String, Value>>,
}

impl OutboundCommand {
    pub fn new(
        correlation_id: u64,
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            correlation_id,
            domain: domain.into(),
            service: service.into(),
            service_data,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// A decoded `state_changed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    /// Dotted entity id, e.g. `sensor.kitchen_temperature`.
    pub entity_id: String,
    /// Bare state string of the new state.
    pub new_state: String,
    pub attributes: Map<String, Value>,
    /// `new_state.last_updated`, exactly as the hub sent it.
    pub timestamp: String,
}

/// The `event` object of an `event` frame.
#[derive(Debug, Deserialize)]
pub(crate) struct EventPayload {
    #[serde(default)]
    pub event_type: Option<String>,
    pub data: StateChangedData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StateChangedData {
    pub entity_id: String,
    /// `null` when the entity was removed.
    pub new_state: Option<EntityState>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntityState {
    pub state: String,
    pub attributes: Map<String, Value>,
    pub last_updated: String,
}

/// Error details of a failed `result` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubError {
    pub code: String,
    pub message: String,
}
