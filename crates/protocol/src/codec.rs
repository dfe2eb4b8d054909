//! Frame encoding and total decoding.

use serde_json::Value;

use crate::constants::{FrameType, STATE_CHANGED_EVENT};
use crate::messages::{EventPayload, HubError, OutboundCommand, Request, StateChangedEvent};

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Sent by the hub right after the upgrade.
    AuthRequired,
    /// The access token was accepted.
    AuthOk,
    /// The access token was rejected; the hub closes the socket next.
    AuthInvalid { message: String },
    /// Response to a request carrying `correlation_id`.
    EventResult {
        correlation_id: u64,
        success: bool,
        payload: Value,
        error: Option<HubError>,
    },
    /// A `state_changed` event pushed on the subscription.
    StateChanged {
        correlation_id: Option<u64>,
        event: StateChangedEvent,
    },
    /// Anything else, including malformed input.
    Unknown { correlation_id: Option<u64> },
}

impl InboundFrame {
    /// Correlation id carried by the frame, if any.
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            Self::EventResult { correlation_id, .. } => Some(*correlation_id),
            Self::StateChanged { correlation_id, .. } | Self::Unknown { correlation_id } => {
                *correlation_id
            }
            Self::AuthRequired | Self::AuthOk | Self::AuthInvalid { .. } => None,
        }
    }
}

/// Encodes the `auth` frame.
pub fn encode_auth(access_token: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Request::Auth { access_token })
}

/// Encodes the `subscribe_events` frame for `state_changed`.
pub fn encode_subscribe(id: u64) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Request::SubscribeEvents {
        id,
        event_type: STATE_CHANGED_EVENT,
    })
}

/// Encodes a `call_service` frame. Empty service data is left out.
pub fn encode_command(command: &OutboundCommand) -> Result<String, serde_json::Error> {
    let service_data = command.service_data.as_ref().filter(|d| !d.is_empty());
    serde_json::to_string(&Request::CallService {
        id: command.correlation_id,
        domain: &command.domain,
        service: &command.service,
        service_data,
    })
}

/// Decodes one inbound frame. Never fails.
pub fn decode(bytes: &[u8]) -> InboundFrame {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return InboundFrame::Unknown {
            correlation_id: None,
        };
    };

    let correlation_id = value.get("id").and_then(Value::as_u64);
    let frame_type = value
        .get("type")
        .cloned()
        .and_then(|t| serde_json::from_value::<FrameType>(t).ok())
        .unwrap_or(FrameType::Unknown);

    match frame_type {
        FrameType::AuthRequired => InboundFrame::AuthRequired,
        FrameType::AuthOk => InboundFrame::AuthOk,
        FrameType::AuthInvalid => InboundFrame::AuthInvalid {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        FrameType::Result => match correlation_id {
            Some(correlation_id) => InboundFrame::EventResult {
                correlation_id,
                success: value
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                payload: value.get("result").cloned().unwrap_or(Value::Null),
                error: value
                    .get("error")
                    .cloned()
                    .and_then(|e| serde_json::from_value(e).ok()),
            },
            None => InboundFrame::Unknown { correlation_id },
        },
        FrameType::Event => match value.get("event").and_then(decode_state_changed) {
            Some(event) => InboundFrame::StateChanged {
                correlation_id,
                event,
            },
            None => InboundFrame::Unknown { correlation_id },
        },
        _ => InboundFrame::Unknown { correlation_id },
    }
}

fn decode_state_changed(event: &Value) -> Option<StateChangedEvent> {
    let payload: EventPayload = serde_json::from_value(event.clone()).ok()?;
    if payload
        .event_type
        .as_deref()
        .is_some_and(|t| t != STATE_CHANGED_EVENT)
    {
        return None;
    }
    let new_state = payload.data.new_state?;
    Some(StateChangedEvent {
        entity_id: payload.data.entity_id,
        new_state: new_state.state,
        attributes: new_state.attributes,
        timestamp: new_state.last_updated,
    })
}
