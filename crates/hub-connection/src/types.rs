//! Public types for the hub connection.

use std::fmt;
use std::net::Ipv6Addr;

use serde_json::{Map, Value};

use hassbridge_protocol::constants::{DEFAULT_TOPIC, HUB_PORT, WS_API_PATH};

use crate::error::ConfigError;

/// Connection parameters for one session.
///
/// Immutable snapshot; a reconfiguration replaces it wholesale.
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Hub address. A bare host gets the default API port.
    pub ip_address: String,
    /// Long-lived access token used for the bearer handshake.
    pub access_token: String,
    /// Prefix of every published topic.
    pub topic: String,
}

impl ConnectionConfig {
    /// Builds a snapshot from configuration contents merged over `defaults`.
    ///
    /// Keys present in `contents` win. `ip_address` and `access_token` are
    /// required; `topic` falls back to [`DEFAULT_TOPIC`].
    pub fn from_contents(
        defaults: &Map<String, Value>,
        contents: &Map<String, Value>,
    ) -> Result<Self, ConfigError> {
        let mut merged = defaults.clone();
        merged.extend(contents.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            ip_address: required_str(&merged, "ip_address")?,
            access_token: required_str(&merged, "access_token")?,
            topic: optional_str(&merged, "topic")?.unwrap_or_else(|| DEFAULT_TOPIC.into()),
        })
    }

    /// WebSocket API URL of the hub.
    pub fn websocket_url(&self) -> String {
        let host = self.ip_address.trim();
        let authority = if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]:{HUB_PORT}")
        } else if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{HUB_PORT}")
        };
        format!("ws://{authority}{WS_API_PATH}")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("ip_address", &self.ip_address)
            .field("access_token", &"<redacted>")
            .field("topic", &self.topic)
            .finish()
    }
}

fn required_str(map: &Map<String, Value>, field: &'static str) -> Result<String, ConfigError> {
    optional_str(map, field)?.ok_or(ConfigError::MissingField(field))
}

fn optional_str(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ConfigError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ConfigError::InvalidField {
            field,
            reason: "must not be empty".into(),
        }),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::InvalidField {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connect and WebSocket upgrade in progress.
    Connecting,
    /// Auth frame sent, waiting for `auth_ok`.
    Authenticating,
    /// `auth_ok` received, subscribe frame being sent.
    Subscribing,
    /// Subscribed; events flow and commands may be sent.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

/// Health levels reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Good,
    Bad,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "STARTING",
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Why the configuration collaborator is calling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Initial configuration.
    New,
    /// The stored configuration changed.
    Update,
}

/// Events emitted by the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A session moved to a new lifecycle state.
    StateChanged {
        session_id: String,
        state: SessionState,
    },
}
