//! Error types for the hub connection.

use tokio_tungstenite::tungstenite;

/// A configuration snapshot that cannot be turned into a [`ConnectionConfig`].
///
/// [`ConnectionConfig`]: crate::types::ConnectionConfig
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors produced by sessions and the lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("connection to hub timed out")]
    ConnectTimeout,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session closed")]
    SessionClosed,

    #[error("outbound queue full, hub is not reading")]
    QueueFull,

    #[error("no active session")]
    NoActiveSession,

    #[error("publish timed out")]
    PublishTimeout,

    #[error("publish failed: {0}")]
    Publish(String),
}
