use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default port of the Home Assistant HTTP/WebSocket API.
pub const HUB_PORT: u16 = 8123;

/// Path of the WebSocket API endpoint.
pub const WS_API_PATH: &str = "/api/websocket";

/// Correlation id of the `subscribe_events` request sent after `auth_ok`.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// First correlation id available to commands. Id 1 belongs to the
/// subscription, so event frames echo it for the life of the session.
pub const FIRST_COMMAND_ID: u64 = 2;

/// Event type the bridge subscribes to.
pub const STATE_CHANGED_EVENT: &str = "state_changed";

/// Topic prefix used when the configuration does not name one.
pub const DEFAULT_TOPIC: &str = "datalogger/homeassistant";

/// Maximum inbound message size in bytes (16 MB).
///
/// Large installations send sizeable attribute maps (media players,
/// calendars), so this sits well above the typical frame.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Time allowed for the TCP + WebSocket upgrade to complete.
pub const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a closing session waits for its close frame to be flushed.
pub const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded wait for one publish call on the pub/sub bus.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the per-session outbound frame queue.
pub const WS_SEND_BUFFER: usize = 256;

/// Frame type identifier carried in the `type` field of every frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    // Handshake
    AuthRequired,
    Auth,
    AuthOk,
    AuthInvalid,

    // Requests from the bridge
    SubscribeEvents,
    CallService,

    // Hub responses and pushes
    Result,
    Event,

    /// Forward compatibility: unknown frame types deserialize here.
    #[serde(other)]
    Unknown,
}
