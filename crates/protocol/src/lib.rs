//! Wire codec for the Home Assistant WebSocket API.
//!
//! Encodes the outbound `auth`, `subscribe_events` and `call_service`
//! frames and decodes inbound text frames into [`InboundFrame`]. Decoding
//! never fails: anything the bridge does not understand becomes
//! [`InboundFrame::Unknown`].

pub mod codec;
pub mod constants;
pub mod messages;

// Re-export primary types for convenience.
pub use codec::{InboundFrame, decode, encode_auth, encode_command, encode_subscribe};
pub use constants::FrameType;
pub use messages::{OutboundCommand, StateChangedEvent};
