//! Session lifecycle manager for the hub's event stream.
//!
//! Opens an authenticated WebSocket session, subscribes to state changes,
//! republishes them on the host's pub/sub bus and relays service calls
//! back to the hub.

pub mod bus;
pub mod error;
pub mod manager;
pub(crate) mod pumps;
pub mod session;
pub mod translator;
pub mod types;

#[cfg(test)]
mod test_support;

pub use bus::{HealthReporter, PublishFuture, Publisher, publish_bounded};
pub use error::{BridgeError, ConfigError};
pub use manager::LifecycleManager;
pub use session::Session;
pub use translator::{EventTranslator, TopicHeaders, TopicMessage, TopicPayload};
pub use types::{BridgeEvent, ConfigAction, ConnectionConfig, HealthStatus, SessionState};
