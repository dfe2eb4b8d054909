//! Seams to the host's pub/sub bus and health channel.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::BridgeError;
use crate::translator::TopicMessage;
use crate::types::HealthStatus;

/// A boxed future returned by [`Publisher::publish`].
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + 'a>>;

/// Pub/sub bus that receives translated state changes.
///
/// Implementations report their own failures as [`BridgeError::Publish`].
/// The session bounds every call with [`publish_bounded`].
pub trait Publisher: Send + Sync + 'static {
    fn publish<'a>(&'a self, message: &'a TopicMessage) -> PublishFuture<'a>;
}

/// Health/status channel of the host.
pub trait HealthReporter: Send + Sync + 'static {
    fn set_status(&self, status: HealthStatus, detail: &str);
}

/// Publishes `message`, giving up after `wait`.
pub async fn publish_bounded(
    publisher: &dyn Publisher,
    message: &TopicMessage,
    wait: Duration,
) -> Result<(), BridgeError> {
    match tokio::time::timeout(wait, publisher.publish(message)).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::PublishTimeout),
    }
}
