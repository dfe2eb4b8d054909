//! Lifecycle manager owning the single current session.
//!
//! Every reconfiguration closes the current session before opening its
//! replacement, so at most one session is ever outside `Closed`. The
//! current-session slot sits behind one async mutex; reconfiguration,
//! command relay and shutdown all go through it and are therefore
//! serialised against each other.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::bus::{HealthReporter, Publisher};
use crate::error::BridgeError;
use crate::session::{Session, SessionContext};
use crate::translator::EventTranslator;
use crate::types::{BridgeEvent, ConfigAction, ConnectionConfig, HealthStatus, SessionState};

const EVENTS_CAPACITY: usize = 256;

/// Owner of the current [`Session`].
pub struct LifecycleManager {
    defaults: Map<String, Value>,
    current: Mutex<Option<Session>>,
    publisher: Arc<dyn Publisher>,
    health: Arc<dyn HealthReporter>,
    events_tx: mpsc::Sender<BridgeEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<BridgeEvent>>>,
}

impl LifecycleManager {
    /// Creates a manager with no session.
    ///
    /// `defaults` fill in any key a later configuration leaves out.
    pub fn new(
        defaults: Map<String, Value>,
        publisher: Arc<dyn Publisher>,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENTS_CAPACITY);
        Self {
            defaults,
            current: Mutex::new(None),
            publisher,
            health,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the lifecycle event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<BridgeEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Entry point for the configuration collaborator.
    pub async fn configure(
        &self,
        action: ConfigAction,
        contents: &Map<String, Value>,
    ) -> Result<(), BridgeError> {
        info!(?action, "configuration received");
        self.reconfigure(contents).await
    }

    /// Replaces the current session with one built from `contents`.
    ///
    /// The old session is fully closed first. If `contents` is invalid the
    /// manager is left without a session until a valid configuration
    /// arrives.
    pub async fn reconfigure(&self, contents: &Map<String, Value>) -> Result<(), BridgeError> {
        let mut current = self.current.lock().await;

        if let Some(old) = current.take() {
            debug!(session = %old.id(), "closing previous session");
            old.close().await;
        }

        let config = match ConnectionConfig::from_contents(&self.defaults, contents) {
            Ok(config) => config,
            Err(e) => {
                error!("rejecting configuration: {e}");
                self.health
                    .set_status(HealthStatus::Bad, &format!("invalid configuration: {e}"));
                return Err(e.into());
            }
        };

        self.health
            .set_status(HealthStatus::Starting, "Starting web socket");
        let ctx = SessionContext {
            translator: EventTranslator::new(config.topic.clone()),
            publisher: self.publisher.clone(),
            health: self.health.clone(),
            events_tx: self.events_tx.clone(),
        };

        match Session::open(config, ctx).await {
            Ok(session) => {
                info!(session = %session.id(), "session opened");
                // The read task may already have reported the session dead.
                session.report_if_open(
                    self.health.as_ref(),
                    HealthStatus::Good,
                    "Successfully started web socket",
                );
                *current = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!("failed to open session: {e}");
                self.health
                    .set_status(HealthStatus::Bad, &format!("failed to start web socket: {e}"));
                Err(e)
            }
        }
    }

    /// Sends `domain.service` on the current session.
    ///
    /// Returns the correlation id the command went out with.
    pub async fn relay_command(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Map<String, Value>>,
    ) -> Result<u64, BridgeError> {
        let current = self.current.lock().await;
        let session = current.as_ref().ok_or(BridgeError::NoActiveSession)?;
        session.call_service(domain, service, service_data).await
    }

    /// Inbound service-call entry point.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Map<String, Value>>,
    ) -> Result<(), BridgeError> {
        info!(domain, service, "received service call");
        let id = self.relay_command(domain, service, service_data).await?;
        debug!(id, "service call relayed");
        Ok(())
    }

    /// Closes the current session. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(session) => {
                info!(session = %session.id(), "shutting down");
                session.close().await;
            }
            None => debug!("shutdown with no session"),
        }
    }

    /// State of the current session, if there is one.
    pub async fn current_state(&self) -> Option<SessionState> {
        self.current.lock().await.as_ref().map(Session::state)
    }

    /// Configuration of the current session, if there is one.
    pub async fn current_config(&self) -> Option<ConnectionConfig> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|s| s.config().clone())
    }
}
