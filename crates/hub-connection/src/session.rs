//! One authenticated, subscribed WebSocket session with the hub.
//!
//! A [`Session`] owns its socket through two tasks: the write pump, which
//! serialises every outbound frame, and the read pump, which feeds decoded
//! frames to a [`SessionDriver`]. The driver runs the
//! `auth -> subscribe -> events` handshake, keeps the correlation counter
//! ahead of every id the hub echoes, and forwards state changes to the bus.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hassbridge_protocol::codec::{self, InboundFrame};
use hassbridge_protocol::constants::{
    FIRST_COMMAND_ID, PUBLISH_TIMEOUT, SUBSCRIBE_REQUEST_ID, WS_CLOSE_TIMEOUT, WS_CONNECT_TIMEOUT,
    WS_MAX_MESSAGE_SIZE, WS_SEND_BUFFER,
};
use hassbridge_protocol::{OutboundCommand, StateChangedEvent};

use crate::bus::{HealthReporter, Publisher, publish_bounded};
use crate::error::BridgeError;
use crate::translator::EventTranslator;
use crate::types::{BridgeEvent, ConnectionConfig, HealthStatus, SessionState};

/// Collaborators handed to each new session by the manager.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) translator: EventTranslator,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) health: Arc<dyn HealthReporter>,
    pub(crate) events_tx: mpsc::Sender<BridgeEvent>,
}

/// Holds a session's lifecycle state and reports each change once.
///
/// `Closed` is terminal and `Closing` only leads to `Closed`; other
/// transitions out of them are ignored.
#[derive(Clone)]
pub(crate) struct StateReporter {
    session_id: Arc<str>,
    state: Arc<watch::Sender<SessionState>>,
    events_tx: mpsc::Sender<BridgeEvent>,
}

impl StateReporter {
    pub(crate) fn new(session_id: &str, events_tx: mpsc::Sender<BridgeEvent>) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        let reporter = Self {
            session_id: session_id.into(),
            state: Arc::new(state),
            events_tx,
        };
        reporter.emit(SessionState::Connecting);
        reporter
    }

    pub(crate) fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Moves to `next`. Returns `false` if nothing changed.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        // Emitting under the watch lock keeps the event order identical
        // to the order of the transitions themselves.
        self.state.send_if_modified(|current| {
            let refused = match *current {
                SessionState::Closed => true,
                SessionState::Closing => next != SessionState::Closed,
                state => state == next,
            };
            if refused {
                return false;
            }
            trace!(session = %self.session_id, from = ?*current, to = ?next, "session state");
            *current = next;
            self.emit(next);
            true
        })
    }

    /// Runs `f` under the state lock if the state is not `Closed`.
    pub(crate) fn while_open(&self, f: impl FnOnce()) -> bool {
        let mut ran = false;
        self.state.send_if_modified(|current| {
            if *current != SessionState::Closed {
                f();
                ran = true;
            }
            false
        });
        ran
    }

    fn emit(&self, state: SessionState) {
        let event = BridgeEvent::StateChanged {
            session_id: self.session_id.to_string(),
            state,
        };
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("dropping lifecycle event: {e}");
        }
    }
}

/// Handles every inbound frame of one session, in arrival order.
pub(crate) struct SessionDriver {
    session_id: String,
    reporter: StateReporter,
    counter: Arc<AtomicU64>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    translator: EventTranslator,
    publisher: Arc<dyn Publisher>,
    health: Arc<dyn HealthReporter>,
}

impl SessionDriver {
    pub(crate) fn new(
        session_id: &str,
        reporter: StateReporter,
        counter: Arc<AtomicU64>,
        write_tx: mpsc::Sender<tungstenite::Message>,
        cancel: CancellationToken,
        ctx: SessionContext,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            reporter,
            counter,
            write_tx,
            cancel,
            translator: ctx.translator,
            publisher: ctx.publisher,
            health: ctx.health,
        }
    }

    /// Entry point for each decoded frame.
    pub(crate) async fn on_inbound(&self, frame: InboundFrame) {
        if let Some(id) = frame.correlation_id() {
            self.observe_id(id);
        }

        match frame {
            InboundFrame::AuthRequired => trace!(session = %self.session_id, "hub requested auth"),
            InboundFrame::AuthOk => self.on_auth_ok().await,
            InboundFrame::AuthInvalid { message } => {
                warn!(session = %self.session_id, "hub rejected the access token: {message}");
                self.health
                    .set_status(HealthStatus::Bad, &format!("authentication failed: {message}"));
            }
            InboundFrame::EventResult {
                correlation_id,
                success,
                error,
                ..
            } => {
                if success {
                    trace!(session = %self.session_id, id = correlation_id, "request succeeded");
                } else {
                    let detail = error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_default();
                    warn!(session = %self.session_id, id = correlation_id, "hub rejected request {detail}");
                }
            }
            InboundFrame::StateChanged { event, .. } => self.on_state_changed(event).await,
            InboundFrame::Unknown { correlation_id } => {
                trace!(session = %self.session_id, id = ?correlation_id, "ignoring frame");
            }
        }
    }

    /// Reports a dead connection. The session is not reconnected; a new
    /// one only comes from the next reconfiguration.
    pub(crate) fn on_error(&self, detail: &str) {
        warn!(session = %self.session_id, "{detail}");
        // Closed first, so no later "open" report can land after this one.
        self.reporter.transition(SessionState::Closed);
        self.health.set_status(HealthStatus::Bad, detail);
        self.cancel.cancel();
    }

    fn observe_id(&self, id: u64) {
        self.counter
            .fetch_max(id.saturating_add(1), Ordering::AcqRel);
    }

    async fn on_auth_ok(&self) {
        if self.reporter.current() != SessionState::Authenticating {
            debug!(session = %self.session_id, "ignoring duplicate auth_ok");
            return;
        }
        info!(session = %self.session_id, "authenticated with hub");
        self.reporter.transition(SessionState::Subscribing);

        let frame = match codec::encode_subscribe(SUBSCRIBE_REQUEST_ID) {
            Ok(f) => f,
            Err(e) => {
                self.on_error(&format!("failed to encode subscribe frame: {e}"));
                return;
            }
        };
        if self
            .write_tx
            .send(tungstenite::Message::Text(frame.into()))
            .await
            .is_err()
        {
            self.on_error("write queue closed before subscribing");
            return;
        }

        // Events may precede the subscribe ack.
        self.reporter.transition(SessionState::Active);
        self.health
            .set_status(HealthStatus::Good, "subscribed to state changes");
    }

    async fn on_state_changed(&self, event: StateChangedEvent) {
        debug!(session = %self.session_id, "{} --> {}", event.entity_id, event.new_state);

        let (state, attributes) = self.translator.translate(&event);
        for message in [state, attributes] {
            if let Err(e) =
                publish_bounded(self.publisher.as_ref(), &message, PUBLISH_TIMEOUT).await
            {
                warn!(
                    session = %self.session_id,
                    topic = %message.topic,
                    error = %e,
                    "dropping topic message"
                );
                self.health.set_status(
                    HealthStatus::Bad,
                    &format!("publish to {} failed: {e}", message.topic),
                );
            }
        }
    }
}

struct SessionTasks {
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

/// A live connection to the hub.
///
/// Created by [`LifecycleManager`](crate::LifecycleManager) only; the
/// manager owns the single current session.
pub struct Session {
    id: String,
    config: ConnectionConfig,
    write_tx: mpsc::Sender<tungstenite::Message>,
    counter: Arc<AtomicU64>,
    reporter: StateReporter,
    closed: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Option<SessionTasks>>,
}

impl Session {
    /// Connects to the hub and queues the auth frame.
    ///
    /// Returns once the socket is up; the rest of the handshake runs on
    /// the read task.
    pub(crate) async fn open(
        config: ConnectionConfig,
        ctx: SessionContext,
    ) -> Result<Self, BridgeError> {
        let id = uuid::Uuid::new_v4().to_string();
        let reporter = StateReporter::new(&id, ctx.events_tx.clone());
        let url = config.websocket_url();
        info!(session = %id, url = %url, "connecting to hub");

        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let connect =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false);
        let ws_stream = match tokio::time::timeout(WS_CONNECT_TIMEOUT, connect).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                reporter.transition(SessionState::Closed);
                return Err(e.into());
            }
            Err(_) => {
                reporter.transition(SessionState::Closed);
                return Err(BridgeError::ConnectTimeout);
            }
        };
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WS_SEND_BUFFER);
        let counter = Arc::new(AtomicU64::new(FIRST_COMMAND_ID));
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        // Set before the auth frame leaves so `auth_ok` always finds it.
        reporter.transition(SessionState::Authenticating);

        let read_handle = {
            let driver = SessionDriver::new(
                &id,
                reporter.clone(),
                counter.clone(),
                write_tx.clone(),
                cancel.clone(),
                ctx,
            );
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(read, driver, cancel))
        };

        let session = Self {
            id,
            config,
            write_tx,
            counter,
            reporter,
            closed: AtomicBool::new(false),
            cancel,
            tasks: Mutex::new(Some(SessionTasks {
                read: read_handle,
                write: write_handle,
            })),
        };

        session
            .queue(codec::encode_auth(&session.config.access_token)?)
            .await?;
        debug!(session = %session.id, "auth frame queued");
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.reporter.current()
    }

    /// Watches lifecycle transitions of this session.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.reporter.subscribe()
    }

    /// Next id the session will hand out.
    pub fn correlation_counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Reserves a correlation id for a new command.
    pub fn next_correlation_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Sends a `call_service` command with a freshly reserved id.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Map<String, Value>>,
    ) -> Result<u64, BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SessionClosed);
        }
        let command =
            OutboundCommand::new(self.next_correlation_id(), domain, service, service_data);
        self.send(&command).await?;
        Ok(command.correlation_id)
    }

    /// Writes a command to the hub.
    pub async fn send(&self, command: &OutboundCommand) -> Result<(), BridgeError> {
        let text = codec::encode_command(command)?;
        self.queue(text).await?;
        debug!(
            session = %self.id,
            id = command.correlation_id,
            domain = %command.domain,
            service = %command.service,
            "command sent"
        );
        Ok(())
    }

    /// Closes the connection and waits for both pumps to stop.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reporter.transition(SessionState::Closing);
        debug!(session = %self.id, "closing session");
        self.cancel.cancel();

        let tasks = self.tasks.lock().ok().and_then(|mut guard| guard.take());
        if let Some(SessionTasks { read, mut write }) = tasks {
            // The write pump sends the close frame on its way out.
            if tokio::time::timeout(WS_CLOSE_TIMEOUT, &mut write)
                .await
                .is_err()
            {
                warn!(session = %self.id, "write pump did not stop in time");
                write.abort();
            }
            read.abort();
            let _ = read.await;
        }

        self.reporter.transition(SessionState::Closed);
        info!(session = %self.id, "session closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
            || matches!(
                self.reporter.current(),
                SessionState::Closing | SessionState::Closed
            )
    }

    async fn queue(&self, text: String) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SessionClosed);
        }
        // Never waits; callers may hold the manager's lock.
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BridgeError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => BridgeError::SessionClosed,
            })
    }

    /// Reports `status` unless the session has already closed.
    ///
    /// Runs under the state lock, so a concurrent close either happens
    /// before and suppresses the report, or after and reports over it.
    pub(crate) fn report_if_open(
        &self,
        health: &dyn HealthReporter,
        status: HealthStatus,
        detail: &str,
    ) -> bool {
        self.reporter.while_open(|| health.set_status(status, detail))
    }

    /// A session with no socket whose write queue is never drained.
    #[cfg(test)]
    pub(crate) fn detached(
        config: ConnectionConfig,
        ctx: SessionContext,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<tungstenite::Message>) {
        let id = uuid::Uuid::new_v4().to_string();
        let reporter = StateReporter::new(&id, ctx.events_tx);
        let (write_tx, write_rx) = mpsc::channel(capacity);
        let session = Self {
            id,
            config,
            write_tx,
            counter: Arc::new(AtomicU64::new(FIRST_COMMAND_ID)),
            reporter,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(None),
        };
        (session, write_rx)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Ok(tasks) = self.tasks.get_mut()
            && let Some(tasks) = tasks.take()
        {
            tasks.read.abort();
            tasks.write.abort();
        }
        self.reporter.transition(SessionState::Closed);
    }
}
