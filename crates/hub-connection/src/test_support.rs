//! Test doubles shared by the unit tests of this crate.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use hassbridge_protocol::constants::FIRST_COMMAND_ID;

use crate::bus::{HealthReporter, PublishFuture, Publisher};
use crate::session::{SessionContext, SessionDriver, StateReporter};
use crate::translator::{EventTranslator, TopicHeaders, TopicMessage, TopicPayload};
use crate::types::{BridgeEvent, HealthStatus};

/// Token the mock hub rejects.
pub(crate) const BAD_TOKEN: &str = "bad-token";

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    messages: Mutex<Vec<TopicMessage>>,
}

impl RecordingPublisher {
    pub(crate) fn messages(&self) -> Vec<TopicMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish<'a>(&'a self, message: &'a TopicMessage) -> PublishFuture<'a> {
        Box::pin(async move {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        })
    }
}

/// Never completes a publish.
pub(crate) struct StalledPublisher;

impl Publisher for StalledPublisher {
    fn publish<'a>(&'a self, _message: &'a TopicMessage) -> PublishFuture<'a> {
        Box::pin(std::future::pending())
    }
}

#[derive(Default)]
pub(crate) struct RecordingHealth {
    statuses: Mutex<Vec<(HealthStatus, String)>>,
}

impl RecordingHealth {
    pub(crate) fn statuses(&self) -> Vec<(HealthStatus, String)> {
        self.statuses.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<(HealthStatus, String)> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

impl HealthReporter for RecordingHealth {
    fn set_status(&self, status: HealthStatus, detail: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((status, detail.to_string()));
    }
}

pub(crate) fn state_message() -> TopicMessage {
    TopicMessage {
        topic: "ha/sensor/temp/state".into(),
        headers: TopicHeaders {
            date: "2024-01-01T00:00:00+00:00".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
        },
        payload: TopicPayload::State("72".into()),
    }
}

/// Handles kept by a test next to the context it handed to a session.
pub(crate) struct ContextParts {
    pub(crate) health: Arc<RecordingHealth>,
    pub(crate) publisher: Arc<RecordingPublisher>,
    pub(crate) events_rx: mpsc::Receiver<BridgeEvent>,
}

pub(crate) fn test_context() -> (SessionContext, ContextParts) {
    let health = Arc::new(RecordingHealth::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let (events_tx, events_rx) = mpsc::channel(64);
    let ctx = SessionContext {
        translator: EventTranslator::new("ha"),
        publisher: publisher.clone(),
        health: health.clone(),
        events_tx,
    };
    (
        ctx,
        ContextParts {
            health,
            publisher,
            events_rx,
        },
    )
}

/// Everything a driver under test writes to.
pub(crate) struct DriverParts {
    pub(crate) reporter: StateReporter,
    pub(crate) health: Arc<RecordingHealth>,
    pub(crate) publisher: Arc<RecordingPublisher>,
    pub(crate) cancel: CancellationToken,
    pub(crate) write_rx: mpsc::Receiver<Message>,
    #[allow(dead_code)]
    pub(crate) events_rx: mpsc::Receiver<BridgeEvent>,
    counter: Arc<AtomicU64>,
}

impl DriverParts {
    pub(crate) fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// A driver without a socket, publishing to a recorder.
pub(crate) fn driver_for_test() -> (SessionDriver, DriverParts) {
    let publisher = Arc::new(RecordingPublisher::default());
    let (driver, mut parts) = driver_with(publisher.clone());
    parts.publisher = publisher;
    (driver, parts)
}

pub(crate) fn driver_with(publisher: Arc<dyn Publisher>) -> (SessionDriver, DriverParts) {
    let (mut ctx, parts) = test_context();
    ctx.publisher = publisher;
    let (events_tx, events_rx) = mpsc::channel(64);
    let reporter = StateReporter::new("test-session", events_tx);
    let counter = Arc::new(AtomicU64::new(FIRST_COMMAND_ID));
    let (write_tx, write_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let driver = SessionDriver::new(
        "test-session",
        reporter.clone(),
        counter.clone(),
        write_tx,
        cancel.clone(),
        ctx,
    );
    (
        driver,
        DriverParts {
            reporter,
            health: parts.health,
            publisher: parts.publisher,
            cancel,
            write_rx,
            events_rx,
            counter,
        },
    )
}

/// Polls `check` until it holds, panicking after five seconds.
pub(crate) async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Clone)]
enum HubCommand {
    Push(Value),
    CloseAll,
}

/// A WebSocket server speaking just enough of the hub protocol.
///
/// Accepts any token except [`BAD_TOKEN`], acknowledges subscriptions
/// and records every frame it receives.
pub(crate) struct MockHub {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    commands: broadcast::Sender<HubCommand>,
    task: JoinHandle<()>,
}

impl MockHub {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (commands, _) = broadcast::channel(16);

        let task = {
            let received = received.clone();
            let connections = connections.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                let mut conns = JoinSet::new();
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let cmds = commands.subscribe();
                    conns.spawn(serve(stream, received.clone(), cmds));
                }
            })
        };

        Self {
            addr,
            received,
            connections,
            commands,
            task,
        }
    }

    /// Address in `host:port` form, as a configuration would carry it.
    pub(crate) fn ip_address(&self) -> String {
        self.addr.to_string()
    }

    pub(crate) fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sends `frame` to every connected client.
    pub(crate) fn push(&self, frame: Value) {
        let _ = self.commands.send(HubCommand::Push(frame));
    }

    /// Closes every connection from the hub side.
    pub(crate) fn close_all(&self) {
        let _ = self.commands.send(HubCommand::CloseAll);
    }

    /// Waits for a received frame matching `pred` and returns it.
    pub(crate) async fn wait_for_frame(&self, pred: impl Fn(&Value) -> bool) -> Value {
        eventually(|| self.received().iter().any(&pred)).await;
        self.received()
            .into_iter()
            .find(|f| pred(f))
            .unwrap()
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    received: Arc<Mutex<Vec<Value>>>,
    mut commands: broadcast::Receiver<HubCommand>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut tx, mut rx) = ws.split();
    let hello = json!({"type": "auth_required", "ha_version": "2024.5.0"});
    if tx.send(Message::Text(hello.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                received.lock().unwrap().push(value.clone());

                let reply = match value["type"].as_str() {
                    Some("auth") if value["access_token"] == BAD_TOKEN => {
                        let nope = json!({"type": "auth_invalid", "message": "Invalid access token"});
                        let _ = tx.send(Message::Text(nope.to_string().into())).await;
                        let _ = tx.send(Message::Close(None)).await;
                        break;
                    }
                    Some("auth") => json!({"type": "auth_ok", "ha_version": "2024.5.0"}),
                    Some(_) => json!({
                        "id": value["id"],
                        "type": "result",
                        "success": true,
                        "result": null
                    }),
                    None => continue,
                };
                if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            cmd = commands.recv() => match cmd {
                Ok(HubCommand::Push(frame)) => {
                    if tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Ok(HubCommand::CloseAll) => {
                    let _ = tx.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
