//! Application orchestrator: wires the lifecycle manager to the log-backed
//! bus and health channel, then waits for signals.

use std::path::PathBuf;
use std::sync::Arc;

use hassbridge_hub_connection::{
    BridgeEvent, ConfigAction, HealthReporter, HealthStatus, LifecycleManager, PublishFuture,
    Publisher, TopicMessage,
};
use serde_json::Map;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Publishes topic messages as structured log records.
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish<'a>(&'a self, message: &'a TopicMessage) -> PublishFuture<'a> {
        Box::pin(async move {
            let payload = serde_json::to_string(&message.payload)?;
            tracing::info!(
                target: "hassbridge::publish",
                topic = %message.topic,
                date = %message.headers.date,
                payload = %payload,
                "publish"
            );
            Ok(())
        })
    }
}

/// Reports health transitions through the log.
pub struct LogHealth;

impl HealthReporter for LogHealth {
    fn set_status(&self, status: HealthStatus, detail: &str) {
        match status {
            HealthStatus::Bad => tracing::warn!(target: "hassbridge::health", %status, "{detail}"),
            _ => tracing::info!(target: "hassbridge::health", %status, "{detail}"),
        }
    }
}

/// Runs the bridge until SIGINT.
pub async fn run(path: PathBuf, config: Config) -> anyhow::Result<()> {
    let manager = Arc::new(LifecycleManager::new(
        Map::new(),
        Arc::new(LogPublisher),
        Arc::new(LogHealth),
    ));
    let cancel = CancellationToken::new();

    // -- Lifecycle events --
    let events_task = match manager.take_events().await {
        Some(mut events) => {
            let cancel = cancel.clone();
            Some(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = events.recv() => match event {
                            Some(BridgeEvent::StateChanged { session_id, state }) => {
                                tracing::debug!(session = %session_id, ?state, "session state");
                            }
                            None => break,
                        },
                    }
                }
            }))
        }
        None => None,
    };

    // A bad initial configuration is reported and the bridge waits for a
    // reload.
    apply(&manager, ConfigAction::New, &config).await;

    let mut reload = ReloadSignal::new()?;
    tracing::info!("bridge ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = reload.recv() => {
                tracing::info!(path = %path.display(), "reloading configuration");
                match Config::load(&path) {
                    Ok(config) => apply(&manager, ConfigAction::Update, &config).await,
                    Err(e) => tracing::error!("keeping current session: {e:#}"),
                }
            }
        }
    }

    // -- Graceful shutdown --
    manager.shutdown().await;
    cancel.cancel();
    if let Some(task) = events_task {
        let _ = task.await;
    }
    Ok(())
}

async fn apply(manager: &LifecycleManager, action: ConfigAction, config: &Config) {
    let contents = match config.to_contents() {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("unusable configuration: {e:#}");
            return;
        }
    };
    if let Err(e) = manager.configure(action, &contents).await {
        tracing::error!(?action, "configuration not applied: {e}");
    }
}

/// `SIGHUP` on Unix; never fires elsewhere.
struct ReloadSignal {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            inner: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.inner.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
