//! WebSocket write pump. Serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Writes queued frames to the WebSocket until cancelled, then sends a
/// close frame.
///
/// Frames already queued when the cancel arrives are still written; the
/// queue is closed first so nothing new can join it.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut sink_ok = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(m) = msg else { break };
                if let Err(e) = write.send(m).await {
                    error!("WebSocket write error: {e}");
                    sink_ok = false;
                    break;
                }
            }
        }
    }

    write_rx.close();
    if sink_ok {
        let mut drained = 0usize;
        while let Some(m) = write_rx.recv().await {
            if let Err(e) = write.send(m).await {
                warn!("dropping queued frames, WebSocket write error: {e}");
                break;
            }
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "flushed queued frames before closing");
        }
    }

    trace!("write pump stopping");
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
