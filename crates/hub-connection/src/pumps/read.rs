//! WebSocket read pump. Decodes incoming frames in arrival order.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use hassbridge_protocol::codec;

use crate::session::SessionDriver;

/// Reads frames from the WebSocket and hands each one to the driver.
///
/// Runs until cancelled or until the connection ends. Every exit other
/// than cancellation goes through [`SessionDriver::on_error`], so the
/// health channel always hears about a dead connection.
pub(crate) async fn read_pump<S>(mut read: S, driver: SessionDriver, cancel: CancellationToken)
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        driver.on_inbound(codec::decode(text.as_bytes())).await;
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        driver.on_inbound(codec::decode(&data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!(" ({}: {})", f.code, f.reason))
                            .unwrap_or_default();
                        debug!("received close frame{reason}");
                        driver.on_error(&format!("hub closed the connection{reason}"));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite itself.
                        trace!("control frame");
                    }
                    Some(Err(e)) => {
                        driver.on_error(&format!("WebSocket read error: {e}"));
                        break;
                    }
                    None => {
                        driver.on_error("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }
}
