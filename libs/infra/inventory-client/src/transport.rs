//! [libs/infra/inventory-client/src/transport.rs]
//! Reconnecting WebSocket transport for the Inventory event feed (spec
//! §4.4): a background task owning the socket, an `mpsc` channel handing
//! decoded events to the caller, and an exponential-backoff reconnect loop.
//!
//! Every reconnect is itself meaningful here: events emitted while the
//! socket was down are gone for good, so on every successful reconnect
//! (not just the first connect) this emits a synthetic
//! `InventoryEvent::StreamResynced` before any real event, so the Sync
//! Engine can schedule the mandatory full reconciliation sweep (spec §4.4,
//! §8 scenario S6).

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::StreamExt;
use spoolbridge_models::InventoryEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::protocol::decode_event;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: INITIAL_BACKOFF,
        max_interval: MAX_BACKOFF,
        multiplier: 2.0,
        // Full jitter: the randomized interval ranges from 0 up to roughly
        // twice the nominal exponential step, rather than a tight band
        // around it (spec §4.4: "full jitter").
        randomization_factor: 1.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Subscribes to the Inventory event feed. Spawns a background task that
/// owns the socket and reconnects for the lifetime of the process; the
/// returned receiver is infinite and restartable (spec §4.4).
pub fn subscribe(ws_url: String) -> mpsc::Receiver<InventoryEvent> {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(run(ws_url, tx));
    rx
}

async fn run(ws_url: String, tx: mpsc::Sender<InventoryEvent>) {
    let mut backoff = reconnect_backoff();
    let mut ever_connected = false;

    loop {
        match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&ws_url)).await {
            Ok(Ok((stream, _response))) => {
                info!(url = %ws_url, "inventory event stream connected");
                backoff.reset();

                if ever_connected {
                    if tx.send(InventoryEvent::StreamResynced).await.is_err() {
                        return;
                    }
                }
                ever_connected = true;

                if connection_loop(stream, &tx).await.is_err() {
                    warn!("inventory event stream connection dropped");
                }
            }
            Ok(Err(e)) => {
                warn!("inventory event stream connect failed: {e}");
            }
            Err(_) => {
                warn!("inventory event stream connect timed out after {CONNECT_TIMEOUT:?}");
            }
        }

        let wait = backoff.next_backoff().unwrap_or(MAX_BACKOFF);
        debug!(?wait, "backing off before reconnecting to inventory event stream");
        tokio::time::sleep(wait).await;
    }
}

async fn connection_loop<S>(
    mut stream: tokio_tungstenite::WebSocketStream<S>,
    tx: &mpsc::Sender<InventoryEvent>,
) -> Result<(), ()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let next = tokio::time::timeout(READ_IDLE_TIMEOUT, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                warn!("inventory event stream error: {e}");
                return Err(());
            }
            Ok(None) => {
                info!("inventory event stream closed by server");
                return Err(());
            }
            Err(_) => {
                warn!("inventory event stream idle for {READ_IDLE_TIMEOUT:?}, treating as dead");
                return Err(());
            }
        };

        match message {
            WsMessage::Text(text) => match decode_event(&text) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        return Err(());
                    }
                }
                Err(e) => warn!("dropping malformed inventory event: {e}"),
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(frame) => {
                info!(?frame, "inventory event stream received close frame");
                return Err(());
            }
            WsMessage::Binary(_) | WsMessage::Frame(_) => {
                warn!("ignoring unexpected non-text inventory event frame");
            }
        }
    }
}
