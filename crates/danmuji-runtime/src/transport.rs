//! One websocket session to the backend's room feed.
//!
//! The session runs as its own task. Everything it observes (state changes
//! and decoded frames) goes through a channel owned by this [`Transport`];
//! dropping the transport drops the channel, so nothing from a replaced
//! session can reach the caller.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use danmuji_core::{Arrival, ConnectionState, DecodeError, Event, decode, decode_bytes};

/// Text of the liveness ping.
pub const HEARTBEAT: &str = "Heartbeat";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("websocket send failed: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("websocket receive failed: {0}")]
    Receive(#[source] tungstenite::Error),
}

/// What the session reports, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    State(ConnectionState),
    Frame(Arrival),
}

pub struct Transport {
    url: String,
    rx: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
}

impl Transport {
    /// Start a session to `url`. Returns immediately; the connection opens
    /// in the background and reports through [`Transport::next`].
    pub fn spawn(url: String, heartbeat: Duration) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(run(url.clone(), heartbeat, tx, cancel.clone()));
        Self { url, rx, cancel }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next report from the session, `None` once it has ended. Cancel-safe.
    pub async fn next(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

async fn run(
    url: String,
    heartbeat: Duration,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let _ = tx.send(Inbound::State(ConnectionState::Connecting)).await;
    match session(&url, heartbeat, &tx, &cancel).await {
        Ok(()) => tracing::debug!(%url, "websocket session ended"),
        Err(e) => tracing::warn!(%url, error = %e, "websocket session failed"),
    }
    let _ = tx.send(Inbound::State(ConnectionState::Closed)).await;
}

async fn session(
    url: &str,
    heartbeat: Duration,
    tx: &mpsc::Sender<Inbound>,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    let ws = tokio::select! {
        res = tokio_tungstenite::connect_async(url) => res.map_err(TransportError::Connect)?.0,
        _ = cancel.cancelled() => return Ok(()),
    };
    if tx.send(Inbound::State(ConnectionState::Open)).await.is_err() {
        return Ok(());
    }
    tracing::info!(%url, "websocket open");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }

            _ = ticker.tick() => {
                ws_tx
                    .send(Message::Text(HEARTBEAT.to_string()))
                    .await
                    .map_err(TransportError::Send)?;
                tracing::trace!("heartbeat sent");
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Err(TransportError::Receive(e)),
                    None => return Ok(()),
                };

                let decoded = match msg {
                    Message::Text(text) => decode(&text),
                    Message::Binary(bytes) => decode_bytes(&bytes),
                    Message::Ping(data) => {
                        ws_tx.send(Message::Pong(data)).await.map_err(TransportError::Send)?;
                        continue;
                    }
                    Message::Close(frame) => {
                        tracing::debug!(?frame, "server sent close frame");
                        let _ = tx.send(Inbound::State(ConnectionState::Closing)).await;
                        return Ok(());
                    }
                    _ => continue,
                };

                let Some(event) = accept(decoded) else {
                    continue;
                };
                if tx.send(Inbound::Frame(Arrival { seq, event })).await.is_err() {
                    // Receiver dropped: the session was replaced.
                    return Ok(());
                }
                seq += 1;
            }
        }
    }
}

/// Log and drop frames that fail to decode.
fn accept(decoded: Result<Event, DecodeError>) -> Option<Event> {
    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable frame");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
