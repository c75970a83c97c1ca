//! Room connection lifecycle: at most one live websocket session, driven by
//! the backend's room subscription calls.
//!
//! Every room change or teardown queues a [`Feed::Reset`] ahead of any
//! frame from the new session, so downstream state is cleared exactly at
//! the stream boundary.

use std::time::Duration;
use tokio::sync::watch;

use danmuji_core::{ConnectionState, Feed, Room};

use crate::api::RoomApi;
use crate::config::Settings;
use crate::transport::{Inbound, Transport};

/// Where and how to open sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `ws://host:port` or `wss://host:port`.
    pub ws_base: String,
    pub ws_path: String,
    pub heartbeat: Duration,
}

impl Endpoint {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ws_base: settings.ws_base(),
            ws_path: settings.ws_path.clone(),
            heartbeat: settings.heartbeat,
        }
    }

    pub fn url_for(&self, room_id: &str) -> String {
        format!("{}{}?room_id={}", self.ws_base, self.ws_path, room_id)
    }
}

pub struct ConnectionManager<A> {
    api: A,
    endpoint: Endpoint,
    room: Option<Room>,
    transport: Option<Transport>,
    pending_reset: bool,
    state_tx: watch::Sender<ConnectionState>,
}

impl<A: RoomApi> ConnectionManager<A> {
    pub fn new(api: A, endpoint: Endpoint) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Uninstantiated);
        Self {
            api,
            endpoint,
            room: None,
            transport: None,
            pending_reset: false,
            state_tx,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Connection state signal. Updated as [`ConnectionManager::recv`]
    /// drains the session's reports, and on every open or teardown.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    /// Subscribe the backend to `room_id` and open a session for it.
    /// On failure nothing changes.
    pub async fn connect(&mut self, room_id: &str) -> Option<Room> {
        match self.api.room_init(room_id).await {
            Ok(room) => {
                tracing::info!(room_id = %room.roomid, streamer = %room.uname, "room connected");
                self.open(room.clone());
                Some(room)
            }
            Err(e) => {
                tracing::warn!(room_id, error = %e, "room connect failed");
                None
            }
        }
    }

    /// Tear down the backend subscription. On failure nothing changes.
    pub async fn disconnect(&mut self) -> bool {
        match self.api.disconnect().await {
            Ok(()) => {
                tracing::info!("room disconnected");
                self.teardown();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "room disconnect failed");
                false
            }
        }
    }

    /// Ask the backend which room it holds and follow it. A room opens a
    /// session (or reopens a dead one); no room while one is held tears
    /// the connection down. A failed query counts as no room.
    pub async fn sync_status(&mut self) -> Option<Room> {
        let status = match self.api.room_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "room status query failed");
                None
            }
        };

        match status {
            Some(room) => {
                let same_room = self.room.as_ref() == Some(&room);
                if !same_room || !self.current_state().is_live() {
                    self.open(room.clone());
                }
                Some(room)
            }
            None => {
                if self.room.is_some() {
                    tracing::info!("backend holds no room, tearing down");
                    self.teardown();
                }
                None
            }
        }
    }

    /// Next item of the live stream. A queued reset comes first; frames
    /// follow in arrival order. Never resolves while there is neither a
    /// session nor a queued reset. Cancel-safe.
    pub async fn recv(&mut self) -> Feed {
        loop {
            if self.pending_reset {
                self.pending_reset = false;
                return Feed::Reset;
            }
            let Some(transport) = self.transport.as_mut() else {
                return std::future::pending().await;
            };
            match transport.next().await {
                Some(Inbound::Frame(arrival)) => return Feed::Event(arrival),
                Some(Inbound::State(state)) => {
                    tracing::debug!(%state, "connection state");
                    self.state_tx.send_replace(state);
                }
                None => {
                    self.transport = None;
                    self.state_tx.send_replace(ConnectionState::Closed);
                }
            }
        }
    }

    /// Close the session without touching the backend subscription.
    pub fn shutdown(&mut self) {
        if self.transport.take().is_some() {
            self.state_tx.send_replace(ConnectionState::Closed);
        }
    }

    fn open(&mut self, room: Room) {
        self.transport = None;
        let transport = Transport::spawn(self.endpoint.url_for(&room.roomid), self.endpoint.heartbeat);
        tracing::debug!(url = transport.url(), "opening session");
        self.transport = Some(transport);
        self.room = Some(room);
        self.pending_reset = true;
        self.state_tx.send_replace(ConnectionState::Connecting);
    }

    fn teardown(&mut self) {
        self.transport = None;
        self.room = None;
        self.pending_reset = true;
        self.state_tx.send_replace(ConnectionState::Closed);
    }
}
