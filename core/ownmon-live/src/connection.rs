//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns the single streaming connection: it decides
//! when to open a transport, reacts to transport events, and schedules the
//! fixed-delay reconnect. It performs no I/O itself. Opening and closing go
//! through a [`Connector`], and time is passed in explicitly, so the whole
//! lifecycle can be driven step by step.
//!
//! Every transport gets a generation number. Events from a transport that
//! has since been replaced or intentionally closed are ignored, which keeps
//! "at most one live transport" true even when a late close event arrives.

use crate::error::Result;
use crate::hub::Hub;
use ownmon_protocol::decode_envelope;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Something the transport reported, tagged with the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened { generation: u64 },
    Frame { generation: u64, text: String },
    Closed { generation: u64, reason: Option<String> },
    Failed { generation: u64, error: String },
}

impl TransportEvent {
    pub fn generation(&self) -> u64 {
        match self {
            TransportEvent::Opened { generation }
            | TransportEvent::Frame { generation, .. }
            | TransportEvent::Closed { generation, .. }
            | TransportEvent::Failed { generation, .. } => *generation,
        }
    }
}

/// Opens and closes the underlying transport.
///
/// `open` must not block: it starts connection establishment and reports the
/// outcome later as [`TransportEvent`]s carrying the same generation.
pub trait Connector {
    fn open(&mut self, url: &str, generation: u64) -> Result<()>;
    fn close(&mut self, generation: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// `connect` has never been called.
    Idle,
    Connecting,
    Open,
    /// Waiting for the reconnect timer after an unexpected closure.
    Reconnecting,
    /// Closed by `disconnect`; no automatic reconnection.
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ConnectionManager<C> {
    url: String,
    reconnect_delay: Duration,
    connector: C,
    hub: Hub,
    status: ConnectionStatus,
    generation: u64,
    transport_live: bool,
    intentionally_closed: bool,
    reconnect_at: Option<Instant>,
    dropped_frames: u64,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, connector: C, hub: Hub) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            connector,
            hub,
            status: ConnectionStatus::Idle,
            generation: 0,
            transport_live: false,
            intentionally_closed: false,
            reconnect_at: None,
            dropped_frames: 0,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the pending reconnect attempt is due, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Frames dropped because they failed to decode.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    pub fn connect(&mut self) {
        self.connect_at(Instant::now());
    }

    /// Opens a transport unless one is already open or opening.
    pub fn connect_at(&mut self, now: Instant) {
        if self.transport_live {
            debug!(generation = self.generation, "Connect ignored; transport already live");
            return;
        }

        self.intentionally_closed = false;
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        info!(url = %self.url, generation = self.generation, "Connecting to stream");

        match self.connector.open(&self.url, self.generation) {
            Ok(()) => self.transport_live = true,
            Err(err) => {
                warn!(error = %err, url = %self.url, "Failed to start stream connection");
                self.status = ConnectionStatus::Reconnecting;
                self.schedule_reconnect(now);
            }
        }
    }

    /// Closes the transport and stops the reconnect loop until the next `connect`.
    pub fn disconnect(&mut self) {
        self.intentionally_closed = true;
        if self.reconnect_at.take().is_some() {
            debug!("Cancelled pending reconnect");
        }
        if self.transport_live {
            self.connector.close(self.generation);
            self.transport_live = false;
        }
        // Anything the old transport still reports is stale from here on.
        self.generation += 1;
        self.status = ConnectionStatus::Closed;
        info!(url = %self.url, "Disconnected from stream");
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        self.handle_event_at(event, Instant::now());
    }

    pub fn handle_event_at(&mut self, event: TransportEvent, now: Instant) {
        if event.generation() != self.generation || !self.transport_live {
            debug!(
                event_generation = event.generation(),
                generation = self.generation,
                "Ignoring event from stale transport"
            );
            return;
        }

        match event {
            TransportEvent::Opened { .. } => {
                self.status = ConnectionStatus::Open;
                self.reconnect_at = None;
                info!(url = %self.url, generation = self.generation, "Stream connected");
            }
            TransportEvent::Frame { text, .. } => match decode_envelope(&text) {
                Ok(envelope) => {
                    debug!(kind = %envelope.kind(), "Envelope received");
                    self.hub.dispatch(envelope);
                }
                Err(err) => {
                    self.dropped_frames += 1;
                    warn!(
                        code = err.code(),
                        error = %err,
                        "Dropping undecodable stream frame"
                    );
                }
            },
            TransportEvent::Closed { reason, .. } => {
                info!(reason = reason.as_deref().unwrap_or(""), "Stream disconnected");
                self.on_transport_lost(now);
            }
            TransportEvent::Failed { error, .. } => {
                warn!(error = %error, url = %self.url, "Stream connection failed");
                self.on_transport_lost(now);
            }
        }
    }

    /// Fires the reconnect attempt if it is due. Returns true if it fired.
    pub fn poll_reconnect(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(deadline) if now >= deadline => {
                self.reconnect_at = None;
                info!(url = %self.url, "Attempting to reconnect");
                self.connect_at(now);
                true
            }
            _ => false,
        }
    }

    fn on_transport_lost(&mut self, now: Instant) {
        self.transport_live = false;
        if self.intentionally_closed {
            self.status = ConnectionStatus::Closed;
            return;
        }
        self.status = ConnectionStatus::Reconnecting;
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.reconnect_at.is_some() || self.intentionally_closed {
            return;
        }
        self.reconnect_at = Some(now + self.reconnect_delay);
        info!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }
}
