//! The driver that ties a connection, its transport events, and the hub together.

use crate::config::LiveConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, Connector, TransportEvent};
use crate::error::Result;
use crate::hub::{Hub, Subscription};
use crate::tls;
use crate::transport::WsConnector;
use ownmon_protocol::Envelope;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// One live connection plus its subscription hub.
///
/// Not `Send`: it lives on the thread that renders, and is driven by calling
/// [`step`](Self::step) from that thread's event loop (a current-thread
/// runtime or a `LocalSet`).
pub struct LiveClient<C = WsConnector> {
    manager: ConnectionManager<C>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    events_closed: bool,
}

impl LiveClient<WsConnector> {
    pub fn new(config: &LiveConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tls = if config.scheme.is_secure() {
            Some(tls::client_config(config.verify_tls)?)
        } else {
            None
        };
        Ok(Self::with_connector(config, WsConnector::new(tx, tls), rx))
    }
}

impl<C: Connector> LiveClient<C> {
    pub fn with_connector(
        config: &LiveConfig,
        connector: C,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let manager = ConnectionManager::new(
            config.stream_url(),
            config.reconnect_delay(),
            connector,
            Hub::new(),
        );
        Self {
            manager,
            events,
            events_closed: false,
        }
    }

    pub fn hub(&self) -> &Hub {
        self.manager.hub()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Envelope) + 'static,
    {
        self.manager.hub().subscribe(callback)
    }

    pub fn connect(&mut self) {
        self.manager.connect_at(Instant::now());
    }

    pub fn disconnect(&mut self) {
        self.manager.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn url(&self) -> &str {
        self.manager.url()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.manager.dropped_frames()
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Waits for and handles the next thing that can happen.
    ///
    /// Queued late-join replays go first and return without waiting. After
    /// that the next transport event or the reconnect deadline, whichever
    /// comes first. Cancel-safe: dropping the future loses nothing.
    pub async fn step(&mut self) {
        if self.manager.hub().run_pending() > 0 {
            return;
        }

        let deadline = self.manager.reconnect_deadline();
        tokio::select! {
            event = self.events.recv(), if !self.events_closed => match event {
                Some(event) => self.manager.handle_event_at(event, Instant::now()),
                None => {
                    tracing::warn!("Transport event channel closed");
                    self.events_closed = true;
                }
            },
            _ = sleep_or_pending(deadline) => {
                self.manager.poll_reconnect(Instant::now());
            }
        }
    }

    /// Drives the connection until it is intentionally closed.
    pub async fn run(&mut self) {
        while self.status() != ConnectionStatus::Closed || self.hub().has_pending() {
            self.step().await;
        }
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
