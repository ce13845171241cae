//! WebSocket transport.
//!
//! [`WsConnector`] is the production [`Connector`]. Each `open` spawns one
//! task that owns the socket and reports back over an unbounded channel; the
//! task shares no state with the rest of the client. At most one task is
//! kept: opening a new generation or closing the current one signals the
//! previous task to shut down.

use crate::connection::{Connector, TransportEvent};
use crate::error::{LiveError, Result};
use futures_util::StreamExt;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_tls_with_config, Connector as TlsConnector};
use tracing::{debug, info, warn};

pub struct WsConnector {
    events: mpsc::UnboundedSender<TransportEvent>,
    tls: Option<Arc<ClientConfig>>,
    active: Option<ActiveTransport>,
}

struct ActiveTransport {
    generation: u64,
    shutdown: oneshot::Sender<()>,
}

impl WsConnector {
    /// `tls` is used for `wss` URLs; `None` falls back to the default roots.
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>, tls: Option<Arc<ClientConfig>>) -> Self {
        Self {
            events,
            tls,
            active: None,
        }
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.generation)
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str, generation: u64) -> Result<()> {
        let request = url
            .into_client_request()
            .map_err(|err| LiveError::InvalidEndpoint {
                url: url.to_string(),
                details: err.to_string(),
            })?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| LiveError::Transport(err.to_string()))?;

        if let Some(previous) = self.active.take() {
            let _ = previous.shutdown.send(());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connector = self
            .tls
            .as_ref()
            .map(|config| TlsConnector::Rustls(Arc::clone(config)));
        runtime.spawn(run_transport(
            request,
            connector,
            generation,
            self.events.clone(),
            shutdown_rx,
        ));

        self.active = Some(ActiveTransport {
            generation,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    fn close(&mut self, generation: u64) {
        match self.active.take() {
            Some(active) if active.generation == generation => {
                let _ = active.shutdown.send(());
            }
            other => self.active = other,
        }
    }
}

enum Ending {
    Closed(Option<String>),
    Failed(String),
    Shutdown,
}

async fn run_transport(
    request: Request,
    connector: Option<TlsConnector>,
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let target = request.uri().to_string();
    debug!(url = %target, generation, "Opening WebSocket");

    let mut stream = tokio::select! {
        result = connect_async_tls_with_config(request, None, false, connector) => match result {
            Ok((stream, _response)) => stream,
            Err(err) => {
                let _ = events.send(TransportEvent::Failed {
                    generation,
                    error: err.to_string(),
                });
                return;
            }
        },
        _ = &mut shutdown => {
            debug!(generation, "Transport cancelled while connecting");
            return;
        }
    };

    if events.send(TransportEvent::Opened { generation }).is_err() {
        return;
    }

    let ending = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let event = TransportEvent::Frame {
                        generation,
                        text: text.as_str().to_owned(),
                    };
                    if events.send(event).is_err() {
                        break Ending::Shutdown;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    debug!(len = bytes.len(), "Ignoring binary frame");
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break Ending::Closed(frame.map(|frame| frame.reason.as_str().to_owned()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break Ending::Failed(err.to_string()),
                None => break Ending::Closed(None),
            },
            _ = &mut shutdown => break Ending::Shutdown,
        }
    };

    match ending {
        Ending::Closed(reason) => {
            let _ = events.send(TransportEvent::Closed { generation, reason });
        }
        Ending::Failed(error) => {
            warn!(error = %error, url = %target, "WebSocket read failed");
            let _ = events.send(TransportEvent::Failed { generation, error });
        }
        Ending::Shutdown => {
            if let Err(err) = stream.close(None).await {
                debug!(error = %err, "WebSocket close handshake failed");
            }
            info!(url = %target, generation, "WebSocket closed");
        }
    }
}
