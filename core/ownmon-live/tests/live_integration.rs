//! End-to-end tests against a real local WebSocket server.

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use ownmon_live::{
    ActivityView, ConnectionStatus, Connector, LiveClient, LiveConfig, Subscription,
};
use ownmon_protocol::Envelope;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts stream connections and hands each one to the test.
struct Backend {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerSocket>,
}

impl Backend {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                    if tx.send(socket).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            addr,
            connections: rx,
        }
    }

    fn config(&self) -> LiveConfig {
        LiveConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            reconnect_delay_ms: 100,
            ..LiveConfig::default()
        }
    }

    async fn accept(&mut self) -> ServerSocket {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("client connected in time")
            .expect("backend running")
    }
}

/// Waits for the next connection while driving the client, which is what
/// fires its reconnect timer.
async fn accept_driving<C: Connector>(
    backend: &mut Backend,
    client: &mut LiveClient<C>,
) -> ServerSocket {
    timeout(WAIT, async {
        loop {
            tokio::select! {
                socket = backend.connections.recv() => return socket.expect("backend running"),
                _ = client.step() => {}
            }
        }
    })
    .await
    .expect("client reconnected in time")
}

async fn send(socket: &mut ServerSocket, frame: &str) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("send frame");
}

async fn drive_until<C, F>(client: &mut LiveClient<C>, mut done: F)
where
    C: Connector,
    F: FnMut(&LiveClient<C>) -> bool,
{
    timeout(WAIT, async {
        while !done(client) {
            client.step().await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn snapshot_frame(process: &str, started_secs_ago: i64) -> String {
    let now = Utc::now();
    let start = now - ChronoDuration::seconds(started_secs_ago);
    serde_json::json!({
        "type": "initial_state",
        "data": {
            "session": {
                "process_name": process,
                "window_title": "Inbox",
                "start_time": start.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            "stats": {"sessions": 3, "keystrokes": 1200, "clicks": 80, "focus_time_secs": 600}
        },
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
    .to_string()
}

fn session_change_frame(process: &str) -> String {
    serde_json::json!({
        "type": "session_change",
        "data": {"process_name": process, "window_title": "main.rs"},
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
    .to_string()
}

fn mount_activity<C: Connector>(
    client: &LiveClient<C>,
) -> (Subscription, Rc<RefCell<ActivityView>>) {
    let view = Rc::new(RefCell::new(ActivityView::new()));
    let sink = Rc::clone(&view);
    let subscription = client.subscribe(move |envelope| {
        sink.borrow_mut()
            .apply(envelope, Utc::now(), Instant::now());
    });
    (subscription, view)
}

fn record<C: Connector>(client: &LiveClient<C>) -> (Subscription, Rc<RefCell<Vec<Envelope>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = client.subscribe(move |envelope| sink.borrow_mut().push(envelope.clone()));
    (subscription, seen)
}

#[tokio::test]
async fn late_subscriber_sees_buffered_snapshot() {
    let mut backend = Backend::start().await;
    let mut client = LiveClient::new(&backend.config()).expect("client");
    client.connect();

    let mut socket = backend.accept().await;
    send(&mut socket, &snapshot_frame("chrome", 5)).await;
    drive_until(&mut client, |c| c.hub().latest_snapshot().is_some()).await;
    assert!(client.is_connected());

    let (_subscription, view) = mount_activity(&client);
    assert!(!view.borrow().is_active(), "replay must not run inside subscribe");

    drive_until(&mut client, |_| view.borrow().is_active()).await;
    let view = view.borrow();
    let focused = view.focused().expect("focused");
    assert_eq!(focused.process_name, "chrome");
    assert!(
        (4..=6).contains(&focused.duration_secs),
        "duration was {}",
        focused.duration_secs
    );
}

#[tokio::test]
async fn malformed_frame_is_skipped_without_closing() {
    let mut backend = Backend::start().await;
    let mut client = LiveClient::new(&backend.config()).expect("client");
    let (_subscription, seen) = record(&client);
    client.connect();

    let mut socket = backend.accept().await;
    send(&mut socket, "{\"type\": \"session_change\", \"data\": ").await;
    socket
        .send(Message::binary(vec![1u8, 2, 3]))
        .await
        .expect("send binary");
    send(&mut socket, &session_change_frame("code")).await;

    drive_until(&mut client, |_| !seen.borrow().is_empty()).await;
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(client.dropped_frames(), 1);
    assert_eq!(client.status(), ConnectionStatus::Open);
}

#[tokio::test]
async fn state_survives_gap_and_resumes_after_reconnect() {
    let mut backend = Backend::start().await;
    let mut client = LiveClient::new(&backend.config()).expect("client");
    let (_subscription, view) = mount_activity(&client);
    client.connect();

    let mut socket = backend.accept().await;
    send(&mut socket, &snapshot_frame("chrome", 30)).await;
    drive_until(&mut client, |_| view.borrow().is_active()).await;

    drop(socket);
    drive_until(&mut client, |c| c.status() == ConnectionStatus::Reconnecting).await;
    assert_eq!(
        view.borrow().focused().map(|f| f.process_name.clone()),
        Some("chrome".to_string())
    );

    let mut socket = accept_driving(&mut backend, &mut client).await;
    drive_until(&mut client, |c| c.is_connected()).await;
    assert!(client.hub().latest_snapshot().is_some());

    send(&mut socket, &session_change_frame("code")).await;
    drive_until(&mut client, |_| {
        view.borrow().focused().map(|f| f.process_name.as_str() == "code") == Some(true)
    })
    .await;
    assert_eq!(view.borrow().focused().map(|f| f.duration_secs), Some(0));
}

#[tokio::test]
async fn retries_on_fixed_delay_while_backend_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let config = LiveConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        reconnect_delay_ms: 100,
        ..LiveConfig::default()
    };

    let mut client = LiveClient::new(&config).expect("client");
    client.connect();

    for _ in 0..3 {
        drive_until(&mut client, |c| c.status() == ConnectionStatus::Reconnecting).await;
        let deadline = client
            .connection()
            .reconnect_deadline()
            .expect("reconnect scheduled");
        let generation = client.connection().generation();

        drive_until(&mut client, |c| c.connection().generation() > generation).await;
        assert!(Instant::now() >= deadline);
    }
}

#[tokio::test]
async fn disconnect_closes_socket_and_stops_reconnecting() {
    let mut backend = Backend::start().await;
    let mut client = LiveClient::new(&backend.config()).expect("client");
    client.connect();

    let mut socket = backend.accept().await;
    drive_until(&mut client, |c| c.is_connected()).await;

    client.disconnect();
    assert_eq!(client.status(), ConnectionStatus::Closed);

    let closed = timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server saw the close");

    let reconnect = timeout(Duration::from_millis(400), backend.connections.recv()).await;
    assert!(reconnect.is_err(), "no reconnect after disconnect");
    assert_eq!(client.connection().reconnect_deadline(), None);
}
