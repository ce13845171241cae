//! Dashboard state and event loop.
//!
//! `App` owns the one live connection. Each card mounts by subscribing its
//! reducer to the hub and unmounts by dropping the subscription. HTTP work
//! runs in spawned tasks that report back over a channel, so the reducers
//! stay on this thread.

use chrono::Utc;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures_util::StreamExt;
use ownmon_live::{
    ActivityView, ApiClient, ConnectionStatus, CountersView, LiveClient, LiveConfig, LiveError,
    MediaView, RefreshTicket, Subscription,
};
use ownmon_protocol::{DailyStats, MediaQuery, MediaResponse};
use ratatui::backend::Backend;
use ratatui::Terminal;
use std::cell::{Ref, RefCell};
use std::io;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::ui;

const MEDIA_HISTORY_LIMIT: u32 = 5;
const MESSAGE_TTL: Duration = Duration::from_secs(2);
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

/// Result of an HTTP fetch, delivered back to the event loop.
#[derive(Debug)]
pub enum Refresh {
    Media {
        ticket: RefreshTicket,
        result: Result<MediaResponse, LiveError>,
    },
    Counters(Result<DailyStats, LiveError>),
}

/// A mounted card: its view model plus the subscription feeding it.
pub struct Card<V> {
    view: Rc<RefCell<V>>,
    _subscription: Subscription,
}

impl<V> Card<V> {
    pub fn view(&self) -> Ref<'_, V> {
        self.view.borrow()
    }
}

pub struct App {
    client: LiveClient,
    api: ApiClient,
    activity: Card<ActivityView>,
    media: Card<MediaView>,
    counters: Card<CountersView>,
    refresh_tx: mpsc::UnboundedSender<Refresh>,
    refresh_rx: mpsc::UnboundedReceiver<Refresh>,
    message: Option<(String, Instant)>,
    should_quit: bool,
}

impl App {
    pub fn new(config: &LiveConfig) -> Result<Self, LiveError> {
        let client = LiveClient::new(config)?;
        let api = ApiClient::new(config)?;
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let activity = mount_activity(&client);
        let media = mount_media(&client, &api, &refresh_tx);
        let counters = mount_counters(&client);

        Ok(Self {
            client,
            api,
            activity,
            media,
            counters,
            refresh_tx,
            refresh_rx,
            message: None,
            should_quit: false,
        })
    }

    pub fn activity(&self) -> Ref<'_, ActivityView> {
        self.activity.view()
    }

    pub fn media(&self) -> Ref<'_, MediaView> {
        self.media.view()
    }

    pub fn counters(&self) -> Ref<'_, CountersView> {
        self.counters.view()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.client.status()
    }

    pub fn endpoint(&self) -> &str {
        self.client.url()
    }

    /// The footer message, if it has not expired.
    pub fn message(&self) -> Option<&str> {
        match &self.message {
            Some((text, until)) if Instant::now() < *until => Some(text.as_str()),
            _ => None,
        }
    }

    fn set_message(&mut self, text: impl Into<String>) {
        self.message = Some((text.into(), Instant::now() + MESSAGE_TTL));
    }

    pub async fn run<B: Backend>(mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let mut events = EventStream::new();
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

        self.client.connect();
        self.refresh_all();

        loop {
            terminal.draw(|frame| ui::draw(frame, &self))?;
            if self.should_quit {
                self.client.disconnect();
                return Ok(());
            }

            let next_tick = self.activity.view().next_tick();
            tokio::select! {
                _ = self.client.step() => {}
                Some(refresh) = self.refresh_rx.recv() => self.apply_refresh(refresh),
                event = events.next() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(err)) => return Err(err),
                    None => self.should_quit = true,
                },
                _ = sleep_or_pending(next_tick) => {
                    self.activity.view.borrow_mut().tick(Instant::now());
                }
                _ = redraw.tick() => {}
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        let Event::Key(key) = event else {
            return;
        };
        if key.kind != KeyEventKind::Press {
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('r') => {
                self.refresh_all();
                self.set_message("Refreshing media and counters");
            }
            KeyCode::Char('c') => self.toggle_connection(),
            _ => {}
        }
    }

    fn toggle_connection(&mut self) {
        match self.client.status() {
            ConnectionStatus::Idle | ConnectionStatus::Closed => {
                self.client.connect();
                self.set_message("Connecting");
            }
            ConnectionStatus::Connecting | ConnectionStatus::Open | ConnectionStatus::Reconnecting => {
                self.client.disconnect();
                self.set_message("Disconnected");
            }
        }
    }

    /// The on-mount fetches: media history and today's counters.
    pub fn refresh_all(&mut self) {
        let ticket = self.media.view.borrow_mut().begin_refresh();
        spawn_media_fetch(&self.api, ticket, &self.refresh_tx);
        spawn_counters_fetch(&self.api, &self.refresh_tx);
    }

    pub fn apply_refresh(&mut self, refresh: Refresh) {
        match refresh {
            Refresh::Media { ticket, result } => match result {
                Ok(response) => {
                    self.media.view.borrow_mut().complete_refresh(ticket, response);
                }
                Err(err) => {
                    warn!(error = %err, "Media refresh failed; keeping previous state");
                    self.set_message("Media refresh failed");
                }
            },
            Refresh::Counters(result) => match result {
                Ok(stats) => self.counters.view.borrow_mut().apply_fetched(stats, Utc::now()),
                Err(err) => {
                    warn!(error = %err, "Counters fetch failed");
                    self.set_message("Counters fetch failed");
                }
            },
        }
    }

    #[cfg(test)]
    pub fn client(&self) -> &LiveClient {
        &self.client
    }
}

fn mount_activity(client: &LiveClient) -> Card<ActivityView> {
    let view = Rc::new(RefCell::new(ActivityView::new()));
    let sink = Rc::clone(&view);
    let subscription = client.subscribe(move |envelope| {
        sink.borrow_mut().apply(envelope, Utc::now(), Instant::now());
    });
    Card {
        view,
        _subscription: subscription,
    }
}

fn mount_media(
    client: &LiveClient,
    api: &ApiClient,
    refresh_tx: &mpsc::UnboundedSender<Refresh>,
) -> Card<MediaView> {
    let view = Rc::new(RefCell::new(MediaView::new()));
    let sink = Rc::clone(&view);
    let api = api.clone();
    let refresh_tx = refresh_tx.clone();
    let subscription = client.subscribe(move |envelope| {
        let ticket = sink.borrow_mut().apply(envelope);
        if let Some(ticket) = ticket {
            spawn_media_fetch(&api, ticket, &refresh_tx);
        }
    });
    Card {
        view,
        _subscription: subscription,
    }
}

fn mount_counters(client: &LiveClient) -> Card<CountersView> {
    let view = Rc::new(RefCell::new(CountersView::new()));
    let sink = Rc::clone(&view);
    let subscription = client.subscribe(move |envelope| {
        sink.borrow_mut().apply(envelope);
    });
    Card {
        view,
        _subscription: subscription,
    }
}

fn spawn_media_fetch(api: &ApiClient, ticket: RefreshTicket, tx: &mpsc::UnboundedSender<Refresh>) {
    let api = api.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = api.media(&MediaQuery::recent(MEDIA_HISTORY_LIMIT)).await;
        if tx.send(Refresh::Media { ticket, result }).is_err() {
            info!("Dashboard closed before media refresh completed");
        }
    });
}

fn spawn_counters_fetch(api: &ApiClient, tx: &mpsc::UnboundedSender<Refresh>) {
    let api = api.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = api.live_stats().await;
        if tx.send(Refresh::Counters(result)).is_err() {
            info!("Dashboard closed before counters fetch completed");
        }
    });
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ownmon_live::CountersSource;
    use ownmon_protocol::{Envelope, MediaSignal, Message};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn media_body(title: &str) -> serde_json::Value {
        serde_json::json!({
            "current": {
                "title": title,
                "artist": "Band",
                "album": null,
                "source_app": "Spotify.exe",
                "start_time": "2026-01-30T10:00:00Z",
                "duration_secs": 95,
                "is_playing": true
            },
            "history": [],
            "total": 0,
            "limit": 5,
            "offset": 0
        })
    }

    fn config_for(server: &MockServer) -> LiveConfig {
        let address = server.address();
        LiveConfig {
            host: address.ip().to_string(),
            port: address.port(),
            ..LiveConfig::default()
        }
    }

    #[tokio::test]
    async fn media_update_refetches_and_replaces_media_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/media"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(media_body("Fresh Track")))
            .expect(1)
            .mount(&server)
            .await;

        let mut app = App::new(&config_for(&server)).expect("app");
        assert!(app.media().current().is_none());

        app.client().hub().dispatch(Envelope::new(
            Message::MediaUpdated(MediaSignal::default()),
            "2026-01-30T10:00:05Z",
        ));

        let refresh = tokio::time::timeout(Duration::from_secs(5), app.refresh_rx.recv())
            .await
            .expect("refresh in time")
            .expect("refresh delivered");
        app.apply_refresh(refresh);

        let media = app.media();
        let current = media.current().expect("current media");
        assert_eq!(current.title, "Fresh Track");
        assert!(current.is_playing);
    }

    #[tokio::test]
    async fn failed_media_refresh_keeps_previous_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/media"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut app = App::new(&config_for(&server)).expect("app");
        app.client().hub().dispatch(Envelope::new(
            Message::MediaUpdated(MediaSignal::default()),
            "2026-01-30T10:00:05Z",
        ));

        let refresh = tokio::time::timeout(Duration::from_secs(5), app.refresh_rx.recv())
            .await
            .expect("refresh in time")
            .expect("refresh delivered");
        app.apply_refresh(refresh);

        assert!(app.media().current().is_none());
        assert_eq!(app.message(), Some("Media refresh failed"));
    }

    #[tokio::test]
    async fn counters_fetch_reports_back_and_fills_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessions": 12, "unique_apps": 5, "keystrokes": 4321,
                "clicks": 210, "focus_time_secs": 7200, "media_time_secs": 1800
            })))
            .mount(&server)
            .await;

        let mut app = App::new(&config_for(&server)).expect("app");
        spawn_counters_fetch(&app.api, &app.refresh_tx);

        let refresh = tokio::time::timeout(Duration::from_secs(5), app.refresh_rx.recv())
            .await
            .expect("refresh in time")
            .expect("refresh delivered");
        app.apply_refresh(refresh);

        let counters = app.counters();
        assert_eq!(counters.stats().map(|s| s.keystrokes), Some(4321));
        assert!(matches!(counters.source(), Some(CountersSource::Fetch)));
    }
}
