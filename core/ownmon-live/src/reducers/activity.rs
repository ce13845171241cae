//! Current activity: which app has focus and for how long.
//!
//! The duration resets to zero exactly when the focused process changes and
//! otherwise grows by one per elapsed one-second tick. The tick schedule only
//! exists while an app is focused, and restarts on every identity change.

use chrono::{DateTime, Utc};
use ownmon_protocol::{Envelope, Message};
use std::time::Duration;
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedApp {
    pub process_name: String,
    pub window_title: String,
    /// When the backend says the session started (RFC 3339, as received).
    pub start_time: String,
    pub duration_secs: u64,
}

#[derive(Debug, Default)]
pub struct ActivityView {
    focused: Option<FocusedApp>,
    next_tick: Option<Instant>,
}

impl ActivityView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<&FocusedApp> {
        self.focused.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.focused.is_some()
    }

    /// When [`tick`](Self::tick) should next be called, `None` while idle.
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Folds one envelope. Returns true if the view changed.
    pub fn apply(&mut self, envelope: &Envelope, wall_now: DateTime<Utc>, now: Instant) -> bool {
        match &envelope.message {
            Message::FullSnapshot(snapshot) => {
                let Some(session) = &snapshot.session else {
                    return false;
                };
                self.focused = Some(FocusedApp {
                    process_name: session.process_name.clone(),
                    window_title: session.window_title.clone(),
                    start_time: session.start_time.clone(),
                    duration_secs: elapsed_since(&session.start_time, wall_now),
                });
                self.next_tick = Some(now + TICK);
                true
            }
            Message::SessionChanged(change) => {
                if let Some(focused) = self
                    .focused
                    .as_mut()
                    .filter(|focused| focused.process_name == change.process_name)
                {
                    if focused.window_title == change.window_title {
                        return false;
                    }
                    focused.window_title = change.window_title.clone();
                    return true;
                }

                self.focused = Some(FocusedApp {
                    process_name: change.process_name.clone(),
                    window_title: change.window_title.clone(),
                    start_time: envelope.server_timestamp.clone(),
                    duration_secs: 0,
                });
                self.next_tick = Some(now + TICK);
                true
            }
            Message::MediaUpdated(_) => false,
        }
    }

    /// Advances the duration by every tick due at `now`. Returns true if it moved.
    pub fn tick(&mut self, now: Instant) -> bool {
        let (Some(focused), Some(mut next)) = (self.focused.as_mut(), self.next_tick) else {
            return false;
        };

        let mut advanced = false;
        while next <= now {
            focused.duration_secs += 1;
            next += TICK;
            advanced = true;
        }
        self.next_tick = Some(next);
        advanced
    }

    /// Stops the tick schedule and forgets the focused app.
    pub fn clear(&mut self) {
        self.focused = None;
        self.next_tick = None;
    }
}

/// Whole seconds from `start_time` to `wall_now`, clamped at zero.
/// An unparseable start counts as zero.
fn elapsed_since(start_time: &str, wall_now: DateTime<Utc>) -> u64 {
    match DateTime::parse_from_rfc3339(start_time) {
        Ok(start) => {
            let elapsed = wall_now.signed_duration_since(start.with_timezone(&Utc));
            u64::try_from(elapsed.num_seconds()).unwrap_or(0)
        }
        Err(err) => {
            tracing::debug!(error = %err, start_time, "Unparseable session start time");
            0
        }
    }
}
