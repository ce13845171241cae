//! Today's counters. Replaced wholesale, never incremented from deltas, so
//! they go stale between snapshots; the view keeps where the numbers came
//! from and when.

use chrono::{DateTime, Utc};
use ownmon_protocol::{DailyStats, Envelope, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountersSource {
    Snapshot,
    Fetch,
}

impl CountersSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountersSource::Snapshot => "stream",
            CountersSource::Fetch => "api",
        }
    }
}

#[derive(Debug, Default)]
pub struct CountersView {
    stats: Option<DailyStats>,
    source: Option<CountersSource>,
    as_of: Option<DateTime<Utc>>,
}

impl CountersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Option<&DailyStats> {
        self.stats.as_ref()
    }

    pub fn source(&self) -> Option<CountersSource> {
        self.source
    }

    /// Server time of the snapshot, or local time of the fetch.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }

    /// Takes stats from a snapshot. Fields the snapshot lacks read as zero.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        let Message::FullSnapshot(snapshot) = &envelope.message else {
            return false;
        };
        let Some(counters) = snapshot.stats else {
            return false;
        };

        self.stats = Some(DailyStats {
            sessions: counters.session_count,
            unique_apps: 0,
            keystrokes: counters.keystrokes,
            clicks: counters.clicks,
            focus_time_secs: counters.focus_time_secs,
            media_time_secs: 0,
        });
        self.source = Some(CountersSource::Snapshot);
        self.as_of = envelope.server_time();
        true
    }

    pub fn apply_fetched(&mut self, stats: DailyStats, fetched_at: DateTime<Utc>) {
        self.stats = Some(stats);
        self.source = Some(CountersSource::Fetch);
        self.as_of = Some(fetched_at);
    }
}
