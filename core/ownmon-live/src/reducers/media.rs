//! Media player view.
//!
//! Media updates on the stream are only a signal: the authoritative state is
//! pulled from `/api/media`. Each pull is tagged with a [`RefreshTicket`] so
//! that a slow response can never overwrite a newer one.

use ownmon_protocol::{CurrentMedia, Envelope, Media, MediaResponse, Message};

/// Source app shown when the track came from a snapshot, which omits it.
pub const UNKNOWN_SOURCE_APP: &str = "Unknown";

/// Identifies one HTTP refresh; higher tickets were issued later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket(u64);

#[derive(Debug, Default)]
pub struct MediaView {
    current: Option<CurrentMedia>,
    recent: Vec<Media>,
    issued: u64,
    applied: u64,
}

impl MediaView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&CurrentMedia> {
        self.current.as_ref()
    }

    pub fn recent(&self) -> &[Media] {
        &self.recent
    }

    /// Folds one envelope. A media update yields a ticket; the caller is
    /// expected to fetch `/api/media` and hand the result to
    /// [`complete_refresh`](Self::complete_refresh).
    pub fn apply(&mut self, envelope: &Envelope) -> Option<RefreshTicket> {
        match &envelope.message {
            Message::FullSnapshot(snapshot) => {
                if let Some(media) = &snapshot.media {
                    self.current = Some(CurrentMedia {
                        title: media.title.clone(),
                        artist: media.artist.clone(),
                        album: media.album.clone(),
                        source_app: UNKNOWN_SOURCE_APP.to_string(),
                        start_time: media.start_time.clone(),
                        duration_secs: 0,
                        is_playing: media.is_playing,
                    });
                }
                None
            }
            Message::MediaUpdated(_) => Some(self.begin_refresh()),
            Message::SessionChanged(_) => None,
        }
    }

    /// Issues a ticket for a refresh not triggered by the stream (mount, manual).
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        RefreshTicket(self.issued)
    }

    /// Replaces the view with a fetched result unless a newer one already
    /// landed. Returns true if applied.
    pub fn complete_refresh(&mut self, ticket: RefreshTicket, response: MediaResponse) -> bool {
        if ticket.0 <= self.applied {
            tracing::debug!(
                ticket = ticket.0,
                applied = self.applied,
                "Discarding stale media refresh"
            );
            return false;
        }
        self.applied = ticket.0;
        self.current = response.current;
        self.recent = response.history;
        true
    }
}
