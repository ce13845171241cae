//! Streaming envelope protocol.
//!
//! Every frame on the `/ws` channel is a UTF-8 JSON object of the form
//! `{"type": <kind>, "data": {...}, "timestamp": "<RFC3339>"}`. The payload
//! shape is fully determined by `type`, so decoding goes through a loosely
//! typed [`RawEnvelope`] first and then into the typed payload for that kind.
//! Frames whose payload does not match their declared kind are rejected
//! rather than coerced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Complete point-in-time state, sent once when a client connects.
    FullSnapshot,
    /// A focus-session transition occurred.
    SessionChanged,
    /// Something about playback changed; consumers re-fetch media over HTTP.
    MediaUpdated,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::FullSnapshot => "initial_state",
            MessageKind::SessionChanged => "session_change",
            MessageKind::MediaUpdated => "media_update",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "initial_state" => Some(MessageKind::FullSnapshot),
            "session_change" => Some(MessageKind::SessionChanged),
            "media_update" => Some(MessageKind::MediaUpdated),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Focus session carried inside a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub process_name: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub window_title: String,
    pub start_time: String,
}

/// Media track carried inside a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMedia {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    pub is_playing: bool,
    pub start_time: String,
}

/// Running totals for the current day, as known by the backend at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningCounters {
    #[serde(rename = "sessions")]
    pub session_count: u64,
    pub keystrokes: u64,
    pub clicks: u64,
    pub focus_time_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<ActiveSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<ActiveMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunningCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub process_name: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub window_title: String,
}

/// Payload of a media update. The fields are advisory hints only; the
/// authoritative media state is fetched from `/api/media`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    FullSnapshot(Snapshot),
    SessionChanged(SessionChange),
    MediaUpdated(MediaSignal),
}

/// One decoded unit of the streaming protocol.
///
/// `server_timestamp` is advisory; delivery order is arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub server_timestamp: String,
}

impl Envelope {
    pub fn new(message: Message, server_timestamp: impl Into<String>) -> Self {
        Self {
            message,
            server_timestamp: server_timestamp.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.message {
            Message::FullSnapshot(_) => MessageKind::FullSnapshot,
            Message::SessionChanged(_) => MessageKind::SessionChanged,
            Message::MediaUpdated(_) => MessageKind::MediaUpdated,
        }
    }

    pub fn is_full_snapshot(&self) -> bool {
        matches!(self.message, Message::FullSnapshot(_))
    }

    /// Parses the advisory server timestamp, if it is valid RFC3339.
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.server_timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Serializes the envelope back into its wire form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let data = match &self.message {
            Message::FullSnapshot(snapshot) => serde_json::to_value(snapshot)?,
            Message::SessionChanged(change) => serde_json::to_value(change)?,
            Message::MediaUpdated(signal) => serde_json::to_value(signal)?,
        };
        serde_json::to_string(&RawEnvelope {
            kind: self.kind().as_str().to_string(),
            data,
            timestamp: self.server_timestamp.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not a valid envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("payload does not match kind {kind}: {source}")]
    InvalidPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} payload is missing required field {field}")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },
}

impl DecodeError {
    /// Stable machine-readable code, suitable for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed_frame",
            DecodeError::UnknownKind(_) => "unknown_kind",
            DecodeError::InvalidPayload { .. } => "invalid_payload",
            DecodeError::MissingField { .. } => "missing_field",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    timestamp: String,
}

/// Decodes one text frame into a typed envelope.
pub fn decode_envelope(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let kind = MessageKind::from_str(&raw.kind).ok_or(DecodeError::UnknownKind(raw.kind))?;

    // `data` may be omitted for signal-only kinds.
    let data = match raw.data {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    let message = match kind {
        MessageKind::FullSnapshot => Message::FullSnapshot(parse_payload(kind, data)?),
        MessageKind::SessionChanged => {
            let change: SessionChange = parse_payload(kind, data)?;
            require_string(kind, &change.process_name, "process_name")?;
            Message::SessionChanged(change)
        }
        MessageKind::MediaUpdated => Message::MediaUpdated(parse_payload(kind, data)?),
    };

    Ok(Envelope {
        message,
        server_timestamp: raw.timestamp,
    })
}

fn parse_payload<T>(kind: MessageKind, data: Value) -> Result<T, DecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidPayload { kind, source })
}

fn require_string(kind: MessageKind, value: &str, field: &'static str) -> Result<(), DecodeError> {
    if value.trim().is_empty() {
        return Err(DecodeError::MissingField { kind, field });
    }
    Ok(())
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
