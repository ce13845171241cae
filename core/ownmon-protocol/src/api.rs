//! Request parameters and response bodies for the companion HTTP API.
//!
//! These mirror what the backend serves under `/api/*` and `/health`. All
//! list endpoints paginate with `limit`/`offset`.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Categories & Sessions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
}

/// One recorded focus session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub process_name: String,
    pub window_title: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub keystrokes: u64,
    pub clicks: u64,
    pub scrolls: u64,
    pub duration_secs: u64,
    pub is_idle: bool,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<Session>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Media
// ═══════════════════════════════════════════════════════════════════════════════

/// A finished (or in-progress) entry of the media history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub source_app: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_secs: u64,
}

/// The track the backend considers current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentMedia {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub source_app: String,
    pub start_time: String,
    pub duration_secs: u64,
    pub is_playing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaResponse {
    pub current: Option<CurrentMedia>,
    pub history: Vec<Media>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Today's live totals, served from backend memory (`/api/stats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub sessions: u64,
    pub unique_apps: u64,
    pub keystrokes: u64,
    pub clicks: u64,
    pub focus_time_secs: u64,
    pub media_time_secs: u64,
}

/// Persisted totals for one date (`/api/stats/daily`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatsResponse {
    pub date: String,
    pub keystrokes: u64,
    pub clicks: u64,
    pub focus_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: u8,
    pub keystrokes: u64,
    pub clicks: u64,
    pub sessions: u64,
    pub focus_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStats {
    pub date: String,
    pub keystrokes: u64,
    pub clicks: u64,
    pub sessions: u64,
    pub focus_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStats {
    pub process_name: String,
    pub focus_time_secs: u64,
    pub keystrokes: u64,
    pub clicks: u64,
    pub session_count: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration & Health
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSetting {
    pub key: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub settings: Vec<ConfigSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query Parameters
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filters for `/api/sessions`. Unset fields are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

/// Filters for `/api/media`. Unset fields are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl MediaQuery {
    /// The query the media card issues: the latest few tracks.
    pub fn recent(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_query_omits_unset_fields() {
        let query = SessionQuery {
            limit: Some(10),
            order: Some(SortOrder::Desc),
            ..SessionQuery::default()
        };
        let value = serde_json::to_value(&query).expect("serialize");
        assert_eq!(value, serde_json::json!({"limit": 10, "order": "desc"}));
    }

    #[test]
    fn media_response_accepts_missing_current() {
        let body = r#"{
            "current": null,
            "history": [{
                "id": 3,
                "title": "Song",
                "artist": "Band",
                "album": null,
                "source_app": "Spotify.exe",
                "start_time": "2026-01-30T10:00:00Z",
                "end_time": "2026-01-30T10:03:30Z",
                "duration_secs": 210
            }],
            "total": 1,
            "limit": 5,
            "offset": 0
        }"#;
        let response: MediaResponse = serde_json::from_str(body).expect("parse");
        assert!(response.current.is_none());
        assert_eq!(response.history[0].duration_secs, 210);
    }

    #[test]
    fn session_carries_category() {
        let body = r##"{
            "id": 7,
            "process_name": "code.exe",
            "window_title": "main.rs",
            "start_time": "2026-01-30T09:00:00Z",
            "end_time": null,
            "keystrokes": 120,
            "clicks": 8,
            "scrolls": 3,
            "duration_secs": 600,
            "is_idle": false,
            "category": {"id": 2, "name": "Development", "color": "#3b82f6", "icon": "code"}
        }"##;
        let session: Session = serde_json::from_str(body).expect("parse");
        assert_eq!(session.category.name, "Development");
        assert!(session.end_time.is_none());
    }
}
