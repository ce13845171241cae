//! Typed client for the backend's HTTP API.

use crate::config::LiveConfig;
use crate::error::{LiveError, Result};
use ownmon_protocol::{
    AppStats, Category, ConfigResponse, DailyStats, DailyStatsResponse, HealthResponse,
    HourlyStats, MediaQuery, MediaResponse, SessionQuery, SessionsResponse, TimelineStats,
};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMELINE_DAYS: u32 = 7;

#[derive(Debug, Serialize)]
struct DateParam<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DaysParam {
    days: u32,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &LiveConfig) -> Result<Self> {
        Self::with_base_url(
            &config.http_base_url(),
            config.http_timeout(),
            config.verify_tls,
        )
    }

    pub fn with_base_url(base: &str, timeout: Duration, verify_tls: bool) -> Result<Self> {
        let base = Url::parse(base).map_err(|err| LiveError::InvalidEndpoint {
            url: base.to_string(),
            details: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(LiveError::InvalidEndpoint {
                url: base.to_string(),
                details: "not a hierarchical URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|source| LiveError::Http {
                endpoint: base.to_string(),
                source,
            })?;

        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get(&["health"], None::<&()>).await
    }

    pub async fn sessions(&self, query: &SessionQuery) -> Result<SessionsResponse> {
        self.get(&["api", "sessions"], Some(query)).await
    }

    pub async fn media(&self, query: &MediaQuery) -> Result<MediaResponse> {
        self.get(&["api", "media"], Some(query)).await
    }

    /// Today's running totals, kept in backend memory.
    pub async fn live_stats(&self) -> Result<DailyStats> {
        self.get(&["api", "stats"], None::<&()>).await
    }

    /// Persisted totals for `date` (`YYYY-MM-DD`), or today when `None`.
    pub async fn daily_stats(&self, date: Option<&str>) -> Result<DailyStatsResponse> {
        self.get(&["api", "stats", "daily"], Some(&DateParam { date }))
            .await
    }

    pub async fn hourly_stats(&self, date: Option<&str>) -> Result<Vec<HourlyStats>> {
        self.get(&["api", "stats", "hourly"], Some(&DateParam { date }))
            .await
    }

    /// One entry per day for the last `days` days (7 when `None`).
    pub async fn timeline_stats(&self, days: Option<u32>) -> Result<Vec<TimelineStats>> {
        let days = days.unwrap_or(DEFAULT_TIMELINE_DAYS);
        self.get(&["api", "stats", "timeline"], Some(&DaysParam { days }))
            .await
    }

    pub async fn top_apps(&self) -> Result<Vec<AppStats>> {
        self.get(&["api", "apps"], None::<&()>).await
    }

    pub async fn app_category(&self, process_name: &str) -> Result<Category> {
        self.get(&["api", "apps", process_name, "category"], None::<&()>)
            .await
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.get(&["api", "categories"], None::<&()>).await
    }

    pub async fn config(&self) -> Result<ConfigResponse> {
        self.get(&["api", "config"], None::<&()>).await
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| LiveError::InvalidEndpoint {
                url: self.base.to_string(),
                details: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T, Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        let mut request: RequestBuilder = self.http.get(url);
        if let Some(query) = query {
            request = request.query(query);
        }

        debug!(endpoint = %endpoint, "GET");
        let response = request.send().await.map_err(|source| LiveError::Http {
            endpoint: endpoint.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LiveError::HttpStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| LiveError::Http { endpoint, source })
    }
}
