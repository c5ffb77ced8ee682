//! WakaTime HTTP client
//!
//! Endpoints: /users/current/{summaries, durations, heartbeats, projects}.
//! Auth is HTTP Basic with the base64-encoded API key.

use base64::prelude::*;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

use super::{DataEnvelope, DurationData, HeartbeatData, ProjectData, SummaryDay, Upstream};
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::model::day_key;

pub const DEFAULT_BASE_URL: &str = "https://wakatime.com/api/v1";

// Heartbeat days can be large
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

pub struct WakaTimeClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl WakaTimeClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        if api_key.trim().is_empty() {
            return Err(UpstreamError::Config("api key is not set".to_string()));
        }

        let mut config = ureq::config::Config::builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false);

        // "false" disables the proxy explicitly
        if let Some(proxy_url) = proxy_url.filter(|p| !p.is_empty() && *p != "false") {
            let proxy = ureq::Proxy::new(proxy_url).map_err(|e| {
                UpstreamError::Config(format!("invalid proxy url '{}': {}", proxy_url, e))
            })?;
            config = config.proxy(Some(proxy));
        }

        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        Ok(Self {
            agent: ureq::Agent::new_with_config(config.build()),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {}", BASE64_STANDARD.encode(api_key)),
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Self::new(
            &config.api_key,
            &config.base_url,
            config.proxy_url.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let transport = |e: ureq::Error| UpstreamError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };

        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json");
        for (key, value) in query {
            request = request.query(*key, *value);
        }

        debug!(endpoint, ?query, "upstream request");
        let mut response = request.call().map_err(transport)?;
        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(transport)?;

        if !status.is_success() {
            error!(endpoint, status = status.as_u16(), body = %body, "upstream api error");
            return Err(UpstreamError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| UpstreamError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl Upstream for WakaTimeClient {
    fn summary(&self, day: NaiveDate) -> Result<Option<SummaryDay>, UpstreamError> {
        let date = day_key(day);
        let resp: DataEnvelope<SummaryDay> = self.get(
            "/users/current/summaries",
            &[("start", date.as_str()), ("end", date.as_str())],
        )?;
        Ok(resp.data.into_iter().next())
    }

    fn durations(&self, day: NaiveDate) -> Result<Vec<DurationData>, UpstreamError> {
        let date = day_key(day);
        let resp: DataEnvelope<DurationData> =
            self.get("/users/current/durations", &[("date", date.as_str())])?;
        Ok(resp.data)
    }

    fn project_durations(
        &self,
        day: NaiveDate,
        project: &str,
    ) -> Result<Vec<DurationData>, UpstreamError> {
        let date = day_key(day);
        let resp: DataEnvelope<DurationData> = self.get(
            "/users/current/durations",
            &[
                ("date", date.as_str()),
                ("project", project),
                ("slice_by", "entity"),
            ],
        )?;
        Ok(resp.data)
    }

    fn heartbeats(&self, day: NaiveDate) -> Result<Vec<HeartbeatData>, UpstreamError> {
        let date = day_key(day);
        let resp: DataEnvelope<HeartbeatData> =
            self.get("/users/current/heartbeats", &[("date", date.as_str())])?;
        Ok(resp.data)
    }

    fn projects(&self, query: Option<&str>) -> Result<Vec<ProjectData>, UpstreamError> {
        let params: Vec<(&str, &str)> = query
            .filter(|q| !q.is_empty())
            .map(|q| vec![("q", q)])
            .unwrap_or_default();
        let resp: DataEnvelope<ProjectData> = self.get("/users/current/projects", &params)?;
        Ok(resp.data)
    }
}
