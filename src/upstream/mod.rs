//! Upstream metering service: client trait and wire types
//!
//! The syncer only talks to the service through [`Upstream`], so tests can
//! script responses and failures without a network.

mod wakatime;

pub use wakatime::{WakaTimeClient, DEFAULT_BASE_URL};

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::UpstreamError;

/// `{"data": [...]}` envelope used by every list endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// One day of the summaries endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummaryDay {
    pub grand_total: GrandTotal,
    pub categories: Vec<SummaryItem>,
    pub languages: Vec<SummaryItem>,
    pub editors: Vec<SummaryItem>,
    pub operating_systems: Vec<SummaryItem>,
    pub projects: Vec<SummaryItem>,
    pub dependencies: Vec<SummaryItem>,
    pub machines: Vec<MachineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GrandTotal {
    pub total_seconds: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummaryItem {
    pub name: String,
    pub total_seconds: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachineItem {
    pub name: String,
    pub machine_name_id: String,
    pub total_seconds: f64,
}

/// A duration, either day-wide or sliced by entity within one project
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DurationData {
    pub project: String,
    pub time: f64,
    pub duration: f64,
    pub entity: Option<String>,
    pub branch: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "nullable_list")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatData {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    pub time: f64,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub language: Option<String>,
    pub is_write: bool,
    pub machine_name_id: Option<String>,
    pub lines: Option<i64>,
    pub lineno: Option<i64>,
    pub cursorpos: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectData {
    pub id: String,
    pub name: String,
    pub repository: Option<String>,
    pub badge: Option<String>,
    pub color: Option<String>,
    pub has_public_url: bool,
    pub last_heartbeat_at: Option<String>,
    pub first_heartbeat_at: Option<String>,
}

// The API sends `"dependencies": null` for spans without any
fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Synchronous access to the metering service
///
/// Every call is bounded by the implementation's timeout; a timeout is
/// reported like any other failure.
pub trait Upstream: Send + Sync {
    /// Summary of one day, `None` when the service has no data for it
    fn summary(&self, day: NaiveDate) -> Result<Option<SummaryDay>, UpstreamError>;

    /// Day-wide durations
    fn durations(&self, day: NaiveDate) -> Result<Vec<DurationData>, UpstreamError>;

    /// Durations of one project sliced by entity
    fn project_durations(
        &self,
        day: NaiveDate,
        project: &str,
    ) -> Result<Vec<DurationData>, UpstreamError>;

    fn heartbeats(&self, day: NaiveDate) -> Result<Vec<HeartbeatData>, UpstreamError>;

    /// All projects, optionally filtered by a name query
    fn projects(&self, query: Option<&str>) -> Result<Vec<ProjectData>, UpstreamError>;
}

impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    fn summary(&self, day: NaiveDate) -> Result<Option<SummaryDay>, UpstreamError> {
        (**self).summary(day)
    }

    fn durations(&self, day: NaiveDate) -> Result<Vec<DurationData>, UpstreamError> {
        (**self).durations(day)
    }

    fn project_durations(
        &self,
        day: NaiveDate,
        project: &str,
    ) -> Result<Vec<DurationData>, UpstreamError> {
        (**self).project_durations(day, project)
    }

    fn heartbeats(&self, day: NaiveDate) -> Result<Vec<HeartbeatData>, UpstreamError> {
        (**self).heartbeats(day)
    }

    fn projects(&self, query: Option<&str>) -> Result<Vec<ProjectData>, UpstreamError> {
        (**self).projects(query)
    }
}
