//! Locally persisted activity records
//!
//! Every day-scoped record carries the calendar day it belongs to. Days are
//! stored as `YYYY-MM-DD` text and compared by exact equality.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Storage key for a day
pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Trim a stored day to its `YYYY-MM-DD` prefix.
///
/// Rows written by other tools may carry a time component
/// (`2024-03-01T00:00:00Z`); anything shorter than ten bytes is returned as is.
pub fn normalize_day(raw: &str) -> &str {
    raw.get(..10).unwrap_or(raw)
}

/// Parse a stored day, tolerating a trailing time component
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(normalize_day(raw), DAY_FORMAT).ok()
}

#[derive(Debug, Error)]
#[error("unknown {what}: {value}")]
pub struct ParseKindError {
    what: &'static str,
    value: String,
}

/// A coding span attributed to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    pub day: NaiveDate,
    pub project: String,
    /// Seconds since the epoch
    pub start_time: f64,
    pub duration: f64,
    pub dependencies: Vec<String>,
}

/// An entity-scoped span inside one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDuration {
    pub day: NaiveDate,
    pub project: String,
    pub entity: Option<String>,
    pub branch: Option<String>,
    pub language: Option<String>,
    pub kind: Option<String>,
    pub start_time: f64,
    pub duration: f64,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartBeat {
    pub day: NaiveDate,
    pub entity: String,
    pub kind: String,
    pub category: Option<String>,
    pub time: f64,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub language: Option<String>,
    pub is_write: bool,
    pub machine_id: Option<String>,
    pub lines: Option<i64>,
    pub line_no: Option<i64>,
    pub cursor_pos: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub external_id: String,
    pub name: String,
    pub repository: Option<String>,
    pub badge: Option<String>,
    pub color: Option<String>,
    pub has_public_url: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub first_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub total_seconds: f64,
}

/// Breakdown dimension of a day stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Category,
    Language,
    Editor,
    Os,
    Project,
    Dependency,
    Machine,
}

impl StatKind {
    pub const ALL: [StatKind; 7] = [
        StatKind::Category,
        StatKind::Language,
        StatKind::Editor,
        StatKind::Os,
        StatKind::Project,
        StatKind::Dependency,
        StatKind::Machine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Category => "category",
            StatKind::Language => "language",
            StatKind::Editor => "editor",
            StatKind::Os => "os",
            StatKind::Project => "project",
            StatKind::Dependency => "dependency",
            StatKind::Machine => "machine",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError {
                what: "stat kind",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayStat {
    pub day: NaiveDate,
    pub kind: StatKind,
    pub name: String,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(ParseKindError {
                what: "sync status",
                value: other.to_string(),
            }),
        }
    }
}

/// Audit record of the latest reconciliation of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub day: NaiveDate,
    pub status: SyncStatus,
    pub total_seconds: f64,
    pub synced_at: String,
}
