//! Shared fixtures: a scripted in-memory upstream and record builders.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wakasync::error::UpstreamError;
use wakasync::store::Store;
use wakasync::sync::{CancelToken, Syncer};
use wakasync::upstream::{
    DurationData, GrandTotal, HeartbeatData, ProjectData, SummaryDay, SummaryItem, Upstream,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Call keys double as failure keys: `summary 2024-01-15`,
/// `project_durations 2024-01-15 alpha`, `projects`.
#[derive(Default)]
struct Script {
    summaries: HashMap<NaiveDate, SummaryDay>,
    durations: HashMap<NaiveDate, Vec<DurationData>>,
    project_durations: HashMap<(NaiveDate, String), Vec<DurationData>>,
    heartbeats: HashMap<NaiveDate, Vec<HeartbeatData>>,
    projects: Vec<ProjectData>,
    failing: HashSet<String>,
    calls: Vec<String>,
    summary_delay: Option<Duration>,
    cancel_after_summary: Option<(NaiveDate, CancelToken)>,
}

#[derive(Default)]
pub struct FakeUpstream {
    script: Mutex<Script>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.script.lock().unwrap())
    }

    pub fn set_summary(&self, on: NaiveDate, summary: SummaryDay) {
        self.with(|s| s.summaries.insert(on, summary));
    }

    pub fn set_durations(&self, on: NaiveDate, rows: Vec<DurationData>) {
        self.with(|s| s.durations.insert(on, rows));
    }

    pub fn set_project_durations(&self, on: NaiveDate, project: &str, rows: Vec<DurationData>) {
        self.with(|s| s.project_durations.insert((on, project.to_string()), rows));
    }

    pub fn set_heartbeats(&self, on: NaiveDate, rows: Vec<HeartbeatData>) {
        self.with(|s| s.heartbeats.insert(on, rows));
    }

    pub fn set_projects(&self, rows: Vec<ProjectData>) {
        self.with(|s| s.projects = rows);
    }

    pub fn fail(&self, key: &str) {
        self.with(|s| s.failing.insert(key.to_string()));
    }

    pub fn recover(&self, key: &str) {
        self.with(|s| s.failing.remove(key));
    }

    /// Block every summary call for `delay`
    pub fn slow_summaries(&self, delay: Duration) {
        self.with(|s| s.summary_delay = Some(delay));
    }

    /// Cancel `token` while the summary of `on` is being fetched
    pub fn cancel_during(&self, on: NaiveDate, token: CancelToken) {
        self.with(|s| s.cancel_after_summary = Some((on, token)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    fn record(&self, key: String) -> Result<(), UpstreamError> {
        self.with(|s| {
            s.calls.push(key.clone());
            if s.failing.contains(&key) {
                Err(UpstreamError::Status {
                    endpoint: key,
                    status: 500,
                    body: "scripted failure".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }
}

impl Upstream for FakeUpstream {
    fn summary(&self, on: NaiveDate) -> Result<Option<SummaryDay>, UpstreamError> {
        if let Some(delay) = self.with(|s| s.summary_delay) {
            std::thread::sleep(delay);
        }
        self.with(|s| {
            if let Some((when, token)) = &s.cancel_after_summary {
                if *when == on {
                    token.cancel();
                }
            }
        });
        self.record(format!("summary {}", on))?;
        Ok(self.with(|s| s.summaries.get(&on).cloned()))
    }

    fn durations(&self, on: NaiveDate) -> Result<Vec<DurationData>, UpstreamError> {
        self.record(format!("durations {}", on))?;
        Ok(self.with(|s| s.durations.get(&on).cloned().unwrap_or_default()))
    }

    fn project_durations(
        &self,
        on: NaiveDate,
        project: &str,
    ) -> Result<Vec<DurationData>, UpstreamError> {
        self.record(format!("project_durations {} {}", on, project))?;
        Ok(self.with(|s| {
            s.project_durations
                .get(&(on, project.to_string()))
                .cloned()
                .unwrap_or_default()
        }))
    }

    fn heartbeats(&self, on: NaiveDate) -> Result<Vec<HeartbeatData>, UpstreamError> {
        self.record(format!("heartbeats {}", on))?;
        Ok(self.with(|s| s.heartbeats.get(&on).cloned().unwrap_or_default()))
    }

    fn projects(&self, _query: Option<&str>) -> Result<Vec<ProjectData>, UpstreamError> {
        self.record("projects".to_string())?;
        Ok(self.with(|s| s.projects.clone()))
    }
}

pub fn syncer() -> (Arc<FakeUpstream>, Syncer<Arc<FakeUpstream>>) {
    let upstream = FakeUpstream::new();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let syncer = Syncer::new(store, Arc::clone(&upstream));
    (upstream, syncer)
}

// ============================================
// BUILDERS
// ============================================

pub fn summary(total: f64, languages: &[(&str, f64)]) -> SummaryDay {
    SummaryDay {
        grand_total: GrandTotal {
            total_seconds: total,
            text: String::new(),
        },
        languages: languages
            .iter()
            .map(|(name, secs)| SummaryItem {
                name: name.to_string(),
                total_seconds: *secs,
                percent: 0.0,
            })
            .collect(),
        ..SummaryDay::default()
    }
}

pub fn duration(project: &str, time: f64, secs: f64) -> DurationData {
    DurationData {
        project: project.to_string(),
        time,
        duration: secs,
        ..DurationData::default()
    }
}

/// Entity-sliced span as returned by the per-project endpoint
pub fn entity_span(entity: &str, time: f64, secs: f64) -> DurationData {
    DurationData {
        entity: Some(entity.to_string()),
        kind: Some("file".to_string()),
        language: Some("Go".to_string()),
        time,
        duration: secs,
        ..DurationData::default()
    }
}

pub fn heartbeats(count: usize) -> Vec<HeartbeatData> {
    (0..count)
        .map(|i| HeartbeatData {
            entity: format!("src/file_{}.go", i),
            kind: "file".to_string(),
            category: Some("coding".to_string()),
            time: 1_700_000_000.0 + i as f64,
            project: Some("alpha".to_string()),
            language: Some("Go".to_string()),
            is_write: i % 2 == 0,
            lineno: Some(i as i64),
            ..HeartbeatData::default()
        })
        .collect()
}

pub fn project(id: &str, name: &str) -> ProjectData {
    ProjectData {
        id: id.to_string(),
        name: name.to_string(),
        ..ProjectData::default()
    }
}
