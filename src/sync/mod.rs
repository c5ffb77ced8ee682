//! Reconciliation of upstream activity into the local store
//!
//! A day is synced in three steps: summary (fatal on failure), durations and
//! heartbeats (upstream failures are logged and skipped). The outcome of each
//! day lands in the sync log.

pub mod scheduler;

pub use scheduler::{next_run_after, ScheduleConfig, Scheduler};

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::model::{
    DayStat, Duration, HeartBeat, Project, ProjectDuration, StatKind, SyncStatus, DAY_FORMAT,
};
use crate::store::Store;
use crate::upstream::{
    DurationData, HeartbeatData, ProjectData, SummaryDay, SummaryItem, Upstream,
};

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Shared stop flag for range syncs, checked between days
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a multi-day sync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeReport {
    pub synced: Vec<NaiveDate>,
    pub failed: Vec<NaiveDate>,
    /// The run stopped early on its cancel token
    pub cancelled: bool,
}

/// Parse a `YYYY-MM-DD` day argument
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT)
        .map_err(|e| SyncError::Validation(format!("invalid date '{}': {}", raw, e)))
}

/// The `days` calendar days ending the day before `today`
pub fn last_days(days: u32, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    if days == 0 {
        return Err(SyncError::Validation("day count must be positive".to_string()));
    }
    let out_of_range = || SyncError::Validation(format!("{} days before {} is out of range", days, today));
    let end = today.checked_sub_days(Days::new(1)).ok_or_else(out_of_range)?;
    let start = end
        .checked_sub_days(Days::new(u64::from(days - 1)))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Drives reconciliation against one store.
///
/// Every public sync operation holds the store's writer lock for its whole
/// run, so concurrent callers queue instead of interleaving, even across
/// syncers sharing the store.
pub struct Syncer<U: Upstream> {
    store: Arc<Store>,
    upstream: U,
}

impl<U: Upstream> Syncer<U> {
    pub fn new(store: Arc<Store>, upstream: U) -> Self {
        Self { store, upstream }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.store.writer()
    }

    // ============================================
    // SINGLE DAY
    // ============================================

    /// Reconcile one day and record the outcome in the sync log
    pub fn sync_day(&self, day: NaiveDate) -> Result<()> {
        let _guard = self.lock();
        self.sync_day_locked(day)
    }

    pub fn sync_summary(&self, day: NaiveDate) -> Result<f64> {
        let _guard = self.lock();
        self.summary_step(day)
    }

    pub fn sync_durations(&self, day: NaiveDate) -> Result<()> {
        let _guard = self.lock();
        self.durations_step(day)
    }

    pub fn sync_heartbeats(&self, day: NaiveDate) -> Result<()> {
        let _guard = self.lock();
        self.heartbeats_step(day)
    }

    fn sync_day_locked(&self, day: NaiveDate) -> Result<()> {
        info!(date = %day, "syncing day");

        let total_seconds = match self.summary_step(day) {
            Ok(total) => total,
            Err(e) => {
                error!(date = %day, error = %e, "summary sync failed");
                self.record_failure(day);
                return Err(e);
            }
        };

        let secondary: [(&str, fn(&Self, NaiveDate) -> Result<()>); 2] = [
            ("durations", Self::durations_step),
            ("heartbeats", Self::heartbeats_step),
        ];
        for (step, run) in secondary {
            match run(self, day) {
                Ok(()) => {}
                Err(e) if e.is_upstream() => {
                    warn!(date = %day, step, error = %e, "skipping step after upstream failure");
                }
                Err(e) => {
                    error!(date = %day, step, error = %e, "persisting day failed");
                    self.record_failure(day);
                    return Err(e);
                }
            }
        }

        self.store
            .record_sync(day, total_seconds, SyncStatus::Success)?;
        info!(date = %day, total_seconds, "day synced");
        Ok(())
    }

    fn record_failure(&self, day: NaiveDate) {
        if let Err(e) = self.store.record_sync(day, 0.0, SyncStatus::Failed) {
            error!(date = %day, error = %e, "failed to record sync failure");
        }
    }

    fn summary_step(&self, day: NaiveDate) -> Result<f64> {
        let Some(summary) = self.upstream.summary(day)? else {
            info!(date = %day, "no summary upstream");
            return Ok(0.0);
        };
        let total_seconds = summary.grand_total.total_seconds;

        if let Some(stored) = self.store.day_summary(day)? {
            if stored.total_seconds == total_seconds {
                info!(date = %day, total_seconds, "summary unchanged");
                return Ok(total_seconds);
            }
        }

        let stats = stat_rows(day, &summary);
        self.store.replace_day_summary(day, total_seconds, &stats)?;
        info!(date = %day, total_seconds, stats = stats.len(), "synced summary");
        Ok(total_seconds)
    }

    fn durations_step(&self, day: NaiveDate) -> Result<()> {
        let remote = self.upstream.durations(day)?;
        let stored = self.store.count_durations(day)?;
        if remote.len() <= stored {
            info!(date = %day, remote = remote.len(), stored, "durations up to date");
            return Ok(());
        }

        let rows: Vec<Duration> = remote.iter().map(|d| duration_row(day, d)).collect();
        self.store.replace_durations(day, &rows)?;
        info!(date = %day, count = rows.len(), "synced durations");

        let projects: BTreeSet<&str> = remote
            .iter()
            .map(|d| d.project.as_str())
            .filter(|p| !p.is_empty())
            .collect();

        let mut detail = Vec::new();
        for project in projects {
            match self.upstream.project_durations(day, project) {
                Ok(spans) => {
                    detail.extend(spans.iter().map(|d| project_duration_row(day, project, d)));
                }
                Err(e) => {
                    warn!(date = %day, project, error = %e, "skipping project durations");
                }
            }
        }

        if !detail.is_empty() {
            self.store.replace_project_durations(day, &detail)?;
            info!(date = %day, count = detail.len(), "synced project durations");
        }
        Ok(())
    }

    fn heartbeats_step(&self, day: NaiveDate) -> Result<()> {
        let remote = self.upstream.heartbeats(day)?;
        let stored = self.store.count_heartbeats(day)?;
        if remote.len() <= stored {
            info!(date = %day, remote = remote.len(), stored, "heartbeats up to date");
            return Ok(());
        }

        let rows: Vec<HeartBeat> = remote.iter().map(|h| heartbeat_row(day, h)).collect();
        self.store.replace_heartbeats(day, &rows)?;
        info!(date = %day, count = rows.len(), "synced heartbeats");
        Ok(())
    }

    // ============================================
    // RANGES
    // ============================================

    /// Sync the `days` days ending yesterday (local time)
    pub fn sync_days(&self, days: u32) -> Result<RangeReport> {
        self.sync_days_before(days, Local::now().date_naive())
    }

    /// Sync the `days` days ending the day before `today`
    pub fn sync_days_before(&self, days: u32, today: NaiveDate) -> Result<RangeReport> {
        let (start, end) = last_days(days, today)?;
        self.sync_date_range(start, end)
    }

    pub fn sync_yesterday(&self) -> Result<RangeReport> {
        self.sync_days(1)
    }

    pub fn sync_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeReport> {
        self.sync_date_range_with(start, end, &CancelToken::new())
    }

    /// Sync every day of `[start, end]`, oldest first.
    ///
    /// A failing day is logged and the loop moves on. `cancel` is checked
    /// before each day; a cancelled run stops there and returns the days done
    /// so far with `cancelled` set.
    pub fn sync_date_range_with(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<RangeReport> {
        if start > end {
            return Err(SyncError::Validation(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        let _guard = self.lock();
        info!(start = %start, end = %end, "syncing date range");

        let mut report = RangeReport::default();
        for day in start.iter_days().take_while(|d| *d <= end) {
            if cancel.is_cancelled() {
                warn!(date = %day, synced = report.synced.len(), "range sync cancelled");
                report.cancelled = true;
                return Ok(report);
            }
            match self.sync_day_locked(day) {
                Ok(()) => report.synced.push(day),
                Err(e) => {
                    error!(date = %day, error = %e, "day failed, continuing");
                    report.failed.push(day);
                }
            }
        }

        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "date range finished"
        );
        Ok(report)
    }

    // ============================================
    // PROJECTS
    // ============================================

    /// Fetch every upstream project and overwrite the local copy
    pub fn sync_projects(&self) -> Result<usize> {
        let _guard = self.lock();
        let remote = self.upstream.projects(None)?;
        for data in &remote {
            self.store.upsert_project(&project_row(data))?;
        }
        info!(count = remote.len(), "synced projects");
        Ok(remote.len())
    }
}

// ============================================
// WIRE TO ROW CONVERSIONS
// ============================================

fn stat_rows(day: NaiveDate, summary: &SummaryDay) -> Vec<DayStat> {
    let named = |kind: StatKind, items: &[SummaryItem]| -> Vec<DayStat> {
        items
            .iter()
            .map(|item| DayStat {
                day,
                kind,
                name: item.name.clone(),
                total_seconds: item.total_seconds,
            })
            .collect()
    };

    let mut rows = Vec::new();
    rows.extend(named(StatKind::Category, &summary.categories));
    rows.extend(named(StatKind::Language, &summary.languages));
    rows.extend(named(StatKind::Editor, &summary.editors));
    rows.extend(named(StatKind::Os, &summary.operating_systems));
    rows.extend(named(StatKind::Project, &summary.projects));
    rows.extend(named(StatKind::Dependency, &summary.dependencies));
    rows.extend(summary.machines.iter().map(|machine| DayStat {
        day,
        kind: StatKind::Machine,
        name: machine.name.clone(),
        total_seconds: machine.total_seconds,
    }));
    rows
}

fn duration_row(day: NaiveDate, data: &DurationData) -> Duration {
    Duration {
        day,
        project: data.project.clone(),
        start_time: data.time,
        duration: data.duration,
        dependencies: data.dependencies.clone(),
    }
}

// Sliced responses may omit the project, so the requested name is used
fn project_duration_row(day: NaiveDate, project: &str, data: &DurationData) -> ProjectDuration {
    ProjectDuration {
        day,
        project: project.to_string(),
        entity: data.entity.clone(),
        branch: data.branch.clone(),
        language: data.language.clone(),
        kind: data.kind.clone(),
        start_time: data.time,
        duration: data.duration,
        dependencies: data.dependencies.clone(),
    }
}

fn heartbeat_row(day: NaiveDate, data: &HeartbeatData) -> HeartBeat {
    HeartBeat {
        day,
        entity: data.entity.clone(),
        kind: data.kind.clone(),
        category: data.category.clone(),
        time: data.time,
        project: data.project.clone(),
        branch: data.branch.clone(),
        language: data.language.clone(),
        is_write: data.is_write,
        machine_id: data.machine_name_id.clone(),
        lines: data.lines,
        line_no: data.lineno,
        cursor_pos: data.cursorpos,
    }
}

fn project_row(data: &ProjectData) -> Project {
    Project {
        external_id: data.id.clone(),
        name: data.name.clone(),
        repository: data.repository.clone(),
        badge: data.badge.clone(),
        color: data.color.clone(),
        has_public_url: data.has_public_url,
        last_heartbeat_at: parse_instant(data.last_heartbeat_at.as_deref()),
        first_heartbeat_at: parse_instant(data.first_heartbeat_at.as_deref()),
    }
}

fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = raw, error = %e, "ignoring unparseable timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{GrandTotal, MachineItem};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_last_days_ends_yesterday() {
        let today = day(2024, 3, 1);
        assert_eq!(last_days(1, today).unwrap(), (day(2024, 2, 29), day(2024, 2, 29)));
        assert_eq!(last_days(7, today).unwrap(), (day(2024, 2, 23), day(2024, 2, 29)));
    }

    #[test]
    fn test_zero_days_is_rejected() {
        assert!(matches!(
            last_days(0, day(2024, 3, 1)),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(" 2024-01-15 ").unwrap(), day(2024, 1, 15));
        assert!(matches!(parse_date("2024-13-01"), Err(SyncError::Validation(_))));
        assert!(matches!(parse_date("yesterday"), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_stat_rows_cover_every_kind() {
        let item = |name: &str, total: f64| SummaryItem {
            name: name.to_string(),
            total_seconds: total,
            percent: 0.0,
        };
        let summary = SummaryDay {
            grand_total: GrandTotal {
                total_seconds: 60.0,
                text: String::new(),
            },
            categories: vec![item("coding", 60.0)],
            languages: vec![item("Rust", 40.0), item("Go", 20.0)],
            editors: vec![item("vim", 60.0)],
            operating_systems: vec![item("Linux", 60.0)],
            projects: vec![item("alpha", 60.0)],
            dependencies: vec![item("serde", 5.0)],
            machines: vec![MachineItem {
                name: "laptop".to_string(),
                machine_name_id: "m-1".to_string(),
                total_seconds: 60.0,
            }],
        };

        let rows = stat_rows(day(2024, 1, 1), &summary);
        assert_eq!(rows.len(), 8);
        let kinds: BTreeSet<StatKind> = rows.iter().map(|r| r.kind).collect();
        assert_eq!(kinds.len(), StatKind::ALL.len());
        let machine = rows.iter().find(|r| r.kind == StatKind::Machine).unwrap();
        assert_eq!(machine.name, "laptop");
    }

    #[test]
    fn test_project_row_tolerates_bad_timestamps() {
        let data = ProjectData {
            id: "p-1".to_string(),
            name: "alpha".to_string(),
            last_heartbeat_at: Some("2024-05-01T10:00:00Z".to_string()),
            first_heartbeat_at: Some("last tuesday".to_string()),
            ..ProjectData::default()
        };
        let project = project_row(&data);
        assert!(project.last_heartbeat_at.is_some());
        assert!(project.first_heartbeat_at.is_none());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
