//! Daily sync driver
//!
//! The loop sleeps until the configured local wall-clock time, syncs
//! yesterday on the blocking pool and goes back to sleep. Triggers run
//! alongside it and queue on the syncer's writer lock.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{last_days, CancelToken, Syncer};
use crate::error::SyncError;
use crate::upstream::Upstream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Local time of the daily run
    pub sync_time: NaiveTime,
    /// Sync yesterday as soon as the scheduler starts
    pub sync_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_time: NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default(),
            sync_on_start: true,
        }
    }
}

/// First occurrence of `at` strictly after `now`
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today
            .checked_add_signed(TimeDelta::days(1))
            .unwrap_or(NaiveDateTime::MAX)
    }
}

pub struct Scheduler<U: Upstream + 'static> {
    syncer: Arc<Syncer<U>>,
    config: ScheduleConfig,
    handle: Handle,
    cancel: CancelToken,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<U: Upstream + 'static> Scheduler<U> {
    pub fn new(syncer: Arc<Syncer<U>>, config: ScheduleConfig, handle: Handle) -> Self {
        Self {
            syncer,
            config,
            handle,
            cancel: CancelToken::new(),
            stop_tx: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the daily loop. Starting twice is an error; a stopped scheduler
    /// may be started again.
    pub fn start(&mut self) -> Result<(), SyncError> {
        if self.task.is_some() {
            return Err(SyncError::Validation("scheduler already started".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = self.handle.spawn(run_loop(
            Arc::clone(&self.syncer),
            self.config,
            self.cancel.clone(),
            stop_rx,
        ));

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        info!(sync_time = %self.config.sync_time, "scheduler started");
        Ok(())
    }

    /// Signal the loop, cancel any in-flight range between days and wait
    /// for the loop to exit.
    ///
    /// Runs started before the call see the cancellation; later triggers get
    /// a fresh token.
    pub async fn stop(&mut self) {
        std::mem::take(&mut self.cancel).cancel();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }

    /// Sync the last `days` days and then the project list without waiting.
    ///
    /// Progress is visible through the sync log.
    pub fn trigger(&self, days: u32) -> Result<JoinHandle<()>, SyncError> {
        if days == 0 {
            return Err(SyncError::Validation("day count must be positive".to_string()));
        }

        let syncer = Arc::clone(&self.syncer);
        let cancel = self.cancel.clone();
        info!(days, "sync triggered");
        Ok(self.handle.spawn_blocking(move || {
            let today = Local::now().date_naive();
            let result = last_days(days, today)
                .and_then(|(start, end)| syncer.sync_date_range_with(start, end, &cancel));
            match result {
                Ok(report) if report.cancelled => {
                    warn!(days, synced = report.synced.len(), "triggered sync cancelled");
                }
                Ok(_) => match syncer.sync_projects() {
                    Ok(projects) => info!(days, projects, "triggered sync finished"),
                    Err(e) => error!(days, error = %e, "triggered project sync failed"),
                },
                Err(e) => error!(days, error = %e, "triggered sync failed"),
            }
        }))
    }
}

async fn run_loop<U: Upstream + 'static>(
    syncer: Arc<Syncer<U>>,
    config: ScheduleConfig,
    cancel: CancelToken,
    mut stop_rx: watch::Receiver<bool>,
) {
    if config.sync_on_start {
        sync_yesterday(&syncer, &cancel).await;
    }

    loop {
        let now = Local::now().naive_local();
        let next = next_run_after(now, config.sync_time);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "waiting for next scheduled sync");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                info!("running scheduled sync");
                sync_yesterday(&syncer, &cancel).await;
            }
            _ = stop_rx.changed() => break,
        }
    }
}

async fn sync_yesterday<U: Upstream + 'static>(syncer: &Arc<Syncer<U>>, cancel: &CancelToken) {
    let syncer = Arc::clone(syncer);
    let cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || {
        let (start, end) = last_days(1, Local::now().date_naive())?;
        syncer.sync_date_range_with(start, end, &cancel)
    })
    .await;

    match result {
        Ok(Ok(report)) if report.cancelled => info!("scheduled sync cancelled"),
        Ok(Ok(report)) if report.failed.is_empty() => {}
        Ok(Ok(report)) => warn!(failed = ?report.failed, "scheduled sync had failures"),
        Ok(Err(e)) => error!(error = %e, "scheduled sync failed"),
        Err(e) => error!(error = %e, "scheduled sync task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        assert_eq!(next_run_after(at(10, 0, 30), time(1, 0)), at(10, 1, 0));
    }

    #[test]
    fn test_next_run_tomorrow_once_passed() {
        assert_eq!(next_run_after(at(10, 8, 0), time(1, 0)), at(11, 1, 0));
    }

    #[test]
    fn test_next_run_exactly_now_moves_to_tomorrow() {
        assert_eq!(next_run_after(at(10, 1, 0), time(1, 0)), at(11, 1, 0));
    }

    #[test]
    fn test_next_run_crosses_month_end() {
        assert_eq!(
            next_run_after(at(29, 23, 59), time(0, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }
}
