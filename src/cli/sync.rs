//! Sync, projects, backfill and daemon commands

use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use std::sync::Arc;

use super::{format_duration, truncate};
use crate::sync::{RangeReport, ScheduleConfig, Scheduler, Syncer};
use crate::upstream::Upstream;

/// What a `sync` invocation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// The last N days ending yesterday
    Days(u32),
    Date(NaiveDate),
    Range(NaiveDate, NaiveDate),
}

pub fn run<U: Upstream>(syncer: &Syncer<U>, target: SyncTarget) -> Result<()> {
    let report = match target {
        SyncTarget::Days(days) => syncer.sync_days(days)?,
        SyncTarget::Range(start, end) => syncer.sync_date_range(start, end)?,
        SyncTarget::Date(day) => {
            syncer
                .sync_day(day)
                .with_context(|| format!("Failed to sync {}", day))?;
            RangeReport {
                synced: vec![day],
                ..RangeReport::default()
            }
        }
    };

    print_report(syncer, &report)
}

/// Sync every day from `start` through yesterday
pub fn backfill<U: Upstream>(syncer: &Syncer<U>, start: NaiveDate) -> Result<()> {
    let yesterday = Local::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .context("Current date is out of range")?;
    if start > yesterday {
        println!("Nothing to backfill: start date {} is not in the past.", start);
        return Ok(());
    }

    println!("Backfilling {} to {}...", start, yesterday);
    let report = syncer.sync_date_range(start, yesterday)?;
    print_report(syncer, &report)
}

/// Refresh the project list from upstream and print it
pub fn projects<U: Upstream>(syncer: &Syncer<U>, query: Option<String>) -> Result<()> {
    let count = syncer.sync_projects()?;
    println!("Synced {} projects.\n", count);

    let projects = syncer.store().projects(query.as_deref())?;
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    println!("{:<30} {:<20} {}", "Name", "Last Heartbeat", "Repository");
    println!("{}", "-".repeat(90));
    for p in projects {
        let last = p
            .last_heartbeat_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:<20} {}",
            truncate(&p.name, 30),
            last,
            p.repository.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Run the daily scheduler until Ctrl-C
pub fn daemon<U: Upstream + 'static>(syncer: Arc<Syncer<U>>, schedule: ScheduleConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let mut scheduler = Scheduler::new(syncer, schedule, runtime.handle().clone());
    scheduler.start()?;

    runtime.block_on(async {
        let signal = tokio::signal::ctrl_c().await;
        scheduler.stop().await;
        signal.context("Failed to listen for Ctrl-C")
    })
}

fn print_report<U: Upstream>(syncer: &Syncer<U>, report: &RangeReport) -> Result<()> {
    let store = syncer.store();
    println!("{:<12} {:<8} {}", "Date", "Status", "Total");
    println!("{}", "-".repeat(32));

    let mut days: Vec<NaiveDate> = report.synced.iter().chain(&report.failed).copied().collect();
    days.sort();
    for day in days {
        match store.sync_entry(day)? {
            Some(entry) => println!(
                "{:<12} {:<8} {}",
                day,
                entry.status,
                format_duration(entry.total_seconds)
            ),
            None => println!("{:<12} {:<8} -", day, "-"),
        }
    }

    if !report.failed.is_empty() {
        println!("\n{} day(s) failed; see the log for details.", report.failed.len());
    }
    if report.cancelled {
        println!("\nCancelled after {} day(s).", report.synced.len() + report.failed.len());
    }
    Ok(())
}
