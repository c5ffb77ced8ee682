//! Status command implementation

use anyhow::Result;
use chrono::NaiveDate;

use super::format_duration;
use crate::model::StatKind;
use crate::store::Store;

pub fn run(store: &Store, date: Option<NaiveDate>) -> Result<()> {
    let Some(day) = date.or(store.last_synced_day()?) else {
        println!("Nothing synced yet. Run 'wakasync sync' first.");
        return Ok(());
    };

    println!("Day:          {}", day);
    match store.sync_entry(day)? {
        Some(entry) => {
            println!("Last sync:    {} ({})", entry.synced_at, entry.status);
        }
        None => println!("Last sync:    never"),
    }

    let total = store
        .day_summary(day)?
        .map(|s| format_duration(s.total_seconds))
        .unwrap_or_else(|| "-".to_string());
    println!("Total:        {}", total);
    println!("Durations:    {}", store.count_durations(day)?);
    println!("Heartbeats:   {}", store.count_heartbeats(day)?);

    for kind in [StatKind::Project, StatKind::Language, StatKind::Editor] {
        let stats = store.day_stats(day, kind)?;
        if stats.is_empty() {
            continue;
        }
        println!("\n{}:", kind);
        for stat in stats.iter().take(5) {
            println!("  {:<30} {}", stat.name, format_duration(stat.total_seconds));
        }
    }

    Ok(())
}
