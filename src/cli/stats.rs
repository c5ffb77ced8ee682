//! Aggregate report commands: stats, daily, years, activity

use anyhow::Result;
use chrono::NaiveDate;

use super::{format_duration, truncate};
use crate::model::StatKind;
use crate::store::{NamedTotal, Store};

pub fn stats(store: &Store, start: NaiveDate, end: NaiveDate, kind: StatKind) -> Result<()> {
    let totals = store.aggregated_stats(start, end, kind)?;
    if totals.is_empty() {
        println!("No {} stats between {} and {}.", kind, start, end);
        return Ok(());
    }

    let grand: f64 = totals.iter().map(|t| t.total_seconds).sum();
    println!("{:<30} {:>10} {:>7}", capitalize(kind.as_str()), "Time", "Share");
    println!("{}", "-".repeat(49));
    for total in &totals {
        println!(
            "{:<30} {:>10} {:>6.1}%",
            truncate(&total.name, 30),
            format_duration(total.total_seconds),
            share(total.total_seconds, grand),
        );
    }
    println!("{}", "-".repeat(49));
    println!("{:<30} {:>10}", "Total", format_duration(grand));
    Ok(())
}

pub fn daily(store: &Store, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let summaries = store.day_summaries(start, end)?;
    if summaries.is_empty() {
        println!("No activity between {} and {}.", start, end);
        return Ok(());
    }

    let projects = store.project_daily_stats(start, end)?;
    println!("{:<12} {:>10}  {}", "Date", "Total", "Projects");
    println!("{}", "-".repeat(70));
    for summary in summaries {
        let day = summary.day.to_string();
        let breakdown: Vec<String> = projects
            .iter()
            .filter(|p| p.day == day)
            .map(|p| format!("{} {}", p.name, format_duration(p.total_seconds)))
            .collect();
        println!(
            "{:<12} {:>10}  {}",
            day,
            format_duration(summary.total_seconds),
            breakdown.join(", ")
        );
    }
    Ok(())
}

pub fn years(store: &Store) -> Result<()> {
    let years = store.available_years()?;
    if years.is_empty() {
        println!("No activity recorded yet.");
        return Ok(());
    }
    for year in years {
        println!("{}", year);
    }
    Ok(())
}

pub fn activity(store: &Store, year: i32) -> Result<()> {
    let days = store.yearly_activity(year)?;
    if days.is_empty() {
        println!("No activity in {}.", year);
        return Ok(());
    }

    let total: f64 = days.iter().map(|d| d.total_seconds).sum();
    println!(
        "{}: {} over {} active days\n",
        year,
        format_duration(total),
        days.len()
    );
    println!("{:<12} {:>10}  {}", "Date", "Total", "Top Project");
    println!("{}", "-".repeat(60));
    for day in &days {
        println!(
            "{:<12} {:>10}  {}",
            day.date,
            format_duration(day.total_seconds),
            top_project(&day.projects).unwrap_or("-"),
        );
    }
    Ok(())
}

// Breakdowns come sorted largest first
fn top_project(projects: &[NamedTotal]) -> Option<&str> {
    projects.first().map(|p| p.name.as_str())
}

fn share(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
