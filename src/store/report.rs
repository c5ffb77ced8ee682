//! Read-side aggregation over the derived day tables

use chrono::NaiveDate;
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Result, Store};
use crate::model::{day_key, normalize_day, StatKind};

/// A name with its summed time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedTotal {
    pub name: String,
    pub total_seconds: f64,
}

/// One project's time on one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDayTotal {
    pub day: String,
    pub name: String,
    pub total_seconds: f64,
}

/// A day of the activity calendar with its project breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDay {
    pub date: String,
    pub total_seconds: f64,
    pub projects: Vec<NamedTotal>,
}

impl Store {
    /// Sum of one stat kind per name across `[start, end]`, largest first
    pub fn aggregated_stats(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        kind: StatKind,
    ) -> Result<Vec<NamedTotal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT name, SUM(total_seconds) AS total
               FROM day_stats
               WHERE day >= ? AND day <= ? AND type = ?
               GROUP BY name
               ORDER BY total DESC, name"#,
        )?;

        let rows = stmt.query_map(
            params![day_key(start), day_key(end), kind.as_str()],
            |row| {
                Ok(NamedTotal {
                    name: row.get(0)?,
                    total_seconds: row.get(1)?,
                })
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Per-day project breakdown across `[start, end]`, by day then time
    pub fn project_daily_stats(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProjectDayTotal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT day, name, total_seconds
               FROM day_stats
               WHERE day >= ? AND day <= ? AND type = 'project'
               ORDER BY day, total_seconds DESC"#,
        )?;

        let rows = stmt.query_map(params![day_key(start), day_key(end)], |row| {
            let day: String = row.get(0)?;
            Ok(ProjectDayTotal {
                day: normalize_day(&day).to_string(),
                name: row.get(1)?,
                total_seconds: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Distinct years with a day summary, newest first
    pub fn available_years(&self) -> Result<Vec<i32>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT CAST(substr(day, 1, 4) AS INTEGER) AS year
               FROM day_summaries
               ORDER BY year DESC"#,
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, i32>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Daily totals of a whole year merged with each day's project breakdown.
    ///
    /// Both queries are keyed by the normalized `YYYY-MM-DD` form of the stored
    /// day so rows carrying a time suffix still line up.
    pub fn yearly_activity(&self, year: i32) -> Result<Vec<ActivityDay>> {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Ok(Vec::new());
        };
        let (start, end) = (day_key(first), day_key(last));

        let conn = self.conn()?;
        let mut days: BTreeMap<String, ActivityDay> = BTreeMap::new();

        let mut stmt = conn.prepare(
            r#"SELECT day, total_seconds
               FROM day_summaries
               WHERE substr(day, 1, 10) BETWEEN ?1 AND ?2"#,
        )?;
        let totals = stmt.query_map(params![start, end], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for total in totals {
            let (day, total_seconds) = total?;
            let date = normalize_day(&day).to_string();
            days.insert(
                date.clone(),
                ActivityDay {
                    date,
                    total_seconds,
                    projects: Vec::new(),
                },
            );
        }

        let mut stmt = conn.prepare(
            r#"SELECT day, name, total_seconds
               FROM day_stats
               WHERE substr(day, 1, 10) BETWEEN ?1 AND ?2 AND type = 'project'
               ORDER BY day, total_seconds DESC"#,
        )?;
        let projects = stmt.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        for project in projects {
            let (day, name, total_seconds) = project?;
            // Breakdowns without a summary row are dropped
            if let Some(entry) = days.get_mut(normalize_day(&day)) {
                entry.projects.push(NamedTotal {
                    name,
                    total_seconds,
                });
            }
        }

        Ok(days.into_values().collect())
    }
}
