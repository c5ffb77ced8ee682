//! Local store with SQLite
//!
//! - Day-scoped tables (durations, project durations, heartbeats, day stats)
//!   are only rewritten through the `replace_*` methods, which delete and
//!   re-insert one day inside a single transaction
//! - Day summaries, projects and the sync log are upserted
//! - Read-side aggregation lives in `report`

mod report;
mod schema;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use crate::error::StoreError;
use crate::model::{
    day_key, parse_day, DayStat, DaySummary, Duration, HeartBeat, Project, ProjectDuration,
    StatKind, SyncEntry, SyncStatus,
};

pub use report::{ActivityDay, NamedTotal, ProjectDayTotal};
pub use schema::SCHEMA;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Single-connection store; the connection mutex makes it shareable across
/// the scheduler and readers.
///
/// `writer` serializes whole sync runs against this store, independent of
/// how many syncers share it.
pub struct Store {
    conn: Mutex<Connection>,
    writer: Mutex<()>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            writer: Mutex::new(()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Exclusive right to run a sync against this store. Not reentrant.
    ///
    /// Every write behind it is transactional, so a poisoned lock is taken over.
    pub fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // DURATIONS
    // ============================================

    /// Replace every duration of `day` with `rows`
    pub fn replace_durations(&self, day: NaiveDate, rows: &[Duration]) -> Result<()> {
        let key = day_key(day);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM durations WHERE day = ?", params![key])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO durations (day, project, start_time, duration, dependencies)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for d in rows {
                stmt.execute(params![
                    key,
                    d.project,
                    d.start_time,
                    d.duration,
                    encode_dependencies(&d.dependencies)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn count_durations(&self, day: NaiveDate) -> Result<usize> {
        self.count_by_day("durations", day)
    }

    pub fn durations(&self, day: NaiveDate) -> Result<Vec<Duration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, project, start_time, duration, dependencies
             FROM durations WHERE day = ? ORDER BY start_time",
        )?;

        let rows = stmt.query_map(params![day_key(day)], |row| {
            Ok(Duration {
                day: day_column(row, 0)?,
                project: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                start_time: row.get(2)?,
                duration: row.get(3)?,
                dependencies: dependencies_column(row, 4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // PROJECT DURATIONS
    // ============================================

    /// Replace every project-level duration of `day` with `rows`
    pub fn replace_project_durations(&self, day: NaiveDate, rows: &[ProjectDuration]) -> Result<()> {
        let key = day_key(day);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM project_durations WHERE day = ?", params![key])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO project_durations
                 (day, project, branch, entity, language, type, start_time, duration, dependencies)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for d in rows {
                stmt.execute(params![
                    key,
                    d.project,
                    d.branch,
                    d.entity,
                    d.language,
                    d.kind,
                    d.start_time,
                    d.duration,
                    encode_dependencies(&d.dependencies)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Project-level durations of a day, optionally narrowed to one project
    pub fn project_durations(
        &self,
        day: NaiveDate,
        project: Option<&str>,
    ) -> Result<Vec<ProjectDuration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, project, branch, entity, language, type, start_time, duration, dependencies
             FROM project_durations
             WHERE day = ?1 AND (?2 IS NULL OR project = ?2)
             ORDER BY start_time",
        )?;

        let rows = stmt.query_map(params![day_key(day), project], |row| {
            Ok(ProjectDuration {
                day: day_column(row, 0)?,
                project: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                branch: row.get(2)?,
                entity: row.get(3)?,
                language: row.get(4)?,
                kind: row.get(5)?,
                start_time: row.get(6)?,
                duration: row.get(7)?,
                dependencies: dependencies_column(row, 8)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // HEARTBEATS
    // ============================================

    /// Replace every heartbeat of `day` with `rows`
    pub fn replace_heartbeats(&self, day: NaiveDate, rows: &[HeartBeat]) -> Result<()> {
        let key = day_key(day);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM heartbeats WHERE day = ?", params![key])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO heartbeats
                 (day, entity, type, category, time, project, branch, language,
                  is_write, machine_id, lines, line_no, cursor_pos)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for h in rows {
                stmt.execute(params![
                    key,
                    h.entity,
                    h.kind,
                    h.category,
                    h.time,
                    h.project,
                    h.branch,
                    h.language,
                    h.is_write,
                    h.machine_id,
                    h.lines,
                    h.line_no,
                    h.cursor_pos,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn count_heartbeats(&self, day: NaiveDate) -> Result<usize> {
        self.count_by_day("heartbeats", day)
    }

    pub fn heartbeats(&self, day: NaiveDate) -> Result<Vec<HeartBeat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, entity, type, category, time, project, branch, language,
                    is_write, machine_id, lines, line_no, cursor_pos
             FROM heartbeats WHERE day = ? ORDER BY time",
        )?;

        let rows = stmt.query_map(params![day_key(day)], |row| {
            Ok(HeartBeat {
                day: day_column(row, 0)?,
                entity: row.get(1)?,
                kind: row.get(2)?,
                category: row.get(3)?,
                time: row.get(4)?,
                project: row.get(5)?,
                branch: row.get(6)?,
                language: row.get(7)?,
                is_write: row.get(8)?,
                machine_id: row.get(9)?,
                lines: row.get(10)?,
                line_no: row.get(11)?,
                cursor_pos: row.get(12)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // `table` is always one of our own literals
    fn count_by_day(&self, table: &str, day: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE day = ?", table),
            params![day_key(day)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ============================================
    // DAY SUMMARIES & STATS
    // ============================================

    pub fn upsert_day_summary(&self, day: NaiveDate, total_seconds: f64) -> Result<()> {
        let conn = self.conn()?;
        upsert_day_summary_in(&conn, &day_key(day), total_seconds)?;
        Ok(())
    }

    /// Replace every stat row of `day` with `rows`
    pub fn replace_day_stats(&self, day: NaiveDate, rows: &[DayStat]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        replace_day_stats_in(&tx, &day_key(day), rows)?;
        tx.commit()?;
        Ok(())
    }

    /// Upsert the grand total and replace the stat rows of `day` in one
    /// transaction, so the total never changes without its breakdown.
    pub fn replace_day_summary(
        &self,
        day: NaiveDate,
        total_seconds: f64,
        rows: &[DayStat],
    ) -> Result<()> {
        let key = day_key(day);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_day_summary_in(&tx, &key, total_seconds)?;
        replace_day_stats_in(&tx, &key, rows)?;
        tx.commit()?;
        Ok(())
    }

    pub fn day_summary(&self, day: NaiveDate) -> Result<Option<DaySummary>> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                "SELECT day, total_seconds FROM day_summaries WHERE day = ?",
                params![day_key(day)],
                |row| {
                    Ok(DaySummary {
                        day: day_column(row, 0)?,
                        total_seconds: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    pub fn day_summaries(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DaySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, total_seconds FROM day_summaries
             WHERE day >= ? AND day <= ? ORDER BY day",
        )?;

        let rows = stmt.query_map(params![day_key(start), day_key(end)], |row| {
            Ok(DaySummary {
                day: day_column(row, 0)?,
                total_seconds: row.get(1)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Stat rows of one kind for a day, largest first
    pub fn day_stats(&self, day: NaiveDate, kind: StatKind) -> Result<Vec<DayStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, type, name, total_seconds FROM day_stats
             WHERE day = ? AND type = ?
             ORDER BY total_seconds DESC, name",
        )?;

        let rows = stmt.query_map(params![day_key(day), kind.as_str()], |row| {
            Ok(DayStat {
                day: day_column(row, 0)?,
                kind: kind_column(row, 1)?,
                name: row.get(2)?,
                total_seconds: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // PROJECTS
    // ============================================

    /// Insert or fully overwrite a project keyed by its upstream id
    pub fn upsert_project(&self, project: &Project) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO projects
               (uuid, name, repository, badge, color, has_public_url,
                last_heartbeat_at, first_heartbeat_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(uuid) DO UPDATE SET
                   name = excluded.name,
                   repository = excluded.repository,
                   badge = excluded.badge,
                   color = excluded.color,
                   has_public_url = excluded.has_public_url,
                   last_heartbeat_at = excluded.last_heartbeat_at,
                   first_heartbeat_at = excluded.first_heartbeat_at"#,
            params![
                project.external_id,
                project.name,
                project.repository,
                project.badge,
                project.color,
                project.has_public_url,
                project.last_heartbeat_at.map(|t| t.to_rfc3339()),
                project.first_heartbeat_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Projects whose name contains `query`, most recently active first
    pub fn projects(&self, query: Option<&str>) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT uuid, name, repository, badge, color, has_public_url,
                      last_heartbeat_at, first_heartbeat_at
               FROM projects
               WHERE ?1 IS NULL OR name LIKE '%' || ?1 || '%'
               ORDER BY last_heartbeat_at DESC, name"#,
        )?;

        let rows = stmt.query_map(params![query], |row| {
            Ok(Project {
                external_id: row.get(0)?,
                name: row.get(1)?,
                repository: row.get(2)?,
                badge: row.get(3)?,
                color: row.get(4)?,
                has_public_url: row.get(5)?,
                last_heartbeat_at: timestamp_column(row, 6)?,
                first_heartbeat_at: timestamp_column(row, 7)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // SYNC LOG
    // ============================================

    pub fn record_sync(&self, day: NaiveDate, total_seconds: f64, status: SyncStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO sync_log (day, synced_at, total_seconds, status)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(day) DO UPDATE SET
                   synced_at = excluded.synced_at,
                   total_seconds = excluded.total_seconds,
                   status = excluded.status"#,
            params![day_key(day), Utc::now().to_rfc3339(), total_seconds, status.as_str()],
        )?;
        Ok(())
    }

    /// Latest day whose last sync succeeded
    pub fn last_synced_day(&self) -> Result<Option<NaiveDate>> {
        let conn = self.conn()?;
        let day = conn
            .query_row(
                "SELECT day FROM sync_log WHERE status = 'success' ORDER BY day DESC LIMIT 1",
                [],
                |row| day_column(row, 0),
            )
            .optional()?;
        Ok(day)
    }

    pub fn is_day_synced(&self, day: NaiveDate) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE day = ? AND status = 'success'",
            params![day_key(day)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn sync_entry(&self, day: NaiveDate) -> Result<Option<SyncEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT day, status, total_seconds, synced_at FROM sync_log WHERE day = ?",
                params![day_key(day)],
                |row| {
                    let status: String = row.get(1)?;
                    Ok(SyncEntry {
                        day: day_column(row, 0)?,
                        status: status.parse().map_err(|e| conversion_error(1, e))?,
                        total_seconds: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                        synced_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }
}

// ============================================
// TRANSACTION HELPERS
// ============================================

fn upsert_day_summary_in(conn: &Connection, key: &str, total_seconds: f64) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO day_summaries (day, total_seconds)
           VALUES (?, ?)
           ON CONFLICT(day) DO UPDATE SET total_seconds = excluded.total_seconds"#,
        params![key, total_seconds],
    )?;
    Ok(())
}

fn replace_day_stats_in(conn: &Connection, key: &str, rows: &[DayStat]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM day_stats WHERE day = ?", params![key])?;

    let mut stmt = conn.prepare(
        r#"INSERT INTO day_stats (day, type, name, total_seconds)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(day, type, name) DO UPDATE SET total_seconds = excluded.total_seconds"#,
    )?;
    for s in rows {
        stmt.execute(params![key, s.kind.as_str(), s.name, s.total_seconds])?;
    }
    Ok(())
}

// ============================================
// COLUMN CODECS
// ============================================

fn encode_dependencies(dependencies: &[String]) -> Result<Option<String>> {
    if dependencies.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(dependencies)?))
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_day(&raw).ok_or_else(|| conversion_error(idx, format!("invalid day '{}'", raw)))
}

fn kind_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<StatKind> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn dependencies_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e)),
        None => Ok(Vec::new()),
    }
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}
