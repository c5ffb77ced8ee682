//! SQLite schema definition
//!
//! Day-scoped tables carry a `day` column holding `YYYY-MM-DD` text and an
//! index on it; every replace deletes and re-inserts by that column.

pub const SCHEMA: &str = r#"
-- ============================================
-- PROJECTS
-- ============================================

-- Projects as reported by the upstream service, keyed by its id
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,             -- upstream project id
    name TEXT NOT NULL,
    repository TEXT,
    badge TEXT,
    color TEXT,
    has_public_url INTEGER NOT NULL DEFAULT 0,
    last_heartbeat_at TEXT,                -- RFC 3339
    first_heartbeat_at TEXT,               -- RFC 3339
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name);

-- ============================================
-- RAW ACTIVITY (day-scoped)
-- ============================================

CREATE TABLE IF NOT EXISTS durations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    project TEXT,
    start_time REAL NOT NULL,              -- seconds since epoch
    duration REAL NOT NULL,                -- seconds
    dependencies TEXT,                     -- JSON array, NULL when empty
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_durations_day ON durations(day);
CREATE INDEX IF NOT EXISTS idx_durations_project ON durations(project);

-- Entity-level durations fetched per project
CREATE TABLE IF NOT EXISTS project_durations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    project TEXT,
    branch TEXT,
    entity TEXT,
    language TEXT,
    type TEXT,
    start_time REAL NOT NULL,
    duration REAL NOT NULL,
    dependencies TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_project_durations_day ON project_durations(day);
CREATE INDEX IF NOT EXISTS idx_project_durations_project ON project_durations(project);

CREATE TABLE IF NOT EXISTS heartbeats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    entity TEXT NOT NULL,
    type TEXT NOT NULL,
    category TEXT,
    time REAL NOT NULL,
    project TEXT,
    branch TEXT,
    language TEXT,
    is_write INTEGER NOT NULL DEFAULT 0,
    machine_id TEXT,
    lines INTEGER,
    line_no INTEGER,
    cursor_pos INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_heartbeats_day ON heartbeats(day);
CREATE INDEX IF NOT EXISTS idx_heartbeats_time ON heartbeats(time);

-- ============================================
-- DERIVED AGGREGATES
-- ============================================

-- Grand total per day
CREATE TABLE IF NOT EXISTS day_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL UNIQUE,
    total_seconds REAL NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Breakdown per day: category, language, editor, os, project, dependency, machine
CREATE TABLE IF NOT EXISTS day_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    total_seconds REAL NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(day, type, name)
);
CREATE INDEX IF NOT EXISTS idx_day_stats_day ON day_stats(day);
CREATE INDEX IF NOT EXISTS idx_day_stats_type ON day_stats(type);

-- ============================================
-- SYNC AUDIT
-- ============================================

-- Latest outcome per day; 'success' | 'failed'
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL UNIQUE,
    synced_at TEXT NOT NULL,
    total_seconds REAL,
    status TEXT NOT NULL DEFAULT 'success'
);
"#;
