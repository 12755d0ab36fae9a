//! Database schema definitions

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// Schema version bookkeeping table
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// SQL schema for creating all pipeline tables
pub const SCHEMA: &str = r#"
-- Raw activities as deposited by ingestion, keyed by upstream id
CREATE TABLE IF NOT EXISTS activities_raw (
    activity_id INTEGER PRIMARY KEY,
    start_date_utc TEXT NOT NULL,
    type TEXT NOT NULL,
    raw_json TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

-- Normalized run records
CREATE TABLE IF NOT EXISTS runs (
    activity_id INTEGER PRIMARY KEY,
    start_date_local TEXT NOT NULL,
    start_time_local TEXT,
    distance_m REAL NOT NULL,
    moving_time_s INTEGER NOT NULL,
    elapsed_time_s INTEGER,
    elev_gain_m REAL NOT NULL DEFAULT 0,
    avg_hr REAL,
    max_hr REAL,
    avg_speed_mps REAL,
    pace_s_per_km REAL,
    trimp REAL NOT NULL,
    effort_zone INTEGER CHECK (effort_zone BETWEEN 1 AND 4)
);

CREATE INDEX IF NOT EXISTS idx_runs_date ON runs(start_date_local);

-- One row per date with at least one run
CREATE TABLE IF NOT EXISTS daily_features (
    date TEXT PRIMARY KEY,
    run_count INTEGER NOT NULL,
    distance_km REAL NOT NULL,
    time_min REAL NOT NULL,
    elev_m REAL NOT NULL,
    avg_hr_mean REAL,
    trimp REAL NOT NULL,
    easy_distance_km REAL NOT NULL,
    hard_distance_km REAL NOT NULL,
    easy_time_min REAL NOT NULL,
    hard_time_min REAL NOT NULL
);

-- One row per Monday-start week with activity
CREATE TABLE IF NOT EXISTS weekly_features (
    week_start TEXT PRIMARY KEY,
    distance_km REAL NOT NULL,
    time_min REAL NOT NULL,
    elev_m REAL NOT NULL,
    trimp REAL NOT NULL,
    easy_distance_km REAL NOT NULL,
    hard_distance_km REAL NOT NULL,
    hard_sessions INTEGER NOT NULL,
    dist_7d REAL,
    dist_28d REAL,
    trimp_7d REAL,
    trimp_28d REAL,
    acwr REAL,
    monotony_7d REAL,
    strain_7d REAL,
    easy_pct REAL
);

-- Next-week distance target
CREATE TABLE IF NOT EXISTS labels_weekly (
    week_start TEXT PRIMARY KEY,
    y_next_week_distance_km REAL NOT NULL
);
"#;
