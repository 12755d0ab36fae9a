//! Database operations using rusqlite.
//!
//! Every write path runs inside a single transaction: it commits when the
//! closure succeeds and rolls back when the transaction is dropped on error,
//! so a failed stage never leaves partial tables behind.

use super::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::adapters::RawActivity;
use crate::error::PipelineError;
use crate::types::{
    DailyFeatures, EffortZone, RollingLoad, RunRecord, WeeklyFeatures, WeeklyLabel,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub activities_raw: usize,
    pub runs: usize,
    pub daily_features: usize,
    pub weekly_features: usize,
    pub labels_weekly: usize,
}

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), PipelineError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| PipelineError::MigrationError(e.to_string()))?;

        let current_version = self.schema_version()?;
        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    pub fn schema_version(&self) -> Result<i32, PipelineError> {
        let version = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn migrate(&self, from_version: i32) -> Result<(), PipelineError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| PipelineError::MigrationError(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                    params![CURRENT_VERSION, Utc::now().to_rfc3339()],
                )
                .map_err(|e| PipelineError::MigrationError(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub fn in_transaction<T, F>(&mut self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, PipelineError>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Writes ==========

    /// Insert or replace raw activities keyed by activity id.
    pub fn upsert_raw_activities(
        &mut self,
        activities: &[RawActivity],
        ingested_at: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        let ingested_at = ingested_at.to_rfc3339();
        self.in_transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO activities_raw
                 (activity_id, start_date_utc, type, raw_json, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for activity in activities {
                stmt.execute(params![
                    activity.activity_id,
                    activity.start_date_utc,
                    activity.activity_type,
                    activity.raw_json,
                    ingested_at,
                ])?;
            }
            Ok(activities.len())
        })
    }

    /// Insert or replace run records keyed by activity id.
    pub fn upsert_runs(&mut self, runs: &[RunRecord]) -> Result<usize, PipelineError> {
        self.in_transaction(|tx| write_runs(tx, runs))
    }

    /// Make the runs table match `runs`: upsert each record by activity id and
    /// delete rows whose activity no longer yields a run. Returns
    /// `(written, removed)`.
    pub fn sync_runs(&mut self, runs: &[RunRecord]) -> Result<(usize, usize), PipelineError> {
        self.in_transaction(|tx| {
            let written = write_runs(tx, runs)?;
            let keep: Vec<i64> = runs.iter().map(|run| run.activity_id).collect();
            let removed = prune_runs(tx, &keep)?;
            Ok((written, removed))
        })
    }

    /// Replace the daily feature table.
    pub fn replace_daily(&mut self, rows: &[DailyFeatures]) -> Result<usize, PipelineError> {
        self.in_transaction(|tx| write_daily(tx, rows))
    }

    /// Replace the weekly feature table.
    pub fn replace_weekly(&mut self, rows: &[WeeklyFeatures]) -> Result<usize, PipelineError> {
        self.in_transaction(|tx| write_weekly(tx, rows))
    }

    /// Replace the weekly label table.
    pub fn replace_labels(&mut self, rows: &[WeeklyLabel]) -> Result<usize, PipelineError> {
        self.in_transaction(|tx| write_labels(tx, rows))
    }

    // ========== Reads ==========

    /// Load `(activity_id, raw_json)` for every raw activity of type Run.
    pub fn load_raw_runs(&self) -> Result<Vec<(i64, String)>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT activity_id, raw_json FROM activities_raw
             WHERE type = 'Run' ORDER BY activity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Load all run records ordered by start time and id.
    pub fn load_runs(&self) -> Result<Vec<RunRecord>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT activity_id, start_date_local, start_time_local, distance_m, moving_time_s,
                    elapsed_time_s, elev_gain_m, avg_hr, max_hr, avg_speed_mps,
                    pace_s_per_km, trimp, effort_zone
             FROM runs
             ORDER BY start_date_local, start_time_local, activity_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let date: String = row.get(1)?;
            let time: Option<String> = row.get(2)?;
            let zone: Option<u8> = row.get(12)?;
            Ok((
                date,
                time,
                zone,
                RunRecord {
                    activity_id: row.get(0)?,
                    start_date_local: NaiveDate::MIN,
                    start_time_local: NaiveTime::MIN,
                    distance_m: row.get(3)?,
                    moving_time_s: row.get(4)?,
                    elapsed_time_s: row.get(5)?,
                    elev_gain_m: row.get(6)?,
                    avg_hr: row.get(7)?,
                    max_hr: row.get(8)?,
                    avg_speed_mps: row.get(9)?,
                    pace_s_per_km: row.get(10)?,
                    trimp: row.get(11)?,
                    effort_zone: None,
                },
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (date, time, zone, mut run) = row?;
            run.start_date_local = parse_date(&date)?;
            run.start_time_local = match time {
                Some(time) => parse_time(&time)?,
                None => NaiveTime::MIN,
            };
            run.effort_zone = zone.and_then(EffortZone::from_u8);
            results.push(run);
        }

        Ok(results)
    }

    /// Load the daily feature table ordered by date.
    pub fn load_daily(&self) -> Result<Vec<DailyFeatures>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, run_count, distance_km, time_min, elev_m, avg_hr_mean, trimp,
                    easy_distance_km, hard_distance_km, easy_time_min, hard_time_min
             FROM daily_features ORDER BY date",
        )?;

        let rows = stmt.query_map([], |row| {
            let date: String = row.get(0)?;
            Ok((
                date,
                DailyFeatures {
                    date: NaiveDate::MIN,
                    run_count: row.get(1)?,
                    distance_km: row.get(2)?,
                    time_min: row.get(3)?,
                    elev_m: row.get(4)?,
                    avg_hr_mean: row.get(5)?,
                    trimp: row.get(6)?,
                    easy_distance_km: row.get(7)?,
                    hard_distance_km: row.get(8)?,
                    easy_time_min: row.get(9)?,
                    hard_time_min: row.get(10)?,
                },
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (date, mut daily) = row?;
            daily.date = parse_date(&date)?;
            results.push(daily);
        }

        Ok(results)
    }

    /// Load the weekly feature table ordered by week start.
    pub fn load_weekly(&self) -> Result<Vec<WeeklyFeatures>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT week_start, distance_km, time_min, elev_m, trimp, easy_distance_km,
                    hard_distance_km, hard_sessions, dist_7d, dist_28d, trimp_7d, trimp_28d,
                    acwr, monotony_7d, strain_7d, easy_pct
             FROM weekly_features ORDER BY week_start",
        )?;

        let rows = stmt.query_map([], |row| {
            let week_start: String = row.get(0)?;
            Ok((
                week_start,
                WeeklyFeatures {
                    week_start: NaiveDate::MIN,
                    distance_km: row.get(1)?,
                    time_min: row.get(2)?,
                    elev_m: row.get(3)?,
                    trimp: row.get(4)?,
                    easy_distance_km: row.get(5)?,
                    hard_distance_km: row.get(6)?,
                    hard_sessions: row.get(7)?,
                    rolling: RollingLoad {
                        dist_7d: row.get(8)?,
                        dist_28d: row.get(9)?,
                        trimp_7d: row.get(10)?,
                        trimp_28d: row.get(11)?,
                        acwr: row.get(12)?,
                        monotony_7d: row.get(13)?,
                        strain_7d: row.get(14)?,
                    },
                    easy_pct: row.get(15)?,
                },
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (week_start, mut weekly) = row?;
            weekly.week_start = parse_date(&week_start)?;
            results.push(weekly);
        }

        Ok(results)
    }

    /// Load the weekly label table ordered by week start.
    pub fn load_labels(&self) -> Result<Vec<WeeklyLabel>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT week_start, y_next_week_distance_km FROM labels_weekly ORDER BY week_start",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (week_start, distance) = row?;
            results.push(WeeklyLabel {
                week_start: parse_date(&week_start)?,
                y_next_week_distance_km: distance,
            });
        }

        Ok(results)
    }

    /// Count rows in every pipeline table.
    pub fn table_counts(&self) -> Result<TableCounts, PipelineError> {
        let count = |table: &str| -> Result<usize, PipelineError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(TableCounts {
            activities_raw: count("activities_raw")?,
            runs: count("runs")?,
            daily_features: count("daily_features")?,
            weekly_features: count("weekly_features")?,
            labels_weekly: count("labels_weekly")?,
        })
    }
}

// ========== Statement helpers (callers own the transaction) ==========

/// Insert or replace run records.
pub fn write_runs(conn: &Connection, runs: &[RunRecord]) -> Result<usize, PipelineError> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO runs
         (activity_id, start_date_local, start_time_local, distance_m, moving_time_s,
          elapsed_time_s, elev_gain_m, avg_hr, max_hr, avg_speed_mps, pace_s_per_km,
          trimp, effort_zone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for run in runs {
        stmt.execute(params![
            run.activity_id,
            run.start_date_local.format(DATE_FORMAT).to_string(),
            run.start_time_local.format(TIME_FORMAT).to_string(),
            run.distance_m,
            run.moving_time_s,
            run.elapsed_time_s,
            run.elev_gain_m,
            run.avg_hr,
            run.max_hr,
            run.avg_speed_mps,
            run.pace_s_per_km,
            run.trimp,
            run.effort_zone.map(|zone| zone.as_u8()),
        ])?;
    }
    Ok(runs.len())
}

/// Delete run rows whose activity id is not in `keep`.
pub fn prune_runs(conn: &Connection, keep: &[i64]) -> Result<usize, PipelineError> {
    let keep: HashSet<i64> = keep.iter().copied().collect();
    let existing: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT activity_id FROM runs")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut delete = conn.prepare("DELETE FROM runs WHERE activity_id = ?1")?;
    let mut removed = 0;
    for id in existing.into_iter().filter(|id| !keep.contains(id)) {
        removed += delete.execute(params![id])?;
    }
    Ok(removed)
}

/// Clear and rewrite the daily feature table.
pub fn write_daily(conn: &Connection, rows: &[DailyFeatures]) -> Result<usize, PipelineError> {
    conn.execute("DELETE FROM daily_features", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO daily_features
         (date, run_count, distance_km, time_min, elev_m, avg_hr_mean, trimp,
          easy_distance_km, hard_distance_km, easy_time_min, hard_time_min)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.date.format(DATE_FORMAT).to_string(),
            row.run_count,
            row.distance_km,
            row.time_min,
            row.elev_m,
            row.avg_hr_mean,
            row.trimp,
            row.easy_distance_km,
            row.hard_distance_km,
            row.easy_time_min,
            row.hard_time_min,
        ])?;
    }
    Ok(rows.len())
}

/// Clear and rewrite the weekly feature table.
pub fn write_weekly(conn: &Connection, rows: &[WeeklyFeatures]) -> Result<usize, PipelineError> {
    conn.execute("DELETE FROM weekly_features", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO weekly_features
         (week_start, distance_km, time_min, elev_m, trimp, easy_distance_km,
          hard_distance_km, hard_sessions, dist_7d, dist_28d, trimp_7d, trimp_28d,
          acwr, monotony_7d, strain_7d, easy_pct)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.week_start.format(DATE_FORMAT).to_string(),
            row.distance_km,
            row.time_min,
            row.elev_m,
            row.trimp,
            row.easy_distance_km,
            row.hard_distance_km,
            row.hard_sessions,
            row.rolling.dist_7d,
            row.rolling.dist_28d,
            row.rolling.trimp_7d,
            row.rolling.trimp_28d,
            row.rolling.acwr,
            row.rolling.monotony_7d,
            row.rolling.strain_7d,
            row.easy_pct,
        ])?;
    }
    Ok(rows.len())
}

/// Clear and rewrite the weekly label table.
pub fn write_labels(conn: &Connection, rows: &[WeeklyLabel]) -> Result<usize, PipelineError> {
    conn.execute("DELETE FROM labels_weekly", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO labels_weekly (week_start, y_next_week_distance_km) VALUES (?1, ?2)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.week_start.format(DATE_FORMAT).to_string(),
            row.y_next_week_distance_km,
        ])?;
    }
    Ok(rows.len())
}

fn parse_date(value: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| PipelineError::DateParseError(format!("{value:?}: {e}")))
}

fn parse_time(value: &str) -> Result<NaiveTime, PipelineError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|e| PipelineError::DateParseError(format!("{value:?}: {e}")))
}
