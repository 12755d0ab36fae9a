//! Pipeline orchestration
//!
//! This module provides the public API for building the feature tables.
//! Stages run strictly in sequence, each one reading the previous stage's
//! table and committing its own output before the next begins:
//!
//! 1. Run extraction - raw activity JSON to run records
//! 2. Daily aggregation
//! 3. Weekly aggregation plus rolling load metrics
//! 4. Label generation
//!
//! Every derived table is a deterministic function of the run records, so any
//! stage can be re-run in full at any time.

use crate::adapters::{ActivityAdapter, StravaAdapter};
use crate::config::PipelineConfig;
use crate::daily::aggregate_daily;
use crate::error::PipelineError;
use crate::labels::generate_labels;
use crate::rolling::{attach_rolling, daily_calendar, rolling_loads};
use crate::storage::Database;
use crate::types::{DailyFeatures, FeatureTables, RunRecord, Stage, StageReport, WeeklyFeatures};
use crate::weekly::aggregate_weekly;

/// Parse raw activities into run records.
///
/// Activities that fail to parse are logged and counted as skipped; one bad
/// record never aborts the batch. Returns the runs and the skip count.
pub fn extract_runs<'a, I>(
    raw_activities: I,
    adapter: &dyn ActivityAdapter,
    config: &PipelineConfig,
) -> (Vec<RunRecord>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut runs = Vec::new();
    let mut skipped = 0;

    for raw_json in raw_activities {
        match adapter.to_run(raw_json, config) {
            Ok(Some(run)) => runs.push(run),
            Ok(None) => skipped += 1,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable activity");
                skipped += 1;
            }
        }
    }

    (runs, skipped)
}

/// Weekly rows with rolling metrics attached, computed from daily rows
pub fn weekly_with_rolling(daily: &[DailyFeatures]) -> Vec<WeeklyFeatures> {
    let loads = rolling_loads(&daily_calendar(daily));
    attach_rolling(aggregate_weekly(daily), &loads)
}

/// Compute every derived table from run records without touching storage.
pub fn compute_features(runs: &[RunRecord], config: &PipelineConfig) -> FeatureTables {
    let daily = aggregate_daily(runs, config.unknown_zone);
    let weekly = weekly_with_rolling(&daily);
    let labels = generate_labels(&weekly);

    FeatureTables {
        daily,
        weekly,
        labels,
    }
}

/// Store-backed pipeline runner.
pub struct FeaturePipeline {
    config: PipelineConfig,
    adapter: Box<dyn ActivityAdapter>,
}

impl FeaturePipeline {
    /// Create a pipeline reading Strava activity payloads
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_adapter(config, Box::new(StravaAdapter))
    }

    /// Create a pipeline with a specific activity adapter
    pub fn with_adapter(config: PipelineConfig, adapter: Box<dyn ActivityAdapter>) -> Self {
        Self { config, adapter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract run records from raw activities, upsert them by id and drop
    /// runs whose raw activity no longer yields one
    pub fn build_runs(&self, db: &mut Database) -> Result<StageReport, PipelineError> {
        let raw = db.load_raw_runs()?;
        let (runs, skipped) = extract_runs(
            raw.iter().map(|(_, json)| json.as_str()),
            self.adapter.as_ref(),
            &self.config,
        );

        let (written, removed) = db.sync_runs(&runs)?;
        if removed > 0 {
            tracing::info!(removed, "removed runs no longer backed by a raw run activity");
        }

        let mut report = StageReport::new(Stage::Runs);
        report.rows_read = raw.len();
        report.rows_skipped = skipped;
        report.rows_written = written;

        log_report(&report);
        Ok(report)
    }

    /// Rebuild the daily feature table from run records
    pub fn build_daily(&self, db: &mut Database) -> Result<StageReport, PipelineError> {
        let runs = db.load_runs()?;
        let daily = aggregate_daily(&runs, self.config.unknown_zone);

        let mut report = StageReport::new(Stage::Daily);
        report.rows_read = runs.len();
        report.rows_written = db.replace_daily(&daily)?;

        log_report(&report);
        Ok(report)
    }

    /// Rebuild the weekly feature table, rolling metrics included
    pub fn build_weekly(&self, db: &mut Database) -> Result<StageReport, PipelineError> {
        let daily = db.load_daily()?;
        let weekly = weekly_with_rolling(&daily);

        let mut report = StageReport::new(Stage::Weekly);
        report.rows_read = daily.len();
        report.rows_written = db.replace_weekly(&weekly)?;

        log_report(&report);
        Ok(report)
    }

    /// Rebuild the next-week distance labels
    pub fn build_labels(&self, db: &mut Database) -> Result<StageReport, PipelineError> {
        let weekly = db.load_weekly()?;
        let labels = generate_labels(&weekly);

        let mut report = StageReport::new(Stage::Labels);
        report.rows_read = weekly.len();
        report.rows_written = db.replace_labels(&labels)?;

        log_report(&report);
        Ok(report)
    }

    /// Rebuild daily, weekly and label tables in order
    pub fn build_features(&self, db: &mut Database) -> Result<Vec<StageReport>, PipelineError> {
        Ok(vec![
            self.build_daily(db)?,
            self.build_weekly(db)?,
            self.build_labels(db)?,
        ])
    }

    /// Run every stage from raw activities to labels
    pub fn run_all(&self, db: &mut Database) -> Result<Vec<StageReport>, PipelineError> {
        let mut reports = vec![self.build_runs(db)?];
        reports.extend(self.build_features(db)?);
        Ok(reports)
    }
}

fn log_report(report: &StageReport) {
    tracing::info!(
        stage = report.stage.as_str(),
        rows_read = report.rows_read,
        rows_written = report.rows_written,
        rows_skipped = report.rows_skipped,
        "stage complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{parse_array, RawActivity};
    use crate::types::EffortZone;
    use chrono::{Duration, NaiveDate, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn activity(
        id: i64,
        date: NaiveDate,
        distance_m: f64,
        moving_s: i64,
        hr: Option<f64>,
    ) -> Value {
        let mut value = json!({
            "id": id,
            "type": "Run",
            "start_date": format!("{}T06:00:00Z", date),
            "start_date_local": format!("{}T07:00:00Z", date),
            "distance": distance_m,
            "moving_time": moving_s,
            "elapsed_time": moving_s + 60,
            "total_elevation_gain": 12.0,
        });
        if let Some(hr) = hr {
            value["average_heartrate"] = json!(hr);
        }
        value
    }

    fn deposit(db: &mut Database, activities: &[Value]) {
        let raw: Vec<RawActivity> = activities
            .iter()
            .map(|a| RawActivity::from_value(a).unwrap())
            .collect();
        db.upsert_raw_activities(&raw, Utc::now()).unwrap();
    }

    /// Nine weeks of running with a missing week and some runs without HR
    fn training_block() -> Vec<Value> {
        let mut activities = Vec::new();
        let mut id = 1000;
        for day in 0..63 {
            // Week 5 (days 35-41) is a break
            if (35..42).contains(&day) || day % 7 == 4 {
                continue;
            }
            let date = monday() + Duration::days(day);
            let hr = if day % 5 == 0 { None } else { Some(130.0 + (day % 45) as f64) };
            let distance_m = 6_000.0 + 150.0 * (day % 9) as f64;
            activities.push(activity(id, date, distance_m, 1_900 + 20 * day, hr));
            id += 1;
        }
        activities
    }

    #[test]
    fn test_single_run_scenario() {
        let mut db = Database::open_in_memory().unwrap();
        deposit(&mut db, &[activity(1, monday(), 10_000.0, 3000, Some(150.0))]);

        let pipeline = FeaturePipeline::new(PipelineConfig::default());
        pipeline.run_all(&mut db).unwrap();

        let runs = db.load_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].pace_s_per_km, Some(300.0));
        assert_eq!(runs[0].effort_zone, Some(EffortZone::Z2));
        assert!((runs[0].trimp - 29.89).abs() < 0.01);

        let weekly = db.load_weekly().unwrap();
        assert_eq!(weekly.len(), 1);
        assert!((weekly[0].distance_km - 10.0).abs() < 1e-9);
        // A one-day series never fills a window
        assert_eq!(weekly[0].rolling.dist_7d, None);
        assert_eq!(weekly[0].rolling.acwr, None);
        assert!(db.load_labels().unwrap().is_empty());
    }

    #[test]
    fn test_labels_for_consecutive_weeks() {
        let mut db = Database::open_in_memory().unwrap();
        deposit(
            &mut db,
            &[
                activity(1, monday(), 20_000.0, 6000, Some(140.0)),
                activity(2, monday() + Duration::days(8), 25_000.0, 7500, Some(140.0)),
                activity(3, monday() + Duration::days(16), 30_000.0, 9000, Some(140.0)),
            ],
        );

        FeaturePipeline::new(PipelineConfig::default())
            .run_all(&mut db)
            .unwrap();

        let labels = db.load_labels().unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].week_start, monday());
        assert!((labels[0].y_next_week_distance_km - 25.0).abs() < 1e-9);
        assert_eq!(labels[1].week_start, monday() + Duration::days(7));
        assert!((labels[1].y_next_week_distance_km - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let mut db = Database::open_in_memory().unwrap();
        let mut bad_time = activity(2, monday(), 5_000.0, 1500, None);
        bad_time["start_date_local"] = json!("not a date");
        let mut ride = activity(3, monday(), 40_000.0, 5400, Some(130.0));
        ride["type"] = json!("Ride");
        let mut broken = activity(4, monday(), 5_000.0, 1500, None);
        broken["distance"] = json!("far");

        deposit(
            &mut db,
            &[activity(1, monday(), 8_000.0, 2400, Some(145.0)), bad_time, ride, broken],
        );

        let pipeline = FeaturePipeline::new(PipelineConfig::default());
        let report = pipeline.build_runs(&mut db).unwrap();

        // The ride never leaves activities_raw
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_written, 1);
        assert_eq!(report.rows_skipped, 2);
        assert_eq!(db.load_runs().unwrap()[0].activity_id, 1);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut db = Database::open_in_memory().unwrap();
        let reports = FeaturePipeline::new(PipelineConfig::default())
            .run_all(&mut db)
            .unwrap();

        assert_eq!(reports.len(), 4);
        for report in &reports {
            assert_eq!(report.rows_read, 0);
            assert_eq!(report.rows_written, 0);
        }
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        deposit(&mut db, &training_block());
        let pipeline = FeaturePipeline::new(PipelineConfig::default());

        pipeline.run_all(&mut db).unwrap();
        let first = (
            db.load_runs().unwrap(),
            db.load_daily().unwrap(),
            db.load_weekly().unwrap(),
            db.load_labels().unwrap(),
        );

        pipeline.run_all(&mut db).unwrap();
        let second = (
            db.load_runs().unwrap(),
            db.load_daily().unwrap(),
            db.load_weekly().unwrap(),
            db.load_labels().unwrap(),
        );

        assert_eq!(first, second);
        assert_eq!(db.table_counts().unwrap().runs, first.0.len());
    }

    #[test]
    fn test_stored_tables_match_pure_computation() {
        let mut db = Database::open_in_memory().unwrap();
        let activities = training_block();
        deposit(&mut db, &activities);

        let config = PipelineConfig::default();
        FeaturePipeline::new(config.clone()).run_all(&mut db).unwrap();

        let json = serde_json::to_string(&activities).unwrap();
        let raw = parse_array(&json).unwrap();
        let texts: Vec<String> = raw.iter().map(|v| v.to_string()).collect();
        let (runs, skipped) =
            extract_runs(texts.iter().map(String::as_str), &StravaAdapter, &config);
        assert_eq!(skipped, 0);

        let tables = compute_features(&runs, &config);
        assert_eq!(db.load_daily().unwrap(), tables.daily);
        assert_eq!(db.load_weekly().unwrap(), tables.weekly);
        assert_eq!(db.load_labels().unwrap(), tables.labels);
    }

    #[test]
    fn test_training_block_features() {
        let config = PipelineConfig::default();
        let activities = training_block();
        let texts: Vec<String> = activities.iter().map(|v| v.to_string()).collect();
        let (runs, _) = extract_runs(texts.iter().map(String::as_str), &StravaAdapter, &config);
        let tables = compute_features(&runs, &config);

        // Nine calendar weeks, one of them empty
        assert_eq!(tables.weekly.len(), 8);
        // Weeks 0-3 and 6-7 have a successor; week 4 is followed by the break
        assert_eq!(tables.labels.len(), 6);
        assert!(tables
            .labels
            .iter()
            .all(|l| l.week_start != monday() + Duration::weeks(4)));

        let total_runs_km: f64 = runs.iter().map(|r| r.distance_m).sum::<f64>() / 1000.0;
        let total_weekly_km: f64 = tables.weekly.iter().map(|w| w.distance_km).sum();
        assert!((total_runs_km - total_weekly_km).abs() < 1e-6);

        // From week 4 on the chronic window is full
        for week in &tables.weekly[4..] {
            assert!(week.rolling.dist_28d.is_some());
            assert!(week.rolling.acwr.is_some());
        }

        // Acute load recovers once running resumes after the break
        let after_break = tables
            .weekly
            .iter()
            .find(|w| w.week_start == monday() + Duration::weeks(6))
            .unwrap();
        assert!(after_break.rolling.acwr.unwrap() > 0.0);
    }

    #[test]
    fn test_hr_max_changes_outputs() {
        let activities = training_block();
        let texts: Vec<String> = activities.iter().map(|v| v.to_string()).collect();

        let (default_runs, _) = extract_runs(
            texts.iter().map(String::as_str),
            &StravaAdapter,
            &PipelineConfig::default(),
        );
        let (low_runs, _) = extract_runs(
            texts.iter().map(String::as_str),
            &StravaAdapter,
            &PipelineConfig::with_hr_max(175.0),
        );

        let default_load: f64 = default_runs.iter().map(|r| r.trimp).sum();
        let low_load: f64 = low_runs.iter().map(|r| r.trimp).sum();
        assert!(low_load > default_load);
    }

    #[test]
    fn test_huge_durations_are_dropped_not_summed() {
        let mut huge_a = activity(1, monday(), 5_000.0, 1500, Some(140.0));
        huge_a["moving_time"] = json!(1e19);
        let mut huge_b = activity(2, monday(), 5_000.0, 1500, Some(140.0));
        huge_b["moving_time"] = json!(1e19);
        let normal = activity(3, monday(), 8_000.0, 2400, Some(140.0));

        let texts: Vec<String> = [huge_a, huge_b, normal].iter().map(|v| v.to_string()).collect();
        let config = PipelineConfig::default();
        let (runs, skipped) =
            extract_runs(texts.iter().map(String::as_str), &StravaAdapter, &config);
        assert_eq!(skipped, 2);

        let tables = compute_features(&runs, &config);
        assert_eq!(tables.daily.len(), 1);
        assert!((tables.daily[0].time_min - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_reimported_non_run_leaves_runs_table() {
        let mut db = Database::open_in_memory().unwrap();
        deposit(
            &mut db,
            &[
                activity(1, monday(), 10_000.0, 3000, Some(150.0)),
                activity(2, monday() + Duration::days(1), 6_000.0, 1800, Some(140.0)),
            ],
        );
        let pipeline = FeaturePipeline::new(PipelineConfig::default());
        pipeline.run_all(&mut db).unwrap();
        assert_eq!(db.table_counts().unwrap().runs, 2);

        // Activity 2 turns out to be a ride
        let mut ride = activity(2, monday() + Duration::days(1), 6_000.0, 1800, Some(140.0));
        ride["type"] = json!("Ride");
        deposit(&mut db, &[ride]);

        let reports = pipeline.run_all(&mut db).unwrap();
        assert_eq!(reports[0].rows_read, 1);
        assert_eq!(reports[0].rows_written, 1);

        let runs = db.load_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].activity_id, 1);

        let daily = db.load_daily().unwrap();
        assert_eq!(daily.len(), 1);
        assert!((db.load_weekly().unwrap()[0].distance_km - 10.0).abs() < 1e-9);
    }
}
