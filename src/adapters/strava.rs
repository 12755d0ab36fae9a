//! Strava activity adapter
//!
//! Parses Strava activity summaries and maps run activities to run records.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::{pace_s_per_km, trimp_proxy, zone_from_avg_hr};
use crate::types::RunRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::ActivityAdapter;

/// Activity type the extractor keeps
pub const RUN_ACTIVITY_TYPE: &str = "Run";

/// Longest moving or elapsed time accepted for one activity (seven days)
pub const MAX_DURATION_S: f64 = 7.0 * 24.0 * 3600.0;

/// Strava payload adapter
pub struct StravaAdapter;

impl ActivityAdapter for StravaAdapter {
    fn to_run(
        &self,
        raw_json: &str,
        config: &PipelineConfig,
    ) -> Result<Option<RunRecord>, PipelineError> {
        let activity: StravaActivity = serde_json::from_str(raw_json)?;

        if activity.activity_type.as_deref() != Some(RUN_ACTIVITY_TYPE) {
            tracing::debug!(
                activity_id = activity.id,
                activity_type = activity.activity_type.as_deref().unwrap_or(""),
                "skipping non-run activity"
            );
            return Ok(None);
        }

        let start = match activity
            .start_date_local
            .as_deref()
            .and_then(parse_start_local)
        {
            Some(start) => start,
            None => {
                tracing::warn!(
                    activity_id = activity.id,
                    start_date_local = activity.start_date_local.as_deref().unwrap_or(""),
                    "dropping run with unparseable start timestamp"
                );
                return Ok(None);
            }
        };

        if !plausible_duration(activity.moving_time) || !plausible_duration(activity.elapsed_time)
        {
            tracing::warn!(
                activity_id = activity.id,
                moving_time = ?activity.moving_time,
                elapsed_time = ?activity.elapsed_time,
                "dropping run with implausible duration"
            );
            return Ok(None);
        }

        Ok(Some(convert_run(activity, start, config.hr_max)))
    }
}

fn plausible_duration(seconds: Option<f64>) -> bool {
    seconds.map_or(true, |s| s.is_finite() && s <= MAX_DURATION_S)
}

fn convert_run(activity: StravaActivity, start: NaiveDateTime, hr_max: f64) -> RunRecord {
    let distance_m = activity.distance.unwrap_or(0.0).max(0.0);
    // Upstream reports whole seconds; fractional values are truncated
    let moving_time_s = activity.moving_time.unwrap_or(0.0).max(0.0) as i64;
    let elapsed_time_s = activity.elapsed_time.map(|s| s.max(0.0) as i64);
    let moving_time_min = moving_time_s as f64 / 60.0;

    RunRecord {
        activity_id: activity.id,
        start_date_local: start.date(),
        start_time_local: start.time(),
        distance_m,
        moving_time_s,
        elapsed_time_s,
        elev_gain_m: activity.total_elevation_gain.unwrap_or(0.0).max(0.0),
        avg_hr: activity.average_heartrate,
        max_hr: activity.max_heartrate,
        avg_speed_mps: activity.average_speed,
        pace_s_per_km: pace_s_per_km(moving_time_s, distance_m),
        trimp: trimp_proxy(moving_time_min, activity.average_heartrate, hr_max),
        effort_zone: zone_from_avg_hr(activity.average_heartrate, hr_max),
    }
}

/// Parse a local start timestamp.
///
/// RFC 3339 values carrying an offset are normalized to UTC; naive date-times
/// and bare dates are taken as given. Empty or malformed input yields `None`.
pub fn parse_start_local(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

// Strava API response structure

#[derive(Debug, Deserialize)]
struct StravaActivity {
    id: i64,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    start_date_local: Option<String>,
    distance: Option<f64>,
    moving_time: Option<f64>,
    elapsed_time: Option<f64>,
    total_elevation_gain: Option<f64>,
    average_heartrate: Option<f64>,
    max_heartrate: Option<f64>,
    average_speed: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffortZone;
    use chrono::NaiveTime;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_full_run() {
        let raw = r#"{
            "id": 123456789,
            "type": "Run",
            "start_date_local": "2024-01-15T07:30:00Z",
            "distance": 10000.0,
            "moving_time": 3000,
            "elapsed_time": 3120,
            "total_elevation_gain": 85.5,
            "average_heartrate": 150.0,
            "max_heartrate": 172.0,
            "average_speed": 3.33
        }"#;

        let run = StravaAdapter.to_run(raw, &config()).unwrap().unwrap();

        assert_eq!(run.activity_id, 123456789);
        assert_eq!(run.start_date_local, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(run.start_time_local, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(run.moving_time_s, 3000);
        assert_eq!(run.elapsed_time_s, Some(3120));
        assert_eq!(run.elev_gain_m, 85.5);
        assert_eq!(run.pace_s_per_km, Some(300.0));
        // 150 / 194 = 0.773, inside [0.70, 0.80)
        assert_eq!(run.effort_zone, Some(EffortZone::Z2));
        assert!((run.trimp - 29.89).abs() < 0.01);
    }

    #[test]
    fn test_missing_optional_fields() {
        let raw = r#"{
            "id": 7,
            "type": "Run",
            "start_date_local": "2024-01-15T07:30:00Z",
            "moving_time": 1800
        }"#;

        let run = StravaAdapter.to_run(raw, &config()).unwrap().unwrap();

        assert_eq!(run.distance_m, 0.0);
        assert_eq!(run.elev_gain_m, 0.0);
        assert_eq!(run.elapsed_time_s, None);
        assert_eq!(run.avg_hr, None);
        assert_eq!(run.max_hr, None);
        assert_eq!(run.avg_speed_mps, None);
        assert_eq!(run.pace_s_per_km, None);
        assert_eq!(run.effort_zone, None);
        assert_eq!(run.trimp, 0.0);
    }

    #[test]
    fn test_null_elevation_defaults_to_zero() {
        let raw = r#"{"id": 8, "type": "Run", "start_date_local": "2024-01-15T07:30:00Z",
                      "distance": 3000, "moving_time": 900, "total_elevation_gain": null}"#;
        let run = StravaAdapter.to_run(raw, &config()).unwrap().unwrap();
        assert_eq!(run.elev_gain_m, 0.0);
        assert_eq!(run.distance_m, 3000.0);
    }

    #[test]
    fn test_non_run_skipped() {
        let raw = r#"{"id": 1, "type": "Ride", "start_date_local": "2024-01-15T07:30:00Z"}"#;
        assert_eq!(StravaAdapter.to_run(raw, &config()).unwrap(), None);

        let untyped = r#"{"id": 2, "start_date_local": "2024-01-15T07:30:00Z"}"#;
        assert_eq!(StravaAdapter.to_run(untyped, &config()).unwrap(), None);
    }

    #[test]
    fn test_bad_timestamp_dropped() {
        for start in [r#""""#, r#""yesterday""#, "null"] {
            let raw = format!(
                r#"{{"id": 3, "type": "Run", "start_date_local": {start}, "distance": 5000}}"#
            );
            assert_eq!(StravaAdapter.to_run(&raw, &config()).unwrap(), None);
        }

        let missing = r#"{"id": 4, "type": "Run", "distance": 5000}"#;
        assert_eq!(StravaAdapter.to_run(missing, &config()).unwrap(), None);
    }

    #[test]
    fn test_implausible_duration_dropped() {
        for field in ["moving_time", "elapsed_time"] {
            let raw = format!(
                r#"{{"id": 6, "type": "Run", "start_date_local": "2024-01-01T07:00:00Z",
                     "distance": 5000, "moving_time": 1500, "{field}": 1e19}}"#
            );
            assert_eq!(StravaAdapter.to_run(&raw, &config()).unwrap(), None);
        }

        let week_long = format!(
            r#"{{"id": 7, "type": "Run", "start_date_local": "2024-01-01T07:00:00Z",
                 "distance": 500000, "moving_time": {MAX_DURATION_S}}}"#
        );
        let run = StravaAdapter.to_run(&week_long, &config()).unwrap().unwrap();
        assert_eq!(run.moving_time_s, 604_800);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(StravaAdapter.to_run("not json", &config()).is_err());
        assert!(StravaAdapter.to_run(r#"{"type": "Run"}"#, &config()).is_err());
    }

    #[test]
    fn test_hr_max_is_threaded() {
        let raw = r#"{"id": 5, "type": "Run", "start_date_local": "2024-01-15T07:30:00Z",
                      "distance": 8000, "moving_time": 2400, "average_heartrate": 150}"#;

        let low_max = PipelineConfig::with_hr_max(170.0);
        let run = StravaAdapter.to_run(raw, &low_max).unwrap().unwrap();
        // 150 / 170 = 0.882
        assert_eq!(run.effort_zone, Some(EffortZone::Z4));
    }

    #[test]
    fn test_parse_start_local_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(6, 15, 0)
            .unwrap();

        assert_eq!(parse_start_local("2024-05-06T06:15:00Z"), Some(expected));
        assert_eq!(parse_start_local("2024-05-06T08:15:00+02:00"), Some(expected));
        assert_eq!(parse_start_local("2024-05-06T06:15:00"), Some(expected));
        assert_eq!(parse_start_local("2024-05-06 06:15:00"), Some(expected));
        assert_eq!(
            parse_start_local("2024-05-06"),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_start_local("  "), None);
        assert_eq!(parse_start_local("2024-13-40T00:00:00Z"), None);
    }
}
