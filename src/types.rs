//! Core types for the training-load pipeline
//!
//! This module defines the tables that flow through each stage of the
//! pipeline: run records, daily features, weekly features and weekly labels.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Four-band effort classification relative to maximum heart rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EffortZone {
    Z1 = 1,
    Z2 = 2,
    Z3 = 3,
    Z4 = 4,
}

impl EffortZone {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EffortZone::Z1),
            2 => Some(EffortZone::Z2),
            3 => Some(EffortZone::Z3),
            4 => Some(EffortZone::Z4),
            _ => None,
        }
    }

    /// Zones 3 and 4 count as hard effort
    pub fn is_hard(&self) -> bool {
        matches!(self, EffortZone::Z3 | EffortZone::Z4)
    }
}

impl From<EffortZone> for u8 {
    fn from(zone: EffortZone) -> Self {
        zone.as_u8()
    }
}

impl TryFrom<u8> for EffortZone {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        EffortZone::from_u8(value).ok_or_else(|| format!("effort zone out of range: {value}"))
    }
}

/// One completed run activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Upstream activity id (primary key)
    pub activity_id: i64,
    /// Local start date
    pub start_date_local: NaiveDate,
    /// Local start time
    pub start_time_local: NaiveTime,
    /// Distance (meters)
    pub distance_m: f64,
    /// Moving time (seconds)
    pub moving_time_s: i64,
    /// Elapsed time (seconds), when reported
    pub elapsed_time_s: Option<i64>,
    /// Elevation gain (meters)
    pub elev_gain_m: f64,
    /// Average heart rate (bpm)
    pub avg_hr: Option<f64>,
    /// Maximum heart rate (bpm)
    pub max_hr: Option<f64>,
    /// Average speed (m/s)
    pub avg_speed_mps: Option<f64>,
    /// Pace (seconds per km); absent for zero-distance runs
    pub pace_s_per_km: Option<f64>,
    /// Heart-rate weighted load proxy; 0.0 when heart rate is unknown
    pub trimp: f64,
    /// Effort zone; absent when heart rate is unknown
    pub effort_zone: Option<EffortZone>,
}

/// Per-date aggregate of run records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFeatures {
    pub date: NaiveDate,
    pub run_count: u32,
    pub distance_km: f64,
    pub time_min: f64,
    pub elev_m: f64,
    /// Mean of the known average heart rates of the day
    pub avg_hr_mean: Option<f64>,
    pub trimp: f64,
    pub easy_distance_km: f64,
    pub hard_distance_km: f64,
    pub easy_time_min: f64,
    pub hard_time_min: f64,
}

impl DailyFeatures {
    /// A day counts as a hard session when any hard-zone volume was logged
    pub fn is_hard_session(&self) -> bool {
        self.hard_distance_km > 0.0 || self.hard_time_min > 0.0
    }
}

/// One day of the gap-filled calendar, zeroed where no run happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoadPoint {
    pub date: NaiveDate,
    pub distance_km: f64,
    pub time_min: f64,
    pub elev_m: f64,
    pub trimp: f64,
    pub avg_hr_mean: Option<f64>,
}

/// Trailing-window load metrics evaluated at one date
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingLoad {
    pub dist_7d: Option<f64>,
    pub dist_28d: Option<f64>,
    pub trimp_7d: Option<f64>,
    pub trimp_28d: Option<f64>,
    /// Acute:chronic workload ratio
    pub acwr: Option<f64>,
    pub monotony_7d: Option<f64>,
    pub strain_7d: Option<f64>,
}

/// Per-week aggregate keyed by the Monday the week starts on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyFeatures {
    pub week_start: NaiveDate,
    pub distance_km: f64,
    pub time_min: f64,
    pub elev_m: f64,
    pub trimp: f64,
    pub easy_distance_km: f64,
    pub hard_distance_km: f64,
    /// Days in the week with any hard-zone volume
    pub hard_sessions: u32,
    #[serde(flatten)]
    pub rolling: RollingLoad,
    /// Easy share of the weekly distance (0-1)
    pub easy_pct: Option<f64>,
}

/// Supervised target: realized distance of the following week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyLabel {
    pub week_start: NaiveDate,
    pub y_next_week_distance_km: f64,
}

/// Outcome of one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            rows_read: 0,
            rows_written: 0,
            rows_skipped: 0,
        }
    }
}

/// Pipeline stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Runs,
    Daily,
    Weekly,
    Labels,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Runs => "runs",
            Stage::Daily => "daily",
            Stage::Weekly => "weekly",
            Stage::Labels => "labels",
        }
    }
}

/// All derived tables produced from one set of run records
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureTables {
    pub daily: Vec<DailyFeatures>,
    pub weekly: Vec<WeeklyFeatures>,
    pub labels: Vec<WeeklyLabel>,
}
