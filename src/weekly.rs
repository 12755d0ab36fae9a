//! Weekly aggregation
//!
//! Groups daily rows into Monday-start weeks. Weeks without activity are not
//! synthesized; gap handling belongs to the rolling engine, which works on the
//! daily grain.

use crate::types::{DailyFeatures, RollingLoad, WeeklyFeatures};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

/// The Monday on or before `date`
pub fn week_start_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// The Sunday closing the week that starts on `week_start`
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

/// Aggregate daily rows into weekly rows, ordered by week start.
///
/// Rolling fields and `easy_pct` are left empty; see
/// [`crate::rolling::attach_rolling`].
pub fn aggregate_weekly(daily: &[DailyFeatures]) -> Vec<WeeklyFeatures> {
    let mut ordered: Vec<&DailyFeatures> = daily.iter().collect();
    ordered.sort_by_key(|row| row.date);

    let mut by_week: BTreeMap<NaiveDate, WeeklyFeatures> = BTreeMap::new();

    for row in ordered {
        let week_start = week_start_monday(row.date);
        let week = by_week.entry(week_start).or_insert_with(|| WeeklyFeatures {
            week_start,
            distance_km: 0.0,
            time_min: 0.0,
            elev_m: 0.0,
            trimp: 0.0,
            easy_distance_km: 0.0,
            hard_distance_km: 0.0,
            hard_sessions: 0,
            rolling: RollingLoad::default(),
            easy_pct: None,
        });

        week.distance_km += row.distance_km;
        week.time_min += row.time_min;
        week.elev_m += row.elev_m;
        week.trimp += row.trimp;
        week.easy_distance_km += row.easy_distance_km;
        week.hard_distance_km += row.hard_distance_km;
        if row.is_hard_session() {
            week.hard_sessions += 1;
        }
    }

    by_week.into_values().collect()
}
