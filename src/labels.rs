//! Weekly label generation
//!
//! Pairs each week with the realized distance of the calendar week after it.
//! Weeks whose successor has no row (the latest week, or one followed by a
//! gap) get no label: the target is not yet observable, not zero.

use crate::types::{WeeklyFeatures, WeeklyLabel};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Build next-week distance labels, ordered by week start
pub fn generate_labels(weekly: &[WeeklyFeatures]) -> Vec<WeeklyLabel> {
    let distance_by_week: BTreeMap<NaiveDate, f64> = weekly
        .iter()
        .map(|week| (week.week_start, week.distance_km))
        .collect();

    distance_by_week
        .keys()
        .filter_map(|week_start| {
            let next = *week_start + Duration::days(7);
            distance_by_week.get(&next).map(|distance_km| WeeklyLabel {
                week_start: *week_start,
                y_next_week_distance_km: *distance_km,
            })
        })
        .collect()
}
