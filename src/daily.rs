//! Daily aggregation
//!
//! Groups run records by local start date into one row per active date. The
//! output is sparse: dates without a run get no row here.

use crate::config::UnknownZonePolicy;
use crate::types::{DailyFeatures, RunRecord};
use std::collections::BTreeMap;

/// Easy/hard bucket a run's volume is booked into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Easy,
    Hard,
    Neither,
}

fn bucket_for(run: &RunRecord, policy: UnknownZonePolicy) -> Bucket {
    match (run.effort_zone, policy) {
        (Some(zone), _) if zone.is_hard() => Bucket::Hard,
        (Some(_), _) => Bucket::Easy,
        (None, UnknownZonePolicy::CountAsEasy) => Bucket::Easy,
        (None, UnknownZonePolicy::Exclude) => Bucket::Neither,
    }
}

#[derive(Default)]
struct DayAccumulator {
    run_count: u32,
    distance_m: f64,
    moving_time_s: i64,
    elev_m: f64,
    hr_sum: f64,
    hr_count: u32,
    trimp: f64,
    easy_distance_m: f64,
    hard_distance_m: f64,
    easy_time_s: i64,
    hard_time_s: i64,
}

impl DayAccumulator {
    fn add(&mut self, run: &RunRecord, policy: UnknownZonePolicy) {
        self.run_count += 1;
        self.distance_m += run.distance_m;
        self.moving_time_s = self.moving_time_s.saturating_add(run.moving_time_s);
        self.elev_m += run.elev_gain_m;
        self.trimp += run.trimp;

        if let Some(hr) = run.avg_hr.filter(|hr| !hr.is_nan()) {
            self.hr_sum += hr;
            self.hr_count += 1;
        }

        match bucket_for(run, policy) {
            Bucket::Easy => {
                self.easy_distance_m += run.distance_m;
                self.easy_time_s = self.easy_time_s.saturating_add(run.moving_time_s);
            }
            Bucket::Hard => {
                self.hard_distance_m += run.distance_m;
                self.hard_time_s = self.hard_time_s.saturating_add(run.moving_time_s);
            }
            Bucket::Neither => {}
        }
    }

    fn finish(self, date: chrono::NaiveDate) -> DailyFeatures {
        DailyFeatures {
            date,
            run_count: self.run_count,
            distance_km: self.distance_m / 1000.0,
            time_min: self.moving_time_s as f64 / 60.0,
            elev_m: self.elev_m,
            avg_hr_mean: (self.hr_count > 0).then(|| self.hr_sum / self.hr_count as f64),
            trimp: self.trimp,
            easy_distance_km: self.easy_distance_m / 1000.0,
            hard_distance_km: self.hard_distance_m / 1000.0,
            easy_time_min: self.easy_time_s as f64 / 60.0,
            hard_time_min: self.hard_time_s as f64 / 60.0,
        }
    }
}

/// Aggregate run records into per-date rows, ordered by date.
///
/// Runs are summed in (date, activity id) order so the result does not depend
/// on input order.
pub fn aggregate_daily(runs: &[RunRecord], policy: UnknownZonePolicy) -> Vec<DailyFeatures> {
    let mut ordered: Vec<&RunRecord> = runs.iter().collect();
    ordered.sort_by_key(|run| (run.start_date_local, run.activity_id));

    let mut by_date: BTreeMap<chrono::NaiveDate, DayAccumulator> = BTreeMap::new();
    for run in ordered {
        by_date
            .entry(run.start_date_local)
            .or_default()
            .add(run, policy);
    }

    by_date
        .into_iter()
        .map(|(date, acc)| acc.finish(date))
        .collect()
}
