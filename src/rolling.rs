//! Rolling load engine
//!
//! This module turns the sparse daily table into a gap-filled calendar and
//! computes trailing-window load metrics over it:
//! - 7-day (acute) and 28-day (chronic) distance and load sums
//! - Acute:chronic workload ratio
//! - 7-day monotony and strain
//!
//! The daily values are then sampled at the end of each week and attached to
//! the weekly rows.

use crate::types::{DailyFeatures, DailyLoadPoint, RollingLoad, WeeklyFeatures};
use crate::weekly::week_end;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Acute window length in days
pub const ACUTE_WINDOW_DAYS: usize = 7;

/// Chronic window length in days
pub const CHRONIC_WINDOW_DAYS: usize = 28;

/// Standard deviations at or below this are treated as zero
const STD_DEV_EPSILON: f64 = 1e-9;

/// Reindex the sparse daily table onto every date between its first and last
/// row. Missing dates get zero volume and load and no heart rate.
pub fn daily_calendar(daily: &[DailyFeatures]) -> Vec<DailyLoadPoint> {
    let by_date: BTreeMap<NaiveDate, &DailyFeatures> =
        daily.iter().map(|row| (row.date, row)).collect();

    let (first, last) = match (by_date.keys().next(), by_date.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| match by_date.get(&date) {
            Some(row) => DailyLoadPoint {
                date,
                distance_km: row.distance_km,
                time_min: row.time_min,
                elev_m: row.elev_m,
                trimp: row.trimp,
                avg_hr_mean: row.avg_hr_mean,
            },
            None => DailyLoadPoint {
                date,
                distance_km: 0.0,
                time_min: 0.0,
                elev_m: 0.0,
                trimp: 0.0,
                avg_hr_mean: None,
            },
        })
        .collect()
}

/// Fixed-length trailing window over a dense daily series
#[derive(Debug, Clone)]
struct TrailingWindow {
    values: VecDeque<f64>,
    window_size: usize,
}

impl TrailingWindow {
    fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.window_size {
            self.values.pop_front();
        }
    }

    fn is_full(&self) -> bool {
        self.values.len() == self.window_size
    }

    /// Sum over the window; absent until the window has filled
    fn sum(&self) -> Option<f64> {
        self.is_full().then(|| self.values.iter().sum())
    }

    /// Mean over sample standard deviation; absent for a flat window
    fn monotony(&self) -> Option<f64> {
        if !self.is_full() || self.window_size < 2 {
            return None;
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std_dev = variance.sqrt();

        if std_dev <= STD_DEV_EPSILON {
            return None;
        }
        Some(mean / std_dev)
    }
}

/// Acute load over weekly-normalized chronic load; absent when chronic is 0
pub fn acute_chronic_ratio(acute: Option<f64>, chronic: Option<f64>) -> Option<f64> {
    match (acute, chronic) {
        (Some(acute), Some(chronic)) if chronic > 0.0 => {
            let weeks = (CHRONIC_WINDOW_DAYS / ACUTE_WINDOW_DAYS) as f64;
            Some(acute / (chronic / weeks))
        }
        _ => None,
    }
}

/// Compute trailing-window metrics for every date of a gap-filled calendar.
///
/// The calendar must be dense and ascending, as produced by [`daily_calendar`].
pub fn rolling_loads(calendar: &[DailyLoadPoint]) -> Vec<(NaiveDate, RollingLoad)> {
    let mut dist_acute = TrailingWindow::new(ACUTE_WINDOW_DAYS);
    let mut dist_chronic = TrailingWindow::new(CHRONIC_WINDOW_DAYS);
    let mut trimp_acute = TrailingWindow::new(ACUTE_WINDOW_DAYS);
    let mut trimp_chronic = TrailingWindow::new(CHRONIC_WINDOW_DAYS);

    let mut results = Vec::with_capacity(calendar.len());

    for point in calendar {
        dist_acute.push(point.distance_km);
        dist_chronic.push(point.distance_km);
        trimp_acute.push(point.trimp);
        trimp_chronic.push(point.trimp);

        let trimp_7d = trimp_acute.sum();
        let trimp_28d = trimp_chronic.sum();
        let monotony_7d = trimp_acute.monotony();
        let strain_7d = match (trimp_7d, monotony_7d) {
            (Some(load), Some(monotony)) => Some(load * monotony),
            _ => None,
        };

        results.push((
            point.date,
            RollingLoad {
                dist_7d: dist_acute.sum(),
                dist_28d: dist_chronic.sum(),
                trimp_7d,
                trimp_28d,
                acwr: acute_chronic_ratio(trimp_7d, trimp_28d),
                monotony_7d,
                strain_7d,
            },
        ));
    }

    results
}

/// Attach rolling metrics to weekly rows and fill in `easy_pct`.
///
/// Each week is sampled at its Sunday, or at the last calendar date when the
/// series ends mid-week.
pub fn attach_rolling(
    weekly: Vec<WeeklyFeatures>,
    loads: &[(NaiveDate, RollingLoad)],
) -> Vec<WeeklyFeatures> {
    let last_date = loads.last().map(|(date, _)| *date);
    let by_date: HashMap<NaiveDate, &RollingLoad> =
        loads.iter().map(|(date, load)| (*date, load)).collect();

    weekly
        .into_iter()
        .map(|mut week| {
            let sample_date = match last_date {
                Some(last) => week_end(week.week_start).min(last),
                None => week_end(week.week_start),
            };
            week.rolling = by_date
                .get(&sample_date)
                .map(|load| (*load).clone())
                .unwrap_or_default();
            week.easy_pct = if week.distance_km > 0.0 {
                Some(week.easy_distance_km / week.distance_km)
            } else {
                None
            };
            week
        })
        .collect()
}
