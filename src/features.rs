//! Per-run feature derivation
//!
//! This module derives the per-activity metrics the aggregators consume:
//! - Effort zone from average heart rate
//! - Heart-rate weighted load proxy (TRIMP)
//! - Pace

use crate::types::EffortZone;

/// Upper bound (exclusive) of zone 1 as a fraction of HRmax
pub const ZONE1_CEILING: f64 = 0.70;
/// Upper bound (exclusive) of zone 2 as a fraction of HRmax
pub const ZONE2_CEILING: f64 = 0.80;
/// Upper bound (exclusive) of zone 3 as a fraction of HRmax
pub const ZONE3_CEILING: f64 = 0.87;

/// Treat NaN the same as a missing reading
fn known(hr: Option<f64>) -> Option<f64> {
    hr.filter(|v| !v.is_nan())
}

/// Classify average heart rate into one of four effort zones.
///
/// Band boundaries are closed on the low end: exactly 70% of HRmax is zone 2.
pub fn zone_from_avg_hr(avg_hr: Option<f64>, hr_max: f64) -> Option<EffortZone> {
    let hr = known(avg_hr)?;

    let zone = if hr < ZONE1_CEILING * hr_max {
        EffortZone::Z1
    } else if hr < ZONE2_CEILING * hr_max {
        EffortZone::Z2
    } else if hr < ZONE3_CEILING * hr_max {
        EffortZone::Z3
    } else {
        EffortZone::Z4
    };

    Some(zone)
}

/// Training impulse proxy: `moving_minutes * (avg_hr / hr_max)^2`.
///
/// Unknown heart rate contributes 0.0 so it sums without distorting means.
pub fn trimp_proxy(moving_time_min: f64, avg_hr: Option<f64>, hr_max: f64) -> f64 {
    match known(avg_hr) {
        Some(hr) => {
            let intensity = hr / hr_max;
            moving_time_min * intensity * intensity
        }
        None => 0.0,
    }
}

/// Pace in seconds per km, absent for zero distance
pub fn pace_s_per_km(moving_time_s: i64, distance_m: f64) -> Option<f64> {
    if distance_m > 0.0 {
        Some(moving_time_s as f64 / (distance_m / 1000.0))
    } else {
        None
    }
}
