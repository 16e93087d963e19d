//! Calendar arithmetic for option expiries (ACT/365).

use chrono::NaiveDate;

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Year fraction between `time` and `expiry`; negative once expired.
pub fn time_to_expiry(time: NaiveDate, expiry: NaiveDate) -> f64 {
    annualise((expiry - time).num_days() as f64)
}

pub fn annualise(days: f64) -> f64 {
    days / DAYS_PER_YEAR
}

pub fn deannualise(years: f64) -> f64 {
    years * DAYS_PER_YEAR
}
