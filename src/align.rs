//! # Time Series Alignment
//!
//! Picks the sample of an hourly series that best matches a target instant.
//! An exact hour-key match wins outright; otherwise the sample with the
//! smallest absolute time delta is chosen, earliest index on ties.
//!
//! Series are at most a couple of days of hourly points, so the fallback is
//! a plain linear scan.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

const HOUR_KEY: &str = "%Y-%m-%dT%H:%M";
const TARGET_KEY: &str = "%Y-%m-%dT%H:00";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlignError {
    #[error("cannot align against an empty series")]
    EmptySeries,
}

/// Return the index of the sample in `times` that best matches `target`.
pub fn align(times: &[DateTime<Utc>], target: DateTime<Utc>) -> Result<usize, AlignError> {
    if times.is_empty() {
        return Err(AlignError::EmptySeries);
    }

    let mut by_key: HashMap<String, usize> = HashMap::with_capacity(times.len());
    for (idx, t) in times.iter().enumerate() {
        by_key.entry(t.format(HOUR_KEY).to_string()).or_insert(idx);
    }
    if let Some(&idx) = by_key.get(&target.format(TARGET_KEY).to_string()) {
        return Ok(idx);
    }

    let mut best = 0;
    let mut best_delta = (times[0] - target).num_seconds().abs();
    for (idx, t) in times.iter().enumerate().skip(1) {
        let delta = (*t - target).num_seconds().abs();
        if delta < best_delta {
            best = idx;
            best_delta = delta;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hourly(start: DateTime<Utc>, n: i64) -> Vec<DateTime<Utc>> {
        (0..n).map(|h| start + Duration::hours(h)).collect()
    }

    #[test]
    fn exact_hour_key_matches() {
        let start = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        let times = hourly(start, 24);
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 13, 0, 0).unwrap();
        assert_eq!(align(&times, target), Ok(13));
    }

    #[test]
    fn exact_match_uses_hour_truncated_target() {
        let start = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        let times = hourly(start, 24);
        // 13:50 keys as 13:00 even though 14:00 is closer in time.
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 13, 50, 0).unwrap();
        assert_eq!(align(&times, target), Ok(13));
    }

    #[test]
    fn nearest_sample_when_no_key_matches() {
        let start = Utc.with_ymd_and_hms(2024, 6, 16, 0, 20, 0).unwrap();
        let times = hourly(start, 6);
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 3, 0, 0).unwrap();
        // 02:20 is 40 min away, 03:20 is 20 min away.
        assert_eq!(align(&times, target), Ok(3));
    }

    #[test]
    fn ties_go_to_earliest_index() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 16, 2, 30, 0).unwrap();
        let times = vec![t0, t0 + Duration::hours(1)];
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 3, 0, 0).unwrap();
        assert_eq!(align(&times, target), Ok(0));
    }

    #[test]
    fn target_outside_series_clamps_to_nearest_end() {
        let start = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        let times = hourly(start, 5);
        let far_future = start + Duration::days(3);
        assert_eq!(align(&times, far_future), Ok(4));
    }

    #[test]
    fn empty_series_is_an_error() {
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        assert_eq!(align(&[], target), Err(AlignError::EmptySeries));
    }
}
