//! # Dive Conditions Core Library
//!
//! Resolves the environmental conditions at a dive site for a given instant and
//! turns them into the feature vector consumed by the visibility model.
//!
//! ## Data Flow
//! 1. **Round**: the query instant is rounded to the nearest hour
//! 2. **Fetch**: marine (wind/wave) and tide series are fetched concurrently;
//!    tide goes through a day-keyed disk cache
//! 3. **Align**: each hourly series is aligned to the rounded instant
//! 4. **Normalize**: wind m/s → knots, wave height m → ft
//! 5. **Derive**: tide phase from the neighbours of the aligned tide sample
//! 6. **Persist**: best-effort insert into the SQLite archive
//! 7. **Enrich**: optional chlorophyll lookup, written back to the archived row
//!
//! With no provider credential the resolver runs offline and serves the most
//! recently stored snapshot for the location instead.
//!
//! ## Core Types
//! - [`EnvironmentalSnapshot`]: one resolved, hour-stamped set of readings
//! - [`TideSeries`]: ordered `(time, height)` samples around a query instant
//! - [`TidePhase`]: rising / falling / slack label

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod align;
pub mod bio;
pub mod cache;
pub mod config;
pub mod features;
pub mod http;
pub mod marine;
pub mod renderer;
pub mod resolver;
pub mod store;
pub mod tide_data;
pub mod units;

#[cfg(test)]
mod tests;

/// Qualitative direction of the tide at an aligned sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TidePhase {
    Rising,
    Falling,
    Slack,
}

impl TidePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TidePhase::Rising => "rising",
            TidePhase::Falling => "falling",
            TidePhase::Slack => "slack",
        }
    }
}

impl fmt::Display for TidePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TidePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(TidePhase::Rising),
            "falling" => Ok(TidePhase::Falling),
            "slack" => Ok(TidePhase::Slack),
            other => Err(format!("unknown tide phase '{other}'")),
        }
    }
}

/// A single tide height reading.
///
/// Heights are metres relative to the provider's datum, so negative values are
/// normal around low water.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideSample {
    pub time: DateTime<Utc>,
    pub height: f64,
}

/// Ordered tide samples covering roughly ±12 hours around a query instant.
///
/// Built once from a provider response and never modified afterward.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use dive_conditions_lib::{TideSample, TideSeries};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap();
/// let series = TideSeries {
///     samples: vec![
///         TideSample { time: t0, height: 1.2 },
///         TideSample { time: t0 + chrono::Duration::hours(1), height: 1.5 },
///     ],
/// };
///
/// assert_eq!(series.times().len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TideSeries {
    pub samples: Vec<TideSample>,
}

impl TideSeries {
    pub fn times(&self) -> Vec<DateTime<Utc>> {
        self.samples.iter().map(|s| s.time).collect()
    }
}

/// One resolved set of environmental readings for a location and hour.
///
/// Units follow the stored record: wind speed in knots, wind direction in
/// degrees, wave height in feet, wave period in seconds, tide height in metres,
/// chlorophyll in mg/m³. Anything the providers could not supply is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub wind_speed: Option<f64>,
    pub wind_dir: Option<f64>,
    pub wave_height: Option<f64>,
    pub wave_period: Option<f64>,
    pub tide_height: Option<f64>,
    pub tide_phase: Option<TidePhase>,
    pub chlorophyll: Option<f64>,
}

impl EnvironmentalSnapshot {
    /// A snapshot with only its key fields set.
    pub fn empty(lat: f64, lon: f64, timestamp: DateTime<Utc>) -> Self {
        EnvironmentalSnapshot {
            lat,
            lon,
            timestamp,
            wind_speed: None,
            wind_dir: None,
            wave_height: None,
            wave_period: None,
            tide_height: None,
            tide_phase: None,
            chlorophyll: None,
        }
    }
}

const SECS_PER_HOUR: i64 = 3600;

/// Round an instant to the nearest whole hour; exactly half past rounds up.
///
/// Works on whole seconds, so any instant chrono can hold is rounded; only the
/// last half hour before `DateTime::MAX_UTC` comes back unchanged.
pub fn round_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    let floor = secs.div_euclid(SECS_PER_HOUR) * SECS_PER_HOUR;
    let rounded = if secs - floor >= SECS_PER_HOUR / 2 {
        floor + SECS_PER_HOUR
    } else {
        floor
    };
    DateTime::from_timestamp(rounded, 0).unwrap_or(t)
}
