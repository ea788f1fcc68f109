//! # Model Feature Vector
//!
//! The visibility model takes a fixed 7-tuple and rejects missing values, so
//! every `None` in a snapshot is replaced by a documented default here, and
//! nowhere earlier.
//!
//! Order: `[swell_height (m), swell_period (s), wind_speed (m/s),
//! wind_dir (deg), tide_height (m), turbidity, chlorophyll (mg/m³)]`.

use crate::units::{feet_to_meters, knots_to_ms};
use crate::EnvironmentalSnapshot;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SWELL_HEIGHT_M: f64 = 1.0;
pub const DEFAULT_SWELL_PERIOD_S: f64 = 10.0;
pub const DEFAULT_WIND_SPEED_MS: f64 = 5.0;
pub const DEFAULT_WIND_DIR_DEG: f64 = 180.0;
pub const DEFAULT_TIDE_HEIGHT_M: f64 = 0.0;
pub const DEFAULT_TURBIDITY: f64 = 1.0;
pub const DEFAULT_CHLOROPHYLL: f64 = 0.5;

const TURBIDITY_MIN: f64 = 0.2;
const TURBIDITY_MAX: f64 = 10.0;

/// Caller-supplied feature values. Any that are set win over the snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureOverrides {
    pub swell_height: Option<f64>,
    pub swell_period: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub tide_height: Option<f64>,
    pub turbidity: Option<f64>,
    pub chlorophyll: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub swell_height: f64,
    pub swell_period: f64,
    pub wind_speed_ms: f64,
    pub wind_dir_deg: f64,
    pub tide_height: f64,
    pub turbidity: f64,
    pub chlorophyll: f64,
}

/// Turbidity estimate used when nothing measured it directly.
///
/// `clamp(1.0 + 0.15 * max(0, wind - 5) + (1.0 if tide < 0), 0.2, 10.0)`
pub fn derive_turbidity(wind_speed_ms: f64, tide_height: f64) -> f64 {
    let wind_term = 0.15 * (wind_speed_ms - 5.0).max(0.0);
    let low_water = if tide_height < 0.0 { 1.0 } else { 0.0 };
    (1.0 + wind_term + low_water).clamp(TURBIDITY_MIN, TURBIDITY_MAX)
}

impl FeatureVector {
    pub fn from_snapshot(snapshot: &EnvironmentalSnapshot) -> Self {
        Self::build(snapshot, &FeatureOverrides::default())
    }

    /// Convert a snapshot to model units, apply overrides, then defaults.
    ///
    /// Derived turbidity uses the wind speed and tide height after defaulting.
    pub fn build(snapshot: &EnvironmentalSnapshot, overrides: &FeatureOverrides) -> Self {
        let swell_height = overrides
            .swell_height
            .or(feet_to_meters(snapshot.wave_height))
            .unwrap_or(DEFAULT_SWELL_HEIGHT_M);
        let swell_period = overrides
            .swell_period
            .or(snapshot.wave_period)
            .unwrap_or(DEFAULT_SWELL_PERIOD_S);
        let wind_speed_ms = overrides
            .wind_speed_ms
            .or(knots_to_ms(snapshot.wind_speed))
            .unwrap_or(DEFAULT_WIND_SPEED_MS);
        let wind_dir_deg = overrides
            .wind_dir_deg
            .or(snapshot.wind_dir)
            .unwrap_or(DEFAULT_WIND_DIR_DEG);
        let tide_height = overrides
            .tide_height
            .or(snapshot.tide_height)
            .unwrap_or(DEFAULT_TIDE_HEIGHT_M);
        let turbidity = overrides
            .turbidity
            .unwrap_or_else(|| derive_turbidity(wind_speed_ms, tide_height));
        let chlorophyll = overrides
            .chlorophyll
            .or(snapshot.chlorophyll)
            .unwrap_or(DEFAULT_CHLOROPHYLL);

        FeatureVector {
            swell_height,
            swell_period,
            wind_speed_ms,
            wind_dir_deg,
            tide_height,
            turbidity,
            chlorophyll,
        }
    }

    pub fn as_array(&self) -> [f64; 7] {
        [
            self.swell_height,
            self.swell_period,
            self.wind_speed_ms,
            self.wind_dir_deg,
            self.tide_height,
            self.turbidity,
            self.chlorophyll,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{meters_to_feet, ms_to_knots};
    use chrono::{TimeZone, Utc};

    fn bare() -> EnvironmentalSnapshot {
        let t = Utc.with_ymd_and_hms(2024, 6, 16, 13, 0, 0).unwrap();
        EnvironmentalSnapshot::empty(49.22, -2.13, t)
    }

    #[test]
    fn turbidity_examples() {
        assert!((derive_turbidity(10.0, -0.5) - 2.75).abs() < 1e-12);
        assert_eq!(derive_turbidity(2.0, 1.0), 1.0);
    }

    #[test]
    fn turbidity_is_clamped() {
        assert_eq!(derive_turbidity(200.0, -1.0), 10.0);
        assert_eq!(derive_turbidity(5.0, 0.0), 1.0);
    }

    #[test]
    fn all_missing_uses_documented_defaults() {
        let features = FeatureVector::from_snapshot(&bare());
        assert_eq!(features.as_array(), [1.0, 10.0, 5.0, 180.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn snapshot_units_are_converted_back_for_the_model() {
        let snapshot = EnvironmentalSnapshot {
            wind_speed: ms_to_knots(Some(10.0)),
            wind_dir: Some(250.0),
            wave_height: meters_to_feet(Some(1.5)),
            wave_period: Some(8.0),
            tide_height: Some(-0.5),
            chlorophyll: Some(0.8),
            ..bare()
        };
        let f = FeatureVector::from_snapshot(&snapshot);
        assert!((f.swell_height - 1.5).abs() < 1e-9);
        assert!((f.wind_speed_ms - 10.0).abs() < 1e-4);
        assert_eq!(f.wind_dir_deg, 250.0);
        assert_eq!(f.tide_height, -0.5);
        assert!((f.turbidity - derive_turbidity(f.wind_speed_ms, -0.5)).abs() < 1e-12);
        assert_eq!(f.chlorophyll, 0.8);
    }

    #[test]
    fn overrides_win_and_supplied_turbidity_is_used_verbatim() {
        let snapshot = EnvironmentalSnapshot {
            tide_height: Some(1.2),
            ..bare()
        };
        let overrides = FeatureOverrides {
            wind_speed_ms: Some(12.0),
            tide_height: Some(-0.3),
            turbidity: Some(4.4),
            ..FeatureOverrides::default()
        };
        let f = FeatureVector::build(&snapshot, &overrides);
        assert_eq!(f.wind_speed_ms, 12.0);
        assert_eq!(f.tide_height, -0.3);
        assert_eq!(f.turbidity, 4.4);
    }

    #[test]
    fn derived_turbidity_follows_overridden_inputs() {
        let overrides = FeatureOverrides {
            wind_speed_ms: Some(10.0),
            tide_height: Some(-0.5),
            ..FeatureOverrides::default()
        };
        let f = FeatureVector::build(&bare(), &overrides);
        assert!((f.turbidity - 2.75).abs() < 1e-12);
    }
}
