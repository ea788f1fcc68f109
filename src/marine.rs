//! # Marine Forecast Provider
//!
//! Hourly wind and wave data from the Open-Meteo marine endpoint. One request
//! covers one UTC calendar day. No credential is needed, and any hour may be
//! null in the response.

use crate::align::{align, AlignError};
use crate::http::{fetch_body, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

const HOURLY_FIELDS: &str = "wave_height,wave_period,wind_speed_10m,wind_direction_10m";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[async_trait]
pub trait MarineProvider: Send + Sync {
    /// Hourly marine series for one calendar day at a location.
    async fn fetch_day(&self, lat: f64, lon: f64, day: NaiveDate)
        -> Result<MarineSeries, ProviderError>;
}

/// Hourly arrays indexed by `times`. Provider units: metres, seconds, m/s, degrees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarineSeries {
    pub times: Vec<DateTime<Utc>>,
    pub wave_height: Vec<Option<f64>>,
    pub wave_period: Vec<Option<f64>>,
    pub wind_speed: Vec<Option<f64>>,
    pub wind_direction: Vec<Option<f64>>,
}

/// One aligned hour of marine data, still in provider units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarineReading {
    pub wave_height_m: Option<f64>,
    pub wave_period: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_dir: Option<f64>,
}

impl MarineSeries {
    /// The reading at the hour best matching `target`.
    ///
    /// An array shorter than `times` yields `None` for the missing hours.
    pub fn reading_at(&self, target: DateTime<Utc>) -> Result<MarineReading, AlignError> {
        let idx = align(&self.times, target)?;
        let at = |values: &[Option<f64>]| values.get(idx).copied().flatten();
        Ok(MarineReading {
            wave_height_m: at(&self.wave_height),
            wave_period: at(&self.wave_period),
            wind_speed_ms: at(&self.wind_speed),
            wind_dir: at(&self.wind_direction),
        })
    }
}

#[derive(Deserialize)]
struct RawMarineBody {
    hourly: RawHourly,
}

#[derive(Deserialize)]
struct RawHourly {
    time: Vec<String>,
    #[serde(default)]
    wave_height: Vec<Option<f64>>,
    #[serde(default)]
    wave_period: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_direction_10m: Vec<Option<f64>>,
}

/// Parse an Open-Meteo marine body. Hour stamps are read as UTC.
pub fn parse_marine_response(body: &str) -> Result<MarineSeries, ProviderError> {
    let raw: RawMarineBody =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let times = raw
        .hourly
        .time
        .iter()
        .map(|t| {
            NaiveDateTime::parse_from_str(t, TIME_FORMAT)
                .map(|naive| Utc.from_utc_datetime(&naive))
                .map_err(|e| ProviderError::Malformed(format!("marine time '{t}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MarineSeries {
        times,
        wave_height: raw.hourly.wave_height,
        wave_period: raw.hourly.wave_period,
        wind_speed: raw.hourly.wind_speed_10m,
        wind_direction: raw.hourly.wind_direction_10m,
    })
}

/// Open-Meteo marine client.
pub struct OpenMeteoMarine {
    client: Client,
    url: String,
}

impl OpenMeteoMarine {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        OpenMeteoMarine {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MarineProvider for OpenMeteoMarine {
    async fn fetch_day(
        &self,
        lat: f64,
        lon: f64,
        day: NaiveDate,
    ) -> Result<MarineSeries, ProviderError> {
        info!(lat, lon, %day, "fetching marine forecast");
        let date = day.format("%Y-%m-%d").to_string();
        let request = self.client.get(&self.url).query(&[
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("start_date", date.clone()),
            ("end_date", date),
            ("timezone", "GMT".to_string()),
            ("wind_speed_unit", "ms".to_string()),
        ]);
        let body = fetch_body(request).await?;
        parse_marine_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "latitude": 49.22, "longitude": -2.13,
        "hourly_units": {"wave_height": "m"},
        "hourly": {
            "time": ["2024-06-16T12:00", "2024-06-16T13:00", "2024-06-16T14:00"],
            "wave_height": [0.9, 1.1, null],
            "wave_period": [7.5, 7.8, 8.0],
            "wind_speed_10m": [4.0, 6.0, 8.0],
            "wind_direction_10m": [200, 210, 220]
        }
    }"#;

    #[test]
    fn parses_and_aligns_hourly_arrays() {
        let series = parse_marine_response(BODY).unwrap();
        assert_eq!(series.times.len(), 3);

        let target = Utc.with_ymd_and_hms(2024, 6, 16, 13, 0, 0).unwrap();
        let reading = series.reading_at(target).unwrap();
        assert_eq!(reading.wave_height_m, Some(1.1));
        assert_eq!(reading.wind_speed_ms, Some(6.0));
        assert_eq!(reading.wind_dir, Some(210.0));
    }

    #[test]
    fn null_hours_stay_none() {
        let series = parse_marine_response(BODY).unwrap();
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 14, 0, 0).unwrap();
        let reading = series.reading_at(target).unwrap();
        assert_eq!(reading.wave_height_m, None);
        assert_eq!(reading.wave_period, Some(8.0));
    }

    #[test]
    fn missing_arrays_default_to_none() {
        let body = r#"{"hourly": {"time": ["2024-06-16T00:00"], "wave_height": [0.5]}}"#;
        let series = parse_marine_response(body).unwrap();
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        let reading = series.reading_at(target).unwrap();
        assert_eq!(reading.wave_height_m, Some(0.5));
        assert_eq!(reading.wind_speed_ms, None);
    }

    #[test]
    fn error_body_is_malformed() {
        let body = r#"{"error": true, "reason": "Latitude must be in range of -90 to 90°"}"#;
        assert!(matches!(
            parse_marine_response(body),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn empty_day_fails_to_align() {
        let series = MarineSeries::default();
        let target = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        assert_eq!(series.reading_at(target), Err(AlignError::EmptySeries));
    }
}
