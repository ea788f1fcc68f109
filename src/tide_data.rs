//! # Tide Data Fetching and Caching
//!
//! Fetches sea-level series from the Stormglass tide endpoint and puts the
//! day-keyed [`ResponseCache`] in front of it, so all queries for one site on
//! one UTC day cost a single remote call.
//!
//! ## Data Source
//! - **Endpoint**: `tide/sea-level/point`, authorised by the API key header
//! - **Window**: `[t - 12h, t + 12h]` around the first query of the day
//! - **Format**: `{"data": [{"sg": 1.23, "time": "...+00:00"}, ...]}` on
//!   success, `{"errors": {...}}` on quota or auth failures
//!
//! ## Tide Phase
//! The phase at an aligned sample comes from its two neighbours: rising when
//! the next height is above the previous, falling when below, slack when
//! equal. The first and last samples have no phase.

use crate::cache::{CacheKey, ResponseCache};
use crate::http::{fetch_body, ProviderError};
use crate::{TidePhase, TideSample, TideSeries};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Hours fetched either side of the query instant.
pub const WINDOW_HOURS: i64 = 12;

const CACHE_NAMESPACE: &str = "tide";

/// Source of raw tide responses.
#[async_trait]
pub trait TideProvider: Send + Sync {
    /// Fetch the raw body covering `[start, end]` at a location.
    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ProviderError>;
}

/// Stormglass sea-level client.
pub struct StormglassTides {
    client: Client,
    url: String,
    api_key: String,
}

impl StormglassTides {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        StormglassTides {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TideProvider for StormglassTides {
    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        info!(lat, lon, %start, %end, "fetching tide window");
        let request = self
            .client
            .get(&self.url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("lat", lat.to_string()),
                ("lng", lon.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
            ]);
        fetch_body(request).await
    }
}

/// A parsed tide response: either a series or the provider's error payload.
#[derive(Clone, Debug, PartialEq)]
pub enum TideResponse {
    Series(TideSeries),
    Errors(Value),
}

#[derive(Deserialize)]
struct RawTideBody {
    data: Option<Vec<RawTidePoint>>,
    errors: Option<Value>,
}

#[derive(Deserialize)]
struct RawTidePoint {
    time: String,
    sg: Option<f64>,
}

/// Parse a raw tide body.
///
/// Points with a null height are dropped rather than filled in. The series is
/// sorted by time.
pub fn parse_tide_response(body: Value) -> Result<TideResponse, ProviderError> {
    let raw: RawTideBody =
        serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if let Some(errors) = raw.errors {
        return Ok(TideResponse::Errors(errors));
    }
    let points = raw
        .data
        .ok_or_else(|| ProviderError::Malformed("tide body has neither data nor errors".into()))?;

    let mut samples = Vec::with_capacity(points.len());
    for point in points {
        let time = DateTime::parse_from_rfc3339(&point.time)
            .map_err(|e| ProviderError::Malformed(format!("tide time '{}': {e}", point.time)))?
            .with_timezone(&Utc);
        if let Some(height) = point.sg {
            samples.push(TideSample { time, height });
        }
    }
    samples.sort_by_key(|s| s.time);

    Ok(TideResponse::Series(TideSeries { samples }))
}

/// Day-keyed cache in front of a [`TideProvider`].
pub struct TideCache {
    cache: Arc<ResponseCache>,
    provider: Arc<dyn TideProvider>,
}

impl TideCache {
    pub fn new(cache: Arc<ResponseCache>, provider: Arc<dyn TideProvider>) -> Self {
        TideCache { cache, provider }
    }

    /// Tide response for the calendar day of `at` at the rounded location.
    ///
    /// A cached entry is returned as-is, error payloads included, subject to
    /// the cache's error policy.
    pub async fn get(
        &self,
        at: DateTime<Utc>,
        lat: f64,
        lon: f64,
    ) -> Result<TideResponse, ProviderError> {
        let key = CacheKey::new(CACHE_NAMESPACE, at, lat, lon);
        let window = Duration::hours(WINDOW_HOURS);
        self.cache
            .get_or_fetch(&key, parse_tide_response, || {
                self.provider.fetch_window(lat, lon, at - window, at + window)
            })
            .await
    }
}

/// Tide phase at `idx`, or `None` when `idx` has no neighbour on one side.
pub fn tide_phase(series: &TideSeries, idx: usize) -> Option<TidePhase> {
    if idx == 0 || idx + 1 >= series.samples.len() {
        return None;
    }
    let before = series.samples[idx - 1].height;
    let after = series.samples[idx + 1].height;

    if after > before {
        Some(TidePhase::Rising)
    } else if after < before {
        Some(TidePhase::Falling)
    } else {
        Some(TidePhase::Slack)
    }
}
