//! # Bio Provider (chlorophyll)
//!
//! Optional secondary source. Chlorophyll sits one level inside each hourly
//! record (`hours[i].chlorophyll.sg`); a record without it is normal and
//! yields `None`. Responses share the day-keyed cache with the tide feed under
//! their own namespace.

use crate::align::align;
use crate::cache::{CacheKey, ResponseCache};
use crate::http::{fetch_body, ProviderError};
use crate::tide_data::WINDOW_HOURS;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const CACHE_NAMESPACE: &str = "bio";

#[async_trait]
pub trait BioProvider: Send + Sync {
    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ProviderError>;
}

/// Stormglass bio client.
pub struct StormglassBio {
    client: Client,
    url: String,
    api_key: String,
}

impl StormglassBio {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        StormglassBio {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl BioProvider for StormglassBio {
    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        info!(lat, lon, %start, %end, "fetching chlorophyll");
        let request = self
            .client
            .get(&self.url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("lat", lat.to_string()),
                ("lng", lon.to_string()),
                ("params", "chlorophyll".to_string()),
                ("source", "sg".to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
            ]);
        fetch_body(request).await
    }
}

/// Hourly chlorophyll readings, sorted by time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChlorophyllSeries {
    pub times: Vec<DateTime<Utc>>,
    pub values: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct RawBioBody {
    hours: Option<Vec<RawBioHour>>,
    errors: Option<Value>,
}

#[derive(Deserialize)]
struct RawBioHour {
    time: String,
    #[serde(default)]
    chlorophyll: Option<RawSourced>,
}

#[derive(Deserialize)]
struct RawSourced {
    #[serde(default)]
    sg: Option<f64>,
}

/// Parse a bio body into a series or the provider's error payload.
pub fn parse_bio_response(body: Value) -> Result<BioResponse, ProviderError> {
    let raw: RawBioBody =
        serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    if let Some(errors) = raw.errors {
        return Ok(BioResponse::Errors(errors));
    }
    let hours = raw
        .hours
        .ok_or_else(|| ProviderError::Malformed("bio body has neither hours nor errors".into()))?;

    let mut readings = hours
        .into_iter()
        .map(|hour| {
            let time = DateTime::parse_from_rfc3339(&hour.time)
                .map_err(|e| ProviderError::Malformed(format!("bio time '{}': {e}", hour.time)))?
                .with_timezone(&Utc);
            Ok((time, hour.chlorophyll.and_then(|c| c.sg)))
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;
    readings.sort_by_key(|(time, _)| *time);

    let (times, values) = readings.into_iter().unzip();
    Ok(BioResponse::Series(ChlorophyllSeries { times, values }))
}

#[derive(Clone, Debug, PartialEq)]
pub enum BioResponse {
    Series(ChlorophyllSeries),
    Errors(Value),
}

/// Cached chlorophyll lookups.
pub struct BioSource {
    cache: Arc<ResponseCache>,
    provider: Arc<dyn BioProvider>,
}

impl BioSource {
    pub fn new(cache: Arc<ResponseCache>, provider: Arc<dyn BioProvider>) -> Self {
        BioSource { cache, provider }
    }

    /// Chlorophyll at the hour best matching `at`, `None` when the provider has no value.
    pub async fn chlorophyll_at(
        &self,
        at: DateTime<Utc>,
        lat: f64,
        lon: f64,
    ) -> Result<Option<f64>, ProviderError> {
        let key = CacheKey::new(CACHE_NAMESPACE, at, lat, lon);
        let window = Duration::hours(WINDOW_HOURS);
        let response = self
            .cache
            .get_or_fetch(&key, parse_bio_response, || {
                self.provider.fetch_window(lat, lon, at - window, at + window)
            })
            .await?;

        match response {
            BioResponse::Errors(errors) => Err(ProviderError::Payload(errors.to_string())),
            BioResponse::Series(series) if series.times.is_empty() => Ok(None),
            BioResponse::Series(series) => {
                let idx = align(&series.times, at)
                    .map_err(|e| ProviderError::Malformed(e.to_string()))?;
                Ok(series.values.get(idx).copied().flatten())
            }
        }
    }
}
