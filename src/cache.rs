//! # Day-Keyed Response Cache
//!
//! Raw provider responses are cached on disk, one file per
//! `(namespace, calendar day, lat, lon)`, with coordinates formatted to two
//! decimal places. Every query for the same site on the same UTC day shares
//! one remote call.
//!
//! ## Layout
//! - **Location**: the configured cache directory
//! - **File name**: `tide_49_22_-2_13_2024-06-16.json`
//! - **Contents**: the provider body exactly as received
//! - **Expiry**: none for successful responses
//!
//! ## Error payloads
//! A structured `errors` body is a valid response, not a transport failure.
//! What happens to it depends on [`ErrorCachePolicy`]:
//! - `Sticky`: stored under the day key, so the failure stands for the rest of
//!   that day at that location
//! - `Expiring`: stored under a separate `<ns>-err_` key and ignored once older
//!   than the configured TTL
//! - `Never`: not stored
//!
//! ## Concurrency
//! Entries are written to a temporary file in the cache directory and renamed
//! into place, so a reader sees either the previous state or a complete file.
//! Two callers racing on the same key may both fetch; the last rename wins.

use crate::config::ErrorCachePolicy;
use crate::http::ProviderError;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("stale error entry")]
    Expired,
}

/// Identifies one cached provider response.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheKey {
    pub namespace: &'static str,
    pub day: NaiveDate,
    pub lat: f64,
    pub lon: f64,
}

impl CacheKey {
    pub fn new(namespace: &'static str, at: DateTime<Utc>, lat: f64, lon: f64) -> Self {
        CacheKey {
            namespace,
            day: at.date_naive(),
            lat,
            lon,
        }
    }

    fn stem(&self) -> String {
        let lat = format!("{:.2}", self.lat).replace('.', "_");
        let lon = format!("{:.2}", self.lon).replace('.', "_");
        format!("{}_{}_{}", lat, lon, self.day.format("%Y-%m-%d"))
    }

    /// File name for a successful (or sticky) entry.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.namespace, self.stem())
    }

    /// File name for an expiring error entry.
    pub fn error_file_name(&self) -> String {
        format!("{}-err_{}.json", self.namespace, self.stem())
    }
}

/// True when a provider body is a structured error rather than data.
pub fn is_error_payload(body: &Value) -> bool {
    body.get("errors").is_some()
}

pub struct ResponseCache {
    dir: PathBuf,
    policy: ErrorCachePolicy,
    error_ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, policy: ErrorCachePolicy, error_ttl: Duration) -> Self {
        ResponseCache {
            dir: dir.into(),
            policy,
            error_ttl,
        }
    }

    /// Return the cached response for `key`, or fetch, cache and return it.
    ///
    /// `parse` turns a body into the caller's response type. A cached entry
    /// that is unreadable or that `parse` rejects counts as a miss; a fetched
    /// body that `parse` rejects is not cached. Cache write failures are
    /// logged and otherwise ignored.
    pub async fn get_or_fetch<T, P, F, Fut>(
        &self,
        key: &CacheKey,
        parse: P,
        fetch: F,
    ) -> Result<T, ProviderError>
    where
        P: Fn(Value) -> Result<T, ProviderError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        if let Some(cached) = self.lookup(key) {
            match parse(cached) {
                Ok(response) => return Ok(response),
                Err(e) => warn!(
                    file = %key.file_name(),
                    error = %e,
                    "cached entry has unexpected shape, refetching"
                ),
            }
        }

        let body = fetch().await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let is_error = is_error_payload(&value);
        let response = parse(value)?;

        if let Err(e) = self.store(key, &body, is_error) {
            warn!(file = %key.file_name(), error = %e, "failed to write cache entry");
        }
        Ok(response)
    }

    /// Look up a cached body, honouring the error policy.
    pub fn lookup(&self, key: &CacheKey) -> Option<Value> {
        let day_path = self.dir.join(key.file_name());
        match read_entry(&day_path, None) {
            Ok(value) => {
                debug!(file = %key.file_name(), "cache hit");
                return Some(value);
            }
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %key.file_name(), error = %e, "ignoring unreadable cache entry"),
        }

        if self.policy == ErrorCachePolicy::Expiring {
            let err_path = self.dir.join(key.error_file_name());
            match read_entry(&err_path, Some(self.error_ttl)) {
                Ok(value) => {
                    debug!(file = %key.error_file_name(), "cached error payload still fresh");
                    return Some(value);
                }
                Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(file = %key.error_file_name(), error = %e, "error entry not usable")
                }
            }
        }
        None
    }

    /// Write a raw body under the key the policy selects.
    pub fn store(&self, key: &CacheKey, body: &str, is_error: bool) -> Result<(), CacheError> {
        let file_name = match (is_error, self.policy) {
            (false, _) | (true, ErrorCachePolicy::Sticky) => key.file_name(),
            (true, ErrorCachePolicy::Expiring) => key.error_file_name(),
            (true, ErrorCachePolicy::Never) => return Ok(()),
        };
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.dir, &self.dir.join(file_name), body.as_bytes())
    }
}

fn read_entry(path: &Path, ttl: Option<Duration>) -> Result<Value, CacheError> {
    if let Some(ttl) = ttl {
        let age = SystemTime::now()
            .duration_since(fs::metadata(path)?.modified()?)
            .unwrap_or_default();
        if age > ttl {
            return Err(CacheError::Expired);
        }
    }
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
