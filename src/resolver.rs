//! # Conditions Resolver
//!
//! Produces one [`EnvironmentalSnapshot`] per `(timestamp, lat, lon)` query.
//!
//! ## Online
//! 1. Round the query to the nearest hour
//! 2. Fetch the marine day and the cached tide window concurrently
//! 3. Align both series to the rounded hour; convert wind to knots and wave
//!    height to feet
//! 4. Derive the tide phase from the aligned sample's neighbours
//! 5. Archive the snapshot (best effort)
//! 6. If a bio source is configured, fill in chlorophyll and enrich the
//!    archived row
//!
//! A failing provider only blanks its own fields. Nothing in this path
//! returns an error.
//!
//! ## Offline
//! Without a credential the resolver serves the most recently archived
//! snapshot for the location, whatever time was asked for. Only when there is
//! no such snapshot does `resolve` fail.

use crate::align::align;
use crate::bio::{BioSource, StormglassBio};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::features::{FeatureOverrides, FeatureVector};
use crate::http::{build_client, ProviderError};
use crate::marine::{MarineProvider, MarineReading, OpenMeteoMarine};
use crate::store::{FieldUpdate, SnapshotStore, StoreError};
use crate::tide_data::{tide_phase, StormglassTides, TideCache, TideResponse};
use crate::units::{meters_to_feet, ms_to_knots};
use crate::{round_to_hour, EnvironmentalSnapshot, TidePhase};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ResolveError {
    /// No credential configured and nothing archived for the location
    #[error("no provider credential configured and no stored conditions for ({lat}, {lon})")]
    ConfigMissing { lat: f64, lon: f64 },

    /// The offline lookup could not read the archive
    #[error("snapshot store: {0}")]
    Store(#[from] StoreError),
}

/// Remote sources used in online mode.
pub struct RemoteSources {
    pub marine: Arc<dyn MarineProvider>,
    pub tides: TideCache,
    pub bio: Option<BioSource>,
}

pub struct ConditionsResolver {
    remote: Option<RemoteSources>,
    store: Arc<SnapshotStore>,
}

impl ConditionsResolver {
    pub fn online(remote: RemoteSources, store: Arc<SnapshotStore>) -> Self {
        ConditionsResolver {
            remote: Some(remote),
            store,
        }
    }

    pub fn offline(store: Arc<SnapshotStore>) -> Self {
        ConditionsResolver {
            remote: None,
            store,
        }
    }

    /// Build the HTTP-backed resolver, or an offline one when no credential is set.
    pub fn from_config(config: &Config, store: Arc<SnapshotStore>) -> Result<Self, ProviderError> {
        let Some(api_key) = config.api_key() else {
            info!("no provider credential configured, serving archived conditions");
            return Ok(Self::offline(store));
        };

        let client = build_client(config.request_timeout())?;
        let cache = Arc::new(ResponseCache::new(
            &config.cache.dir,
            config.cache.error_policy,
            Duration::from_secs(config.cache.error_ttl_minutes.saturating_mul(60)),
        ));

        let marine = Arc::new(OpenMeteoMarine::new(
            client.clone(),
            &config.providers.marine_url,
        ));
        let tides = TideCache::new(
            Arc::clone(&cache),
            Arc::new(StormglassTides::new(
                client.clone(),
                &config.providers.tide_url,
                api_key,
            )),
        );
        let bio = config.providers.enable_bio.then(|| {
            BioSource::new(
                cache,
                Arc::new(StormglassBio::new(client, &config.providers.bio_url, api_key)),
            )
        });

        Ok(Self::online(RemoteSources { marine, tides, bio }, store))
    }

    pub fn is_offline(&self) -> bool {
        self.remote.is_none()
    }

    /// Resolve the conditions at `timestamp` for a location.
    pub async fn resolve(
        &self,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
    ) -> Result<EnvironmentalSnapshot, ResolveError> {
        match &self.remote {
            Some(remote) => Ok(self.resolve_online(remote, timestamp, lat, lon).await),
            None => self.resolve_offline(lat, lon),
        }
    }

    /// Resolve, then build the model feature vector from the result.
    pub async fn resolve_features(
        &self,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
        overrides: &FeatureOverrides,
    ) -> Result<(EnvironmentalSnapshot, FeatureVector), ResolveError> {
        let snapshot = self.resolve(timestamp, lat, lon).await?;
        let features = FeatureVector::build(&snapshot, overrides);
        Ok((snapshot, features))
    }

    fn resolve_offline(&self, lat: f64, lon: f64) -> Result<EnvironmentalSnapshot, ResolveError> {
        match self.store.latest_for(lat, lon)? {
            Some(snapshot) => {
                info!(lat, lon, stored_at = %snapshot.timestamp, "serving archived conditions");
                Ok(snapshot)
            }
            None => Err(ResolveError::ConfigMissing { lat, lon }),
        }
    }

    async fn resolve_online(
        &self,
        remote: &RemoteSources,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
    ) -> EnvironmentalSnapshot {
        let dt = round_to_hour(timestamp);

        let (marine, (tide_height, tide_phase)) = tokio::join!(
            marine_reading(remote.marine.as_ref(), dt, lat, lon),
            tide_reading(&remote.tides, dt, lat, lon),
        );

        let mut snapshot = EnvironmentalSnapshot {
            wind_speed: ms_to_knots(marine.wind_speed_ms),
            wind_dir: marine.wind_dir,
            wave_height: meters_to_feet(marine.wave_height_m),
            wave_period: marine.wave_period,
            tide_height,
            tide_phase,
            ..EnvironmentalSnapshot::empty(lat, lon, dt)
        };

        match self.store.insert(&snapshot) {
            Ok(true) => info!(lat, lon, timestamp = %dt, "archived snapshot"),
            Ok(false) => debug!(lat, lon, timestamp = %dt, "snapshot already archived"),
            Err(e) => warn!(lat, lon, timestamp = %dt, error = %e, "failed to archive snapshot"),
        }

        if let Some(bio) = &remote.bio {
            snapshot.chlorophyll = self.enrich_chlorophyll(bio, dt, lat, lon).await;
        }

        snapshot
    }

    async fn enrich_chlorophyll(
        &self,
        bio: &BioSource,
        dt: DateTime<Utc>,
        lat: f64,
        lon: f64,
    ) -> Option<f64> {
        let value = match bio.chlorophyll_at(dt, lat, lon).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(lat, lon, error = %e, "chlorophyll unavailable");
                return None;
            }
        };

        match self
            .store
            .update_field(lat, lon, dt, FieldUpdate::Chlorophyll(Some(value)))
        {
            Ok(true) => debug!(lat, lon, timestamp = %dt, "chlorophyll added to archived snapshot"),
            Ok(false) => debug!(lat, lon, timestamp = %dt, "no archived snapshot to enrich"),
            Err(e) => warn!(lat, lon, error = %e, "failed to store chlorophyll"),
        }
        Some(value)
    }
}

async fn marine_reading(
    marine: &dyn MarineProvider,
    dt: DateTime<Utc>,
    lat: f64,
    lon: f64,
) -> MarineReading {
    let series = match marine.fetch_day(lat, lon, dt.date_naive()).await {
        Ok(series) => series,
        Err(e) => {
            warn!(lat, lon, error = %e, "marine provider unavailable");
            return MarineReading::default();
        }
    };
    series.reading_at(dt).unwrap_or_else(|e| {
        warn!(lat, lon, error = %e, "marine series unusable");
        MarineReading::default()
    })
}

async fn tide_reading(
    tides: &TideCache,
    dt: DateTime<Utc>,
    lat: f64,
    lon: f64,
) -> (Option<f64>, Option<TidePhase>) {
    let series = match tides.get(dt, lat, lon).await {
        Ok(TideResponse::Series(series)) => series,
        Ok(TideResponse::Errors(errors)) => {
            warn!(lat, lon, errors = %errors, "tide provider returned an error payload");
            return (None, None);
        }
        Err(e) => {
            warn!(lat, lon, error = %e, "tide provider unavailable");
            return (None, None);
        }
    };

    match align(&series.times(), dt) {
        Ok(idx) => (Some(series.samples[idx].height), tide_phase(&series, idx)),
        Err(e) => {
            warn!(lat, lon, error = %e, "tide series unusable");
            (None, None)
        }
    }
}
