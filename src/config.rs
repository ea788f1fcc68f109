//! # Configuration Management
//!
//! Loads runtime settings from `conditions-config.toml`: the default dive site,
//! provider endpoints and credential, cache location and error-payload policy,
//! and the archive database path.
//!
//! The configuration is read once at startup and handed to the resolver by
//! reference; nothing mutates it afterward.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "conditions-config.toml";

/// Environment variable that overrides `providers.api_key`.
pub const API_KEY_ENV: &str = "STORMGLASS_API_KEY";

/// Application configuration loaded from conditions-config.toml
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    pub providers: ProviderConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
}

/// Default query location used by the binary
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Human-readable site name for reference
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Remote provider endpoints and credential
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Open-Meteo marine forecast endpoint (no credential needed)
    pub marine_url: String,
    /// Stormglass sea-level endpoint
    pub tide_url: String,
    /// Stormglass bio endpoint (chlorophyll)
    pub bio_url: String,
    /// Stormglass credential. Absent means offline mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Fetch chlorophyll when a credential is present
    pub enable_bio: bool,
}

/// How cached provider error payloads are treated.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCachePolicy {
    /// Error payloads live under the day key like successes and are never retried that day.
    Sticky,
    /// Error payloads live under their own key and are honoured for `error_ttl_minutes`.
    Expiring,
    /// Error payloads are returned but never written.
    Never,
}

/// Day-keyed response cache settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub error_policy: ErrorCachePolicy,
    pub error_ttl_minutes: u64,
}

/// Snapshot archive settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            site: SiteConfig {
                name: "St Catherine's Breakwater, Jersey".to_string(),
                lat: 49.22,
                lon: -2.13,
            },
            providers: ProviderConfig {
                marine_url: "https://marine-api.open-meteo.com/v1/marine".to_string(),
                tide_url: "https://api.stormglass.io/v2/tide/sea-level/point".to_string(),
                bio_url: "https://api.stormglass.io/v2/bio/point".to_string(),
                api_key: None,
                timeout_secs: 10,
                enable_bio: true,
            },
            cache: CacheConfig {
                dir: PathBuf::from("cache"),
                error_policy: ErrorCachePolicy::Expiring,
                error_ttl_minutes: 30,
            },
            store: StoreConfig {
                path: PathBuf::from("data/visibility.db"),
            },
        }
    }
}

impl Config {
    /// Load configuration from conditions-config.toml, then apply the
    /// credential environment override.
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).with_env_credential(std::env::var(API_KEY_ENV).ok())
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(site = %config.site.name, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "invalid config file, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Replace the credential with `value` when it is set and non-empty.
    pub fn with_env_credential(mut self, value: Option<String>) -> Self {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.providers.api_key = Some(key);
        }
        self
    }

    /// The credential, if one is configured and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.providers
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout_secs)
    }

    /// Save configuration as pretty TOML
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}
