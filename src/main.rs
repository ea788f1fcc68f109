//! # Dive Conditions Entry Point
//!
//! Resolves the conditions for one site and instant and prints them with the
//! model feature vector. Defaults to the configured site and the current time.
//!
//! ```text
//! dive-conditions [--at 2024-06-16T13:20:00Z] [--lat 49.22 --lon -2.13] [--json]
//! dive-conditions --near-hours 3 [--at ...] [--lat ... --lon ...] [--json]
//! ```
//!
//! `--near-hours` skips the providers and prints the archived snapshot closest
//! to `--at` within that many hours, as used when pairing a logged dive with
//! its conditions.

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Duration, Utc};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dive_conditions_lib::{
    config::Config,
    features::{FeatureOverrides, FeatureVector},
    renderer::draw_summary,
    resolver::ConditionsResolver,
    store::SnapshotStore,
    EnvironmentalSnapshot,
};

const DEFAULT_LOG_FILTER: &str = "dive_conditions=info,dive_conditions_lib=info";

/// Value following `flag` on the command line, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    flag_value(args, flag)
        .map(|raw| raw.parse::<T>().map_err(|e| anyhow!("invalid {flag} '{raw}': {e}")))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let json_output = args.iter().any(|a| a == "--json");

    let config = Arc::new(Config::load());
    let at = parse_flag::<DateTime<Utc>>(&args, "--at")?.unwrap_or_else(Utc::now);
    let lat = parse_flag::<f64>(&args, "--lat")?.unwrap_or(config.site.lat);
    let lon = parse_flag::<f64>(&args, "--lon")?.unwrap_or(config.site.lon);

    let store = Arc::new(
        SnapshotStore::open(&config.store.path)
            .with_context(|| format!("opening store at {}", config.store.path.display()))?,
    );

    if let Some(hours) = parse_flag::<i64>(&args, "--near-hours")? {
        let Some(snapshot) = store.closest_to(lat, lon, at, Duration::hours(hours))? else {
            bail!("no archived conditions within {hours}h of {at} for ({lat}, {lon})");
        };
        let features = FeatureVector::from_snapshot(&snapshot);
        return print_result(&snapshot, &features, json_output);
    }

    let resolver = ConditionsResolver::from_config(&config, store)
        .context("building provider clients")?;

    info!(lat, lon, %at, offline = resolver.is_offline(), "resolving conditions");
    let (snapshot, features) = resolver
        .resolve_features(at, lat, lon, &FeatureOverrides::default())
        .await?;

    print_result(&snapshot, &features, json_output)
}

fn print_result(
    snapshot: &EnvironmentalSnapshot,
    features: &FeatureVector,
    json_output: bool,
) -> anyhow::Result<()> {
    if json_output {
        let out = serde_json::json!({
            "snapshot": snapshot,
            "features": features,
            "vector": features.as_array(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", draw_summary(snapshot, features));
    }
    Ok(())
}
