//! # Terminal Rendering
//!
//! Plain-text summary of a resolved snapshot and the feature vector the model
//! will see. Missing readings are shown as `--` next to the default that
//! replaces them.

use crate::features::FeatureVector;
use crate::EnvironmentalSnapshot;
use std::fmt::Write;

const MISSING: &str = "--";

fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.2} {unit}"),
        None => MISSING.to_string(),
    }
}

/// Render a snapshot and its features as an aligned two-column table.
pub fn draw_summary(snapshot: &EnvironmentalSnapshot, features: &FeatureVector) -> String {
    let mut out = String::new();
    let phase = snapshot
        .tide_phase
        .map(|p| p.to_string())
        .unwrap_or_else(|| MISSING.to_string());

    let _ = writeln!(
        out,
        "Conditions at ({:.4}, {:.4}) for {}",
        snapshot.lat,
        snapshot.lon,
        snapshot.timestamp.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "{}", "-".repeat(44));

    let rows = [
        ("Wind speed", reading(snapshot.wind_speed, "kn")),
        ("Wind direction", reading(snapshot.wind_dir, "deg")),
        ("Wave height", reading(snapshot.wave_height, "ft")),
        ("Wave period", reading(snapshot.wave_period, "s")),
        ("Tide height", reading(snapshot.tide_height, "m")),
        ("Tide phase", phase),
        ("Chlorophyll", reading(snapshot.chlorophyll, "mg/m3")),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "{label:<16}{value:>28}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Model features");
    let _ = writeln!(out, "{}", "-".repeat(44));
    let names = [
        "swell_height",
        "swell_period",
        "wind_speed_ms",
        "wind_dir_deg",
        "tide_height",
        "turbidity",
        "chlorophyll",
    ];
    for (name, value) in names.iter().zip(features.as_array()) {
        let _ = writeln!(out, "{name:<16}{value:>28.3}");
    }
    out
}
