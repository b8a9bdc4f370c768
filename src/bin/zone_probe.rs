//! Zone probe - classify one coordinate against the configured zones
//!
//! Usage:
//!   cargo run --bin zone-probe -- --lat 24.0 --lon 122.5
//!   cargo run --bin zone-probe -- --config config/dev.toml --lat 25.1 --lon 121.8

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use vessel_watch::domain::landmarks::{describe_location, nearest_landmark};
use vessel_watch::domain::types::Position;
use vessel_watch::domain::zone::ZoneKind;
use vessel_watch::infra::Config;
use vessel_watch::io::{load_tier, GeoJsonZoneStore, ZoneStore};
use vessel_watch::services::classifier::classify;
use vessel_watch::services::ZoneRegistry;

#[derive(Parser, Debug)]
#[command(name = "zone-probe", about = "Classify a coordinate against the configured zones")]
struct Args {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config).unwrap_or_default();

    let inner = load_tier(config.inner_zone_file(), ZoneKind::Inner, "inner")
        .context("failed to load inner tier")?;
    let outer = load_tier(config.outer_zone_file(), ZoneKind::Outer, "outer")
        .context("failed to load outer tier")?;
    let mut registry = ZoneRegistry::new(inner, outer);
    if let Some(path) = config.custom_zone_file() {
        let zones = GeoJsonZoneStore::new(path)
            .load_custom_zones()
            .with_context(|| format!("failed to load custom zones from {}", path.display()))?;
        registry = registry.with_custom_zones(zones);
    }
    let zones = registry.snapshot();

    let position = Position::new("probe", "probe", args.lat, args.lon, Utc::now())
        .context("coordinate out of range")?;
    let classification = classify(&position, &zones).context("classification failed")?;

    let custom: Vec<_> = classification
        .custom_zones
        .iter()
        .map(|id| json!({ "id": id.0, "name": zones.custom_zone_name(*id) }))
        .collect();
    let nearest = nearest_landmark(config.landmarks(), position.location);

    let output = json!({
        "lat": args.lat,
        "lon": args.lon,
        "tier": classification.tier,
        "distance_to_inner_km": classification.distance_to_inner_km,
        "distance_to_inner_nm": classification.distance_to_inner_nm(),
        "custom_zones": custom,
        "nearest_landmark": nearest,
        "description": describe_location(config.landmarks(), position.location),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
