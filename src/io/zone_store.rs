//! GeoJSON zone loading
//!
//! Fixed tiers: every ring of every feature becomes one part of the tier zone.
//! `Polygon` and `MultiPolygon` contribute their outer rings (holes are
//! ignored), `LineString` and `MultiLineString` lines are closed into rings.
//! Any invalid ring fails the whole tier.
//!
//! Custom zones: one zone per feature, id from `properties.id` (or the
//! feature `id`), name from `properties.name`. Invalid features are skipped
//! with a warning.

use crate::domain::geometry::{LatLon, Polygon};
use crate::domain::types::ZoneId;
use crate::domain::zone::{Zone, ZoneKind};
use crate::error::GeometryLoadError;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Source of the custom zone list, re-read every cycle
pub trait ZoneStore: Send + Sync {
    fn load_custom_zones(&self) -> Result<Vec<Zone>, GeometryLoadError>;
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

fn read_collection(path: &Path) -> Result<FeatureCollection, GeometryLoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| GeometryLoadError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&content)
        .map_err(|source| GeometryLoadError::Parse { path: path.to_path_buf(), source })
}

/// `[lon, lat, ...]` positions into lat/lon pairs; malformed entries become NaN
fn parse_line(coords: &Value) -> Vec<LatLon> {
    coords
        .as_array()
        .map(|points| {
            points
                .iter()
                .map(|pt| {
                    let lon = pt.get(0).and_then(Value::as_f64).unwrap_or(f64::NAN);
                    let lat = pt.get(1).and_then(Value::as_f64).unwrap_or(f64::NAN);
                    LatLon::new(lat, lon)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Vertex rings of a geometry, before validation
fn geometry_rings(label: &str, geometry: &Geometry) -> Result<Vec<Vec<LatLon>>, GeometryLoadError> {
    let as_array = |v: &Value| v.as_array().cloned().unwrap_or_default();
    let rings = match geometry.kind.as_str() {
        "Polygon" => as_array(&geometry.coordinates).first().map(parse_line).into_iter().collect(),
        "MultiPolygon" => as_array(&geometry.coordinates)
            .iter()
            .filter_map(|poly| poly.get(0).map(parse_line))
            .collect(),
        "LineString" => vec![parse_line(&geometry.coordinates)],
        "MultiLineString" => as_array(&geometry.coordinates).iter().map(parse_line).collect(),
        other => {
            return Err(GeometryLoadError::UnsupportedGeometry {
                zone: label.to_string(),
                kind: other.to_string(),
            })
        }
    };
    Ok(rings)
}

fn build_parts(label: &str, geometry: &Geometry) -> Result<Vec<Polygon>, GeometryLoadError> {
    geometry_rings(label, geometry)?
        .into_iter()
        .map(|ring| Polygon::new(label, ring))
        .collect()
}

/// Load a fixed tier. Any failure here is fatal to the caller.
pub fn load_tier(path: &Path, kind: ZoneKind, name: &str) -> Result<Zone, GeometryLoadError> {
    let collection = read_collection(path)?;
    let mut parts = Vec::new();
    for (idx, feature) in collection.features.iter().enumerate() {
        if let Some(geometry) = &feature.geometry {
            parts.extend(build_parts(&format!("{name}#{idx}"), geometry)?);
        }
    }
    if parts.is_empty() {
        return Err(GeometryLoadError::Empty { path: path.to_path_buf() });
    }
    info!(
        tier = %name,
        path = %path.display(),
        parts = %parts.len(),
        vertices = %parts.iter().map(|p| p.vertices().len()).sum::<usize>(),
        "tier_loaded"
    );
    Ok(Zone::new(ZoneId(0), name, kind, parts))
}

fn feature_id(feature: &Feature, index: usize) -> ZoneId {
    let from_value = |v: &Value| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get("id"))
        .and_then(from_value)
        .or_else(|| feature.id.as_ref().and_then(from_value))
        .map(ZoneId)
        .unwrap_or(ZoneId(index as i64 + 1))
}

fn feature_name(feature: &Feature, id: ZoneId) -> String {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Custom zone {id}"))
}

/// Custom zones from a GeoJSON FeatureCollection file
pub struct GeoJsonZoneStore {
    path: PathBuf,
}

impl GeoJsonZoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ZoneStore for GeoJsonZoneStore {
    fn load_custom_zones(&self) -> Result<Vec<Zone>, GeometryLoadError> {
        let collection = read_collection(&self.path)?;
        let mut zones = Vec::with_capacity(collection.features.len());

        for (idx, feature) in collection.features.iter().enumerate() {
            let id = feature_id(feature, idx);
            let name = feature_name(feature, id);
            let Some(geometry) = &feature.geometry else {
                warn!(zone_id = %id, zone = %name, "custom_zone_without_geometry");
                continue;
            };
            if !matches!(geometry.kind.as_str(), "Polygon" | "MultiPolygon") {
                warn!(zone_id = %id, zone = %name, kind = %geometry.kind, "custom_zone_skipped");
                continue;
            }
            match build_parts(&name, geometry) {
                Ok(parts) if !parts.is_empty() => {
                    zones.push(Zone::new(id, name, ZoneKind::Custom, parts));
                }
                Ok(_) => warn!(zone_id = %id, zone = %name, "custom_zone_empty"),
                Err(e) => warn!(zone_id = %id, error = %e, "custom_zone_invalid"),
            }
        }
        Ok(zones)
    }
}
