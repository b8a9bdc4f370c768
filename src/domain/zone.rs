//! Zones and the per-cycle zone snapshot

use crate::domain::geometry::{planar_distance_sq, LatLon, Polygon};
use crate::domain::types::ZoneId;
use serde::Serialize;
use std::sync::Arc;

/// Role of a zone in classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Inner,
    Outer,
    Custom,
}

/// A named area made of one or more simple polygons.
///
/// Fixed tiers are usually multi-part (a main coastline plus outlying
/// islands). A zone contains a point if any part does.
#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    name: String,
    kind: ZoneKind,
    parts: Vec<Polygon>,
}

impl Zone {
    /// `parts` must be non-empty; loaders reject empty geometry before this point
    pub fn new(id: ZoneId, name: impl Into<String>, kind: ZoneKind, parts: Vec<Polygon>) -> Self {
        Self { id, name: name.into(), kind, parts }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn parts(&self) -> &[Polygon] {
        &self.parts
    }

    pub fn contains(&self, point: LatLon) -> bool {
        self.parts.iter().any(|p| p.contains(point))
    }

    /// Closest boundary point over all parts, `None` for a zone without parts
    pub fn nearest_boundary_point(&self, point: LatLon) -> Option<LatLon> {
        self.parts
            .iter()
            .map(|p| p.nearest_boundary_point(point))
            .min_by(|a, b| planar_distance_sq(point, *a).total_cmp(&planar_distance_sq(point, *b)))
    }
}

/// Immutable view of all zones for one cycle.
///
/// Cloning is cheap; the tiers and the custom list are shared.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    inner: Arc<Zone>,
    outer: Arc<Zone>,
    custom: Arc<Vec<Zone>>,
}

impl ZoneSnapshot {
    pub fn new(inner: Arc<Zone>, outer: Arc<Zone>, custom: Arc<Vec<Zone>>) -> Self {
        Self { inner, outer, custom }
    }

    pub fn inner(&self) -> &Zone {
        &self.inner
    }

    pub fn outer(&self) -> &Zone {
        &self.outer
    }

    pub fn custom(&self) -> &[Zone] {
        &self.custom
    }

    /// Name of a custom zone, if it is part of this snapshot
    pub fn custom_zone_name(&self, id: ZoneId) -> Option<&str> {
        self.custom.iter().find(|z| z.id == id).map(|z| z.name.as_str())
    }
}
