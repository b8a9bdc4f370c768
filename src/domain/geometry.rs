//! Planar polygon tests and great-circle measurements
//!
//! Containment and nearest-boundary-point are evaluated in planar
//! (x = longitude, y = latitude) degree space. Distances are measured on the
//! sphere with the haversine formula.
//!
//! Boundary policy: a point on an edge or vertex (within `BOUNDARY_EPSILON`)
//! is inside. Zone edges follow real shipping lanes, so the convention has to
//! be the same for every test that uses it.

use crate::error::GeometryLoadError;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres to nautical miles
pub const KM_TO_NM: f64 = 0.539957;

/// Tolerance (degrees) for on-boundary and collinearity tests
const BOUNDARY_EPSILON: f64 = 1e-12;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A simple polygon stored as an open ring (no repeated closing vertex)
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<LatLon>,
}

impl Polygon {
    /// Validate and build a polygon from ring vertices.
    ///
    /// Accepts closed or open rings. Rejects rings with fewer than three
    /// distinct vertices, invalid coordinates, zero area, or self-intersection.
    /// `label` names the zone in error messages.
    pub fn new(label: &str, vertices: Vec<LatLon>) -> Result<Self, GeometryLoadError> {
        if vertices.iter().any(|v| !v.is_valid()) {
            return Err(GeometryLoadError::InvalidCoordinate { zone: label.to_string() });
        }

        let mut ring: Vec<LatLon> = Vec::with_capacity(vertices.len());
        for v in vertices {
            if ring.last() != Some(&v) {
                ring.push(v);
            }
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        if ring.len() < 3 {
            return Err(GeometryLoadError::Degenerate {
                zone: label.to_string(),
                vertices: ring.len(),
            });
        }

        let polygon = Self { ring };
        // A symmetric bow-tie has zero signed area, so test simplicity first
        if !polygon.is_simple() {
            return Err(GeometryLoadError::SelfIntersecting { zone: label.to_string() });
        }
        if polygon.signed_area().abs() <= BOUNDARY_EPSILON {
            return Err(GeometryLoadError::ZeroArea { zone: label.to_string() });
        }
        Ok(polygon)
    }

    /// Ring vertices, without the closing vertex
    pub fn vertices(&self) -> &[LatLon] {
        &self.ring
    }

    /// Iterate over the ring's edges, including the closing edge
    fn edges(&self) -> impl Iterator<Item = (LatLon, LatLon)> + '_ {
        let n = self.ring.len();
        (0..n).map(move |i| (self.ring[i], self.ring[(i + 1) % n]))
    }

    /// Shoelace area in square degrees (sign gives orientation)
    fn signed_area(&self) -> f64 {
        self.edges().map(|(a, b)| a.lon * b.lat - b.lon * a.lat).sum::<f64>() / 2.0
    }

    /// True when no two non-adjacent edges touch
    fn is_simple(&self) -> bool {
        let n = self.ring.len();
        for i in 0..n {
            let (a1, a2) = (self.ring[i], self.ring[(i + 1) % n]);
            for j in (i + 1)..n {
                // Adjacent edges share a vertex by construction
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                let (b1, b2) = (self.ring[j], self.ring[(j + 1) % n]);
                if segments_intersect(a1, a2, b1, b2) {
                    return false;
                }
            }
        }
        true
    }

    /// Boundary-inclusive point-in-polygon test (even-odd ray casting)
    pub fn contains(&self, point: LatLon) -> bool {
        if self.edges().any(|(a, b)| on_segment(point, a, b)) {
            return true;
        }

        let (x, y) = (point.lon, point.lat);
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.lat > y) != (b.lat > y) {
                let x_cross = a.lon + (y - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Closest point on the polygon boundary to `point`, in planar degree space
    pub fn nearest_boundary_point(&self, point: LatLon) -> LatLon {
        let mut best = self.ring[0];
        let mut best_dist = f64::INFINITY;
        for (a, b) in self.edges() {
            let candidate = project_onto_segment(point, a, b);
            let dist = planar_distance_sq(point, candidate);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }
}

/// Squared planar distance in degree space
#[inline]
pub(crate) fn planar_distance_sq(a: LatLon, b: LatLon) -> f64 {
    let dx = a.lon - b.lon;
    let dy = a.lat - b.lat;
    dx * dx + dy * dy
}

/// Cross product of (b - a) x (c - a) in (lon, lat) space
#[inline]
fn cross(a: LatLon, b: LatLon, c: LatLon) -> f64 {
    (b.lon - a.lon) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lon - a.lon)
}

/// True when `p` lies on segment `a`-`b`
fn on_segment(p: LatLon, a: LatLon, b: LatLon) -> bool {
    if cross(a, b, p).abs() > BOUNDARY_EPSILON {
        return false;
    }
    p.lon >= a.lon.min(b.lon) - BOUNDARY_EPSILON
        && p.lon <= a.lon.max(b.lon) + BOUNDARY_EPSILON
        && p.lat >= a.lat.min(b.lat) - BOUNDARY_EPSILON
        && p.lat <= a.lat.max(b.lat) + BOUNDARY_EPSILON
}

/// Segment intersection test including touching and collinear overlap
fn segments_intersect(p1: LatLon, p2: LatLon, q1: LatLon, q2: LatLon) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > BOUNDARY_EPSILON && d2 < -BOUNDARY_EPSILON)
        || (d1 < -BOUNDARY_EPSILON && d2 > BOUNDARY_EPSILON))
        && ((d3 > BOUNDARY_EPSILON && d4 < -BOUNDARY_EPSILON)
            || (d3 < -BOUNDARY_EPSILON && d4 > BOUNDARY_EPSILON))
    {
        return true;
    }

    on_segment(p1, q1, q2) || on_segment(p2, q1, q2) || on_segment(q1, p1, p2) || on_segment(q2, p1, p2)
}

/// Orthogonal projection of `p` onto segment `a`-`b`, clamped to the segment
fn project_onto_segment(p: LatLon, a: LatLon, b: LatLon) -> LatLon {
    let dx = b.lon - a.lon;
    let dy = b.lat - a.lat;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.lon - a.lon) * dx + (p.lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0);
    LatLon::new(a.lat + t * dy, a.lon + t * dx)
}

/// Haversine distance between two points (km).
///
/// Pure function of finite inputs; callers reject NaN and out-of-range
/// coordinates upstream.
pub fn great_circle_distance_km(p1: LatLon, p2: LatLon) -> f64 {
    let dlat = (p2.lat - p1.lat).to_radians();
    let dlon = (p2.lon - p1.lon).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + p1.lat.to_radians().cos() * p2.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Forward azimuth from `p1` to `p2` in degrees, normalized to [0, 360).
///
/// Only used for descriptive text.
pub fn bearing_degrees(p1: LatLon, p2: LatLon) -> f64 {
    let (lat1, lat2) = (p1.lat.to_radians(), p2.lat.to_radians());
    let dlon = (p2.lon - p1.lon).to_radians();
    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = x.atan2(y).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Eight-point compass label for a bearing
pub fn compass_point(bearing: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let idx = ((bearing.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    POINTS[idx]
}
