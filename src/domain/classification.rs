//! Per-vessel classification record

use crate::domain::types::{Position, Tier, VesselId, ZoneId};
use serde::Serialize;
use smallvec::SmallVec;

/// Custom zone ids matched by one position (usually zero or one)
pub type ZoneSet = SmallVec<[ZoneId; 4]>;

/// Result of classifying one position against a zone snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub position: Position,
    pub tier: Tier,
    /// 0 for `Inner`, distance to the nearest inner boundary point for `Outer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_inner_km: Option<f64>,
    /// Sorted ascending, no duplicates
    pub custom_zones: ZoneSet,
}

impl Classification {
    pub fn vessel_id(&self) -> &VesselId {
        &self.position.vessel_id
    }

    /// Distance in nautical miles, for rendering
    pub fn distance_to_inner_nm(&self) -> Option<f64> {
        self.distance_to_inner_km.map(|km| km * crate::domain::geometry::KM_TO_NM)
    }
}
