//! Zone classifier - one position against one zone snapshot
//!
//! Tier precedence is `Inner` > `Outer` > `None`. Custom zones are matched
//! independently of the tier and of each other.

use crate::domain::classification::{Classification, ZoneSet};
use crate::domain::geometry::great_circle_distance_km;
use crate::domain::types::{Position, Tier};
use crate::domain::zone::ZoneSnapshot;
use crate::error::ClassificationError;
use tracing::error;

/// Classify a validated position.
///
/// Errors only on an invariant violation (an outer match with an empty or
/// unmeasurable inner tier).
pub fn classify(
    position: &Position,
    zones: &ZoneSnapshot,
) -> Result<Classification, ClassificationError> {
    let point = position.location;

    let (tier, distance_to_inner_km) = if zones.inner().contains(point) {
        (Tier::Inner, Some(0.0))
    } else if zones.outer().contains(point) {
        let nearest = zones.inner().nearest_boundary_point(point).ok_or_else(|| {
            ClassificationError {
                vessel_id: position.vessel_id.to_string(),
                reason: "inner tier has no boundary".to_string(),
            }
        })?;
        let km = great_circle_distance_km(point, nearest);
        if !km.is_finite() {
            return Err(ClassificationError {
                vessel_id: position.vessel_id.to_string(),
                reason: format!("non-finite distance to inner boundary ({km})"),
            });
        }
        (Tier::Outer, Some(km))
    } else {
        (Tier::None, None)
    };

    let mut custom_zones: ZoneSet =
        zones.custom().iter().filter(|z| z.contains(point)).map(|z| z.id()).collect();
    custom_zones.sort_unstable();
    custom_zones.dedup();

    Ok(Classification { position: position.clone(), tier, distance_to_inner_km, custom_zones })
}

/// Classify a batch, dropping (and logging) any position that violates an invariant
pub fn classify_all(positions: &[Position], zones: &ZoneSnapshot) -> Vec<Classification> {
    positions
        .iter()
        .filter_map(|p| match classify(p, zones) {
            Ok(c) => Some(c),
            Err(e) => {
                error!(vessel_id = %e.vessel_id, reason = %e.reason, "classification_invariant_violated");
                None
            }
        })
        .collect()
}
