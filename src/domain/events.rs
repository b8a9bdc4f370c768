//! Transition events and alert payloads
//!
//! Transition events are produced by the state tracker once per cycle and
//! consumed immediately by the deduplicator. Alert payloads are what the
//! notification channels render.

use crate::domain::geometry::LatLon;
use crate::domain::types::{Tier, VesselId, ZoneId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Discriminant of a transition, ordered for deterministic event sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TransitionKind {
    TierEnter,
    TierExit,
    ZoneEnter,
    ZoneExit,
}

/// Old and new value of a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    TierEnter { from: Tier, to: Tier },
    TierExit { from: Tier, to: Tier },
    ZoneEnter { zone: ZoneId },
    ZoneExit { zone: ZoneId },
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Transition::TierEnter { .. } => TransitionKind::TierEnter,
            Transition::TierExit { .. } => TransitionKind::TierExit,
            Transition::ZoneEnter { .. } => TransitionKind::ZoneEnter,
            Transition::ZoneExit { .. } => TransitionKind::ZoneExit,
        }
    }

    /// Zone id for zone transitions
    pub fn zone(&self) -> Option<ZoneId> {
        match self {
            Transition::ZoneEnter { zone } | Transition::ZoneExit { zone } => Some(*zone),
            _ => None,
        }
    }
}

/// One membership change for one vessel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub vessel_id: VesselId,
    pub vessel_name: String,
    #[serde(flatten)]
    pub transition: Transition,
    pub at: DateTime<Utc>,
    /// Current location, or the last known one for a vessel absent from the batch
    pub location: LatLon,
    /// True when synthesized because the vessel is missing from the batch
    pub absent: bool,
}

impl TransitionEvent {
    pub fn kind(&self) -> TransitionKind {
        self.transition.kind()
    }

    /// Total order used to make event lists independent of processing order
    pub fn sort_key(&self) -> (&VesselId, TransitionKind, Option<ZoneId>) {
        (&self.vessel_id, self.kind(), self.transition.zone())
    }
}

/// A watched vessel currently inside the inner or outer tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAlert {
    pub vessel_id: VesselId,
    pub name: String,
    pub tier: Tier,
    pub location: LatLon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_inner_km: Option<f64>,
    pub observed_at: DateTime<Utc>,
    /// Entered its current tier this cycle
    pub newly_entered: bool,
}

/// A watched vessel that left both tiers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitAlert {
    pub vessel_id: VesselId,
    pub name: String,
    pub from: Tier,
    pub last_location: LatLon,
    pub exited_at: DateTime<Utc>,
    pub absent: bool,
}

/// A watched vessel inside a custom zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneAlert {
    pub vessel_id: VesselId,
    pub name: String,
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub location: LatLon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub observed_at: DateTime<Utc>,
    pub newly_entered: bool,
}

/// Approved content for one dispatch.
///
/// Each section is empty unless its alert class passed the dedup gate this
/// cycle. A payload with every section empty is a forced health-check summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub cycle_id: String,
    pub created_at: DateTime<Utc>,
    pub inside: Vec<TierAlert>,
    pub outside: Vec<TierAlert>,
    pub exited: Vec<ExitAlert>,
    pub zone_intrusions: Vec<ZoneAlert>,
    /// Tier enter transitions of this cycle, for marking new arrivals
    pub entered: Vec<TransitionEvent>,
    pub forced: bool,
}

impl AlertPayload {
    /// True when no section carries any alert
    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
            && self.outside.is_empty()
            && self.exited.is_empty()
            && self.zone_intrusions.is_empty()
    }

    pub fn alert_count(&self) -> usize {
        self.inside.len() + self.outside.len() + self.exited.len() + self.zone_intrusions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_serializes_flat() {
        let event = TransitionEvent {
            vessel_id: VesselId::new("42"),
            vessel_name: "CHINACOASTGUARD2901".to_string(),
            transition: Transition::TierEnter { from: Tier::None, to: Tier::Inner },
            at: DateTime::<Utc>::UNIX_EPOCH,
            location: LatLon::new(24.0, 121.0),
            absent: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tier_enter");
        assert_eq!(json["from"], "none");
        assert_eq!(json["to"], "inner");
        assert_eq!(json["vessel_id"], "42");
    }

    #[test]
    fn test_kind_ordering() {
        assert!(TransitionKind::TierEnter < TransitionKind::TierExit);
        assert!(TransitionKind::TierExit < TransitionKind::ZoneEnter);
        assert_eq!(Transition::ZoneExit { zone: ZoneId(3) }.zone(), Some(ZoneId(3)));
        assert_eq!(Transition::TierExit { from: Tier::Outer, to: Tier::None }.zone(), None);
    }

    #[test]
    fn test_alert_count_ignores_entered_events() {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        let mut payload = AlertPayload {
            cycle_id: "c1".to_string(),
            created_at: at,
            inside: vec![],
            outside: vec![],
            exited: vec![],
            zone_intrusions: vec![],
            entered: vec![],
            forced: false,
        };
        assert!(payload.is_empty());
        assert_eq!(payload.alert_count(), 0);

        payload.exited.push(ExitAlert {
            vessel_id: VesselId::new("7"),
            name: "CHINACOASTGUARD7".to_string(),
            from: Tier::Outer,
            last_location: LatLon::new(24.0, 122.5),
            exited_at: at,
            absent: true,
        });
        payload.entered.push(TransitionEvent {
            vessel_id: VesselId::new("8"),
            vessel_name: "CHINACOASTGUARD8".to_string(),
            transition: Transition::TierEnter { from: Tier::None, to: Tier::Outer },
            at,
            location: LatLon::new(24.0, 122.5),
            absent: false,
        });

        assert!(!payload.is_empty());
        assert_eq!(payload.alert_count(), 1);
    }
}
