//! Vessel state tracker - per-vessel zone membership across cycles
//!
//! Each cycle the tracker diffs the watched vessels' classifications against
//! the retained state and emits transition events:
//! - upward tier move (by precedence) -> `TierEnter`, downward -> `TierExit`
//! - newly matched custom zone -> `ZoneEnter`, no longer matched -> `ZoneExit`
//! - vessel retained but missing from the batch -> `TierExit` to `None` and a
//!   `ZoneExit` per retained zone
//!
//! Retained state is then replaced wholesale by this cycle's batch. Output
//! depends only on (retained state, batch), never on batch order.

use crate::domain::classification::{Classification, ZoneSet};
use crate::domain::events::{Transition, TransitionEvent};
use crate::domain::geometry::LatLon;
use crate::domain::types::{Tier, VesselId};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Retained membership of one vessel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselZoneState {
    pub name: String,
    pub tier: Tier,
    #[serde(default)]
    pub custom_zones: ZoneSet,
    pub last_location: LatLon,
    pub last_seen: DateTime<Utc>,
}

impl VesselZoneState {
    fn from_classification(c: &Classification) -> Self {
        Self {
            name: c.position.name.clone(),
            tier: c.tier,
            custom_zones: c.custom_zones.clone(),
            last_location: c.position.location,
            last_seen: c.position.observed_at,
        }
    }

    /// Alert-relevant: inside a tier or a custom zone
    pub fn is_alerted(&self) -> bool {
        self.tier.is_inside() || !self.custom_zones.is_empty()
    }

    /// Merge a duplicate sighting: highest tier, union of zones.
    ///
    /// The location follows the higher tier; on a tie the lexicographically
    /// smaller (lat, lon) wins so the result is order independent.
    fn merge(&mut self, other: VesselZoneState) {
        let take_other = match other.tier.cmp(&self.tier) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                other
                    .last_location
                    .lat
                    .total_cmp(&self.last_location.lat)
                    .then(other.last_location.lon.total_cmp(&self.last_location.lon))
                    == Ordering::Less
            }
        };
        let mut zones = std::mem::take(&mut self.custom_zones);
        zones.extend(other.custom_zones.iter().copied());
        zones.sort_unstable();
        zones.dedup();

        if take_other {
            *self = other;
        }
        self.custom_zones = zones;
    }
}

/// Durable "currently alerted vessels" view, keyed by vessel id
pub type StateSnapshot = std::collections::BTreeMap<VesselId, VesselZoneState>;

#[derive(Debug, Default)]
pub struct VesselStateTracker {
    retained: FxHashMap<VesselId, VesselZoneState>,
}

impl VesselStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    pub fn get(&self, vessel_id: &VesselId) -> Option<&VesselZoneState> {
        self.retained.get(vessel_id)
    }

    /// Diff one cycle's batch against retained state and replace it.
    ///
    /// Events are sorted by (vessel id, kind, zone id).
    pub fn advance(&mut self, batch: &[Classification], now: DateTime<Utc>) -> Vec<TransitionEvent> {
        let mut current: FxHashMap<VesselId, VesselZoneState> =
            FxHashMap::with_capacity_and_hasher(batch.len(), Default::default());
        for c in batch {
            let state = VesselZoneState::from_classification(c);
            match current.get_mut(c.vessel_id()) {
                Some(existing) => existing.merge(state),
                None => {
                    current.insert(c.vessel_id().clone(), state);
                }
            }
        }

        let mut events = Vec::new();
        let empty = ZoneSet::new();

        for (vessel_id, new) in &current {
            let (old_tier, old_zones) = match self.retained.get(vessel_id) {
                Some(old) => (old.tier, &old.custom_zones),
                None => (Tier::None, &empty),
            };
            let event = |transition| TransitionEvent {
                vessel_id: vessel_id.clone(),
                vessel_name: new.name.clone(),
                transition,
                at: now,
                location: new.last_location,
                absent: false,
            };

            match new.tier.cmp(&old_tier) {
                Ordering::Greater => {
                    events.push(event(Transition::TierEnter { from: old_tier, to: new.tier }))
                }
                Ordering::Less => {
                    events.push(event(Transition::TierExit { from: old_tier, to: new.tier }))
                }
                Ordering::Equal => {}
            }
            for zone in new.custom_zones.iter().filter(|z| !old_zones.contains(z)) {
                events.push(event(Transition::ZoneEnter { zone: *zone }));
            }
            for zone in old_zones.iter().filter(|z| !new.custom_zones.contains(z)) {
                events.push(event(Transition::ZoneExit { zone: *zone }));
            }
        }

        for (vessel_id, old) in self.retained.iter().filter(|(id, _)| !current.contains_key(*id)) {
            let event = |transition| TransitionEvent {
                vessel_id: vessel_id.clone(),
                vessel_name: old.name.clone(),
                transition,
                at: now,
                location: old.last_location,
                absent: true,
            };
            if old.tier.is_inside() {
                events.push(event(Transition::TierExit { from: old.tier, to: Tier::None }));
            }
            for zone in &old.custom_zones {
                events.push(event(Transition::ZoneExit { zone: *zone }));
            }
        }

        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        debug!(
            previous = %self.retained.len(),
            current = %current.len(),
            events = %events.len(),
            "vessel_state_advanced"
        );
        self.retained = current;
        events
    }

    /// Alert-relevant subset of retained state, for durable storage
    pub fn snapshot(&self) -> StateSnapshot {
        self.retained
            .iter()
            .filter(|(_, s)| s.is_alerted())
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    /// Seed retained state from a durable snapshot (at startup)
    pub fn restore(&mut self, snapshot: StateSnapshot) {
        self.retained = snapshot.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::TransitionKind;
    use crate::domain::types::{Position, ZoneId};
    use chrono::TimeZone;
    use smallvec::smallvec;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 4, minute, 0).unwrap()
    }

    fn classification(id: &str, tier: Tier, zones: &[i64]) -> Classification {
        Classification {
            position: Position::new(id, &format!("CHINACOASTGUARD{id}"), 24.0, 121.0, ts(0))
                .unwrap(),
            tier,
            distance_to_inner_km: None,
            custom_zones: zones.iter().map(|z| ZoneId(*z)).collect(),
        }
    }

    fn kinds(events: &[TransitionEvent]) -> Vec<TransitionKind> {
        events.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_none_to_inner_single_enter() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::None, &[])], ts(0));
        let events = tracker.advance(&[classification("1", Tier::Inner, &[])], ts(10));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, Transition::TierEnter { from: Tier::None, to: Tier::Inner });
        assert!(!events[0].absent);
    }

    #[test]
    fn test_inner_to_none_single_exit() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::Inner, &[])], ts(0));
        let events = tracker.advance(&[classification("1", Tier::None, &[])], ts(10));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, Transition::TierExit { from: Tier::Inner, to: Tier::None });
    }

    #[test]
    fn test_first_sighting_inside_is_enter() {
        let mut tracker = VesselStateTracker::new();
        let events = tracker.advance(&[classification("1", Tier::Outer, &[])], ts(0));
        assert_eq!(events[0].transition, Transition::TierEnter { from: Tier::None, to: Tier::Outer });
    }

    #[test]
    fn test_steady_state_no_events() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::Outer, &[4])], ts(0));
        let events = tracker.advance(&[classification("1", Tier::Outer, &[4])], ts(10));
        assert!(events.is_empty());
    }

    #[test]
    fn test_outer_to_inner_and_back() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::Outer, &[])], ts(0));
        let up = tracker.advance(&[classification("1", Tier::Inner, &[])], ts(10));
        assert_eq!(up[0].transition, Transition::TierEnter { from: Tier::Outer, to: Tier::Inner });

        let down = tracker.advance(&[classification("1", Tier::Outer, &[])], ts(20));
        assert_eq!(down[0].transition, Transition::TierExit { from: Tier::Inner, to: Tier::Outer });
    }

    #[test]
    fn test_absent_vessel_synthesizes_exits() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::Outer, &[2, 5])], ts(0));
        let events = tracker.advance(&[], ts(10));

        assert_eq!(
            kinds(&events),
            vec![TransitionKind::TierExit, TransitionKind::ZoneExit, TransitionKind::ZoneExit]
        );
        assert!(events.iter().all(|e| e.absent));
        assert_eq!(events[0].transition, Transition::TierExit { from: Tier::Outer, to: Tier::None });
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_absent_vessel_outside_tiers_has_no_tier_exit() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::None, &[])], ts(0));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.advance(&[], ts(10)).is_empty());
    }

    #[test]
    fn test_zone_enter_and_exit() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(&[classification("1", Tier::None, &[1, 2])], ts(0));
        let events = tracker.advance(&[classification("1", Tier::None, &[2, 3])], ts(10));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].transition, Transition::ZoneEnter { zone: ZoneId(3) });
        assert_eq!(events[1].transition, Transition::ZoneExit { zone: ZoneId(1) });
    }

    #[test]
    fn test_order_independent() {
        let batch_a = vec![
            classification("1", Tier::Inner, &[1]),
            classification("2", Tier::Outer, &[]),
            classification("3", Tier::None, &[7]),
        ];
        let mut batch_b = batch_a.clone();
        batch_b.reverse();

        let mut a = VesselStateTracker::new();
        let mut b = VesselStateTracker::new();
        a.advance(&[classification("4", Tier::Inner, &[])], ts(0));
        b.advance(&[classification("4", Tier::Inner, &[])], ts(0));

        assert_eq!(a.advance(&batch_a, ts(10)), b.advance(&batch_b, ts(10)));
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_duplicate_ids_merge() {
        let mut tracker = VesselStateTracker::new();
        let events = tracker.advance(
            &[
                classification("1", Tier::Outer, &[2]),
                classification("1", Tier::Inner, &[3]),
                classification("1", Tier::Outer, &[2]),
            ],
            ts(0),
        );

        let tier_events: Vec<_> =
            events.iter().filter(|e| e.kind() == TransitionKind::TierEnter).collect();
        assert_eq!(tier_events.len(), 1);
        assert_eq!(tier_events[0].transition, Transition::TierEnter { from: Tier::None, to: Tier::Inner });

        let state = tracker.get(&VesselId::new("1")).unwrap();
        assert_eq!(state.custom_zones.as_slice(), &[ZoneId(2), ZoneId(3)]);
    }

    #[test]
    fn test_snapshot_only_alerted_and_restore_suppresses_reenter() {
        let mut tracker = VesselStateTracker::new();
        tracker.advance(
            &[classification("1", Tier::Inner, &[]), classification("2", Tier::None, &[])],
            ts(0),
        );
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&VesselId::new("1")));

        let mut restarted = VesselStateTracker::new();
        restarted.restore(snapshot);
        let events = restarted.advance(&[classification("1", Tier::Inner, &[])], ts(10));
        assert!(events.is_empty());
    }

    #[test]
    fn test_state_snapshot_serde() {
        let mut snapshot = StateSnapshot::new();
        snapshot.insert(
            VesselId::new("9"),
            VesselZoneState {
                name: "X".to_string(),
                tier: Tier::Outer,
                custom_zones: smallvec![ZoneId(4)],
                last_location: LatLon::new(24.0, 121.0),
                last_seen: ts(0),
            },
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
