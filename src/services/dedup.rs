//! Alert deduplicator - content hash plus cooldown per alert class
//!
//! Three classes, one record each:
//! - `TierEnterBatch`: vessels occupying a tier. Passes when forced, when the
//!   content hash changed, or when the cooldown has elapsed since the last pass.
//! - `TierExitBatch`: vessels that left both tiers. Passes when forced or when
//!   the hash changed; no cooldown escape.
//! - `ZoneEnterBatch`: (vessel, zone) intrusions, gated like the tier batch.
//!
//! Observation timestamps and "newly entered" marks are rendered but never
//! hashed, so an unchanged fleet hashes identically from cycle to cycle.

use crate::domain::events::{AlertPayload, ExitAlert, TierAlert, TransitionEvent, ZoneAlert};
use crate::domain::types::Tier;
use crate::services::cycle::CycleOptions;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Default cooldown for the enter-side classes
pub const DEFAULT_COOLDOWN_SECS: u64 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertClass {
    TierEnterBatch,
    TierExitBatch,
    ZoneEnterBatch,
}

impl AlertClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::TierEnterBatch => "tier_enter_batch",
            AlertClass::TierExitBatch => "tier_exit_batch",
            AlertClass::ZoneEnterBatch => "zone_enter_batch",
        }
    }

    fn has_cooldown_escape(&self) -> bool {
        !matches!(self, AlertClass::TierExitBatch)
    }
}

/// Last dispatched hash and time for one class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertDedupRecord {
    pub last_hash: Option<String>,
    pub last_dispatch: Option<DateTime<Utc>>,
}

/// Dispatch history of every class, kept across restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSnapshot {
    pub tier_enter: AlertDedupRecord,
    pub tier_exit: AlertDedupRecord,
    pub zone_enter: AlertDedupRecord,
}

/// Candidate alerts of one cycle, before gating
#[derive(Debug, Clone, Default)]
pub struct CycleAlerts {
    /// Sorted by vessel id
    pub occupancy: Vec<TierAlert>,
    pub entered: Vec<TransitionEvent>,
    /// Sorted by vessel id
    pub exited: Vec<ExitAlert>,
    /// Collapsed per (vessel, zone), sorted
    pub zone_intrusions: Vec<ZoneAlert>,
}

#[derive(Serialize)]
struct TierDigest<'a> {
    vessel_id: &'a str,
    tier: Tier,
    lat: f64,
    lon: f64,
    course: Option<f64>,
    speed: Option<f64>,
    distance_km: Option<f64>,
}

#[derive(Serialize)]
struct ExitDigest<'a> {
    vessel_id: &'a str,
    from: Tier,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct ZoneDigest<'a> {
    vessel_id: &'a str,
    zone_id: i64,
    lat: f64,
    lon: f64,
}

/// SHA-256 over the JSON serialization, hex encoded
fn content_hash<T: Serialize>(entries: &[T]) -> String {
    // Serializing plain structs of strings and numbers cannot fail
    let bytes = serde_json::to_vec(entries).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

pub fn tier_hash(alerts: &[TierAlert]) -> String {
    let digest: Vec<_> = alerts
        .iter()
        .map(|a| TierDigest {
            vessel_id: a.vessel_id.as_str(),
            tier: a.tier,
            lat: a.location.lat,
            lon: a.location.lon,
            course: a.course,
            speed: a.speed,
            distance_km: a.distance_to_inner_km,
        })
        .collect();
    content_hash(&digest)
}

pub fn exit_hash(alerts: &[ExitAlert]) -> String {
    let digest: Vec<_> = alerts
        .iter()
        .map(|a| ExitDigest {
            vessel_id: a.vessel_id.as_str(),
            from: a.from,
            lat: a.last_location.lat,
            lon: a.last_location.lon,
        })
        .collect();
    content_hash(&digest)
}

pub fn zone_hash(alerts: &[ZoneAlert]) -> String {
    let digest: Vec<_> = alerts
        .iter()
        .map(|a| ZoneDigest {
            vessel_id: a.vessel_id.as_str(),
            zone_id: a.zone_id.0,
            lat: a.location.lat,
            lon: a.location.lon,
        })
        .collect();
    content_hash(&digest)
}

/// Collapse zone intrusions to one per (vessel, zone), sorted by that key.
///
/// The first occurrence of each pair is kept.
pub fn collapse_zone_alerts(mut alerts: Vec<ZoneAlert>) -> Vec<ZoneAlert> {
    alerts.sort_by(|a, b| (&a.vessel_id, a.zone_id).cmp(&(&b.vessel_id, b.zone_id)));
    alerts.dedup_by(|b, a| a.vessel_id == b.vessel_id && a.zone_id == b.zone_id);
    alerts
}

#[derive(Debug)]
pub struct AlertDeduplicator {
    cooldown: Duration,
    tier_enter: AlertDedupRecord,
    tier_exit: AlertDedupRecord,
    zone_enter: AlertDedupRecord,
}

impl AlertDeduplicator {
    pub fn new(cooldown: std::time::Duration) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::seconds(480)),
            tier_enter: AlertDedupRecord::default(),
            tier_exit: AlertDedupRecord::default(),
            zone_enter: AlertDedupRecord::default(),
        }
    }

    pub fn record(&self, class: AlertClass) -> &AlertDedupRecord {
        match class {
            AlertClass::TierEnterBatch => &self.tier_enter,
            AlertClass::TierExitBatch => &self.tier_exit,
            AlertClass::ZoneEnterBatch => &self.zone_enter,
        }
    }

    fn record_mut(&mut self, class: AlertClass) -> &mut AlertDedupRecord {
        match class {
            AlertClass::TierEnterBatch => &mut self.tier_enter,
            AlertClass::TierExitBatch => &mut self.tier_exit,
            AlertClass::ZoneEnterBatch => &mut self.zone_enter,
        }
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            tier_enter: self.tier_enter.clone(),
            tier_exit: self.tier_exit.clone(),
            zone_enter: self.zone_enter.clone(),
        }
    }

    /// Resume from persisted dispatch history (at startup)
    pub fn restore(&mut self, snapshot: DedupSnapshot) {
        self.tier_enter = snapshot.tier_enter;
        self.tier_exit = snapshot.tier_exit;
        self.zone_enter = snapshot.zone_enter;
    }

    /// Forget all dispatch history
    pub fn reset(&mut self) {
        for class in [AlertClass::TierEnterBatch, AlertClass::TierExitBatch, AlertClass::ZoneEnterBatch]
        {
            *self.record_mut(class) = AlertDedupRecord::default();
        }
    }

    /// Gate one class; on pass both hash and timestamp are updated
    fn admit(&mut self, class: AlertClass, hash: String, force: bool, now: DateTime<Utc>) -> bool {
        let cooldown = self.cooldown;
        let record = self.record_mut(class);

        let changed = record.last_hash.as_deref() != Some(hash.as_str());
        let cooled = class.has_cooldown_escape()
            && record.last_dispatch.map_or(true, |last| now - last > cooldown);

        let pass = force || changed || cooled;
        if pass {
            record.last_hash = Some(hash);
            record.last_dispatch = Some(now);
        }
        debug!(
            class = %class.as_str(),
            force = %force,
            changed = %changed,
            cooled = %cooled,
            pass = %pass,
            "dedup_gate"
        );
        pass
    }

    /// Decide which sections of this cycle's alerts are dispatched.
    ///
    /// Returns `None` when nothing passes, unless the cycle is forced with
    /// `send_empty_summary`, which yields an empty health-check payload.
    pub fn evaluate(
        &mut self,
        alerts: CycleAlerts,
        options: CycleOptions,
        cycle_id: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertPayload> {
        let force = options.force_dispatch;
        let mut payload = AlertPayload {
            cycle_id: cycle_id.to_string(),
            created_at: now,
            inside: Vec::new(),
            outside: Vec::new(),
            exited: Vec::new(),
            zone_intrusions: Vec::new(),
            entered: Vec::new(),
            forced: force,
        };

        if !alerts.occupancy.is_empty()
            && self.admit(AlertClass::TierEnterBatch, tier_hash(&alerts.occupancy), force, now)
        {
            let (inside, outside): (Vec<_>, Vec<_>) =
                alerts.occupancy.into_iter().partition(|a| a.tier == Tier::Inner);
            payload.inside = inside;
            payload.outside = outside;
            payload.entered = alerts.entered;
        }

        if !alerts.exited.is_empty()
            && self.admit(AlertClass::TierExitBatch, exit_hash(&alerts.exited), force, now)
        {
            payload.exited = alerts.exited;
        }

        if !alerts.zone_intrusions.is_empty()
            && self.admit(
                AlertClass::ZoneEnterBatch,
                zone_hash(&alerts.zone_intrusions),
                force,
                now,
            )
        {
            payload.zone_intrusions = alerts.zone_intrusions;
        }

        if payload.is_empty() && !(force && options.send_empty_summary) {
            return None;
        }

        info!(
            cycle_id = %cycle_id,
            inside = %payload.inside.len(),
            outside = %payload.outside.len(),
            exited = %payload.exited.len(),
            zone_intrusions = %payload.zone_intrusions.len(),
            alerts = %payload.alert_count(),
            forced = %force,
            "alert_payload_approved"
        );
        Some(payload)
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::LatLon;
    use crate::domain::types::{VesselId, ZoneId};
    use chrono::TimeZone;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 4, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn tier_alert(id: &str, tier: Tier, observed_at: DateTime<Utc>) -> TierAlert {
        TierAlert {
            vessel_id: VesselId::new(id),
            name: format!("CHINACOASTGUARD{id}"),
            tier,
            location: LatLon::new(24.0, 121.0),
            course: Some(90.0),
            speed: Some(8.5),
            distance_to_inner_km: if tier == Tier::Inner { Some(0.0) } else { Some(12.5) },
            observed_at,
            newly_entered: false,
        }
    }

    fn zone_alert(id: &str, zone: i64, lat: f64) -> ZoneAlert {
        ZoneAlert {
            vessel_id: VesselId::new(id),
            name: id.to_string(),
            zone_id: ZoneId(zone),
            zone_name: format!("zone {zone}"),
            location: LatLon::new(lat, 121.0),
            course: None,
            speed: None,
            observed_at: ts(0),
            newly_entered: true,
        }
    }

    fn exit_alert(id: &str) -> ExitAlert {
        ExitAlert {
            vessel_id: VesselId::new(id),
            name: id.to_string(),
            from: Tier::Outer,
            last_location: LatLon::new(24.0, 122.5),
            exited_at: ts(0),
            absent: true,
        }
    }

    fn occupancy(minute: i64) -> CycleAlerts {
        CycleAlerts { occupancy: vec![tier_alert("1", Tier::Inner, ts(minute))], ..Default::default() }
    }

    const NORMAL: CycleOptions = CycleOptions { force_dispatch: false, send_empty_summary: false };

    #[test]
    fn test_identical_set_suppressed_within_cooldown() {
        let mut dedup = AlertDeduplicator::default();
        assert!(dedup.evaluate(occupancy(0), NORMAL, "c1", ts(0)).is_some());
        assert!(dedup.evaluate(occupancy(5), NORMAL, "c2", ts(5)).is_none());
    }

    #[test]
    fn test_identical_set_redispatched_after_cooldown() {
        let mut dedup = AlertDeduplicator::default();
        assert!(dedup.evaluate(occupancy(0), NORMAL, "c1", ts(0)).is_some());
        assert!(dedup.evaluate(occupancy(5), NORMAL, "c2", ts(5)).is_none());
        // Strictly more than 8 minutes since the last dispatch
        assert!(dedup.evaluate(occupancy(8), NORMAL, "c3", ts(8)).is_none());
        assert!(dedup.evaluate(occupancy(9), NORMAL, "c4", ts(9)).is_some());
    }

    #[test]
    fn test_changed_content_passes_immediately() {
        let mut dedup = AlertDeduplicator::default();
        dedup.evaluate(occupancy(0), NORMAL, "c1", ts(0));

        let mut moved = occupancy(1);
        moved.occupancy[0].location = LatLon::new(24.01, 121.0);
        let payload = dedup.evaluate(moved, NORMAL, "c2", ts(1)).unwrap();
        assert_eq!(payload.inside.len(), 1);
    }

    #[test]
    fn test_force_bypasses_gate() {
        let mut dedup = AlertDeduplicator::default();
        dedup.evaluate(occupancy(0), NORMAL, "c1", ts(0));
        let forced = CycleOptions { force_dispatch: true, send_empty_summary: false };
        assert!(dedup.evaluate(occupancy(1), forced, "c2", ts(1)).is_some());
    }

    #[test]
    fn test_exit_has_no_cooldown_escape() {
        let mut dedup = AlertDeduplicator::default();
        let exits = || CycleAlerts { exited: vec![exit_alert("7")], ..Default::default() };

        assert_eq!(dedup.evaluate(exits(), NORMAL, "c1", ts(0)).unwrap().exited.len(), 1);
        assert!(dedup.evaluate(exits(), NORMAL, "c2", ts(60)).is_none());

        let other = CycleAlerts { exited: vec![exit_alert("8")], ..Default::default() };
        assert!(dedup.evaluate(other, NORMAL, "c3", ts(61)).is_some());
    }

    #[test]
    fn test_forced_empty_cycle_needs_summary_flag() {
        let mut dedup = AlertDeduplicator::default();
        let forced = CycleOptions { force_dispatch: true, send_empty_summary: false };
        assert!(dedup.evaluate(CycleAlerts::default(), forced, "c1", ts(0)).is_none());

        let summary = CycleOptions { force_dispatch: true, send_empty_summary: true };
        let payload = dedup.evaluate(CycleAlerts::default(), summary, "c2", ts(0)).unwrap();
        assert!(payload.is_empty());
        assert!(payload.forced);
    }

    #[test]
    fn test_empty_unforced_cycle_is_noop() {
        let mut dedup = AlertDeduplicator::default();
        assert!(dedup.evaluate(CycleAlerts::default(), NORMAL, "c1", ts(0)).is_none());
        assert_eq!(dedup.record(AlertClass::TierEnterBatch), &AlertDedupRecord::default());
    }

    #[test]
    fn test_hash_ignores_observation_time() {
        let a = vec![tier_alert("1", Tier::Outer, ts(0))];
        let mut b = vec![tier_alert("1", Tier::Outer, ts(10))];
        b[0].newly_entered = true;
        assert_eq!(tier_hash(&a), tier_hash(&b));
        assert_eq!(tier_hash(&a).len(), 64);
    }

    #[test]
    fn test_sections_gated_independently() {
        let mut dedup = AlertDeduplicator::default();
        let alerts = |minute| CycleAlerts {
            occupancy: vec![tier_alert("1", Tier::Outer, ts(minute))],
            zone_intrusions: vec![zone_alert("1", 3, 24.0)],
            ..Default::default()
        };
        dedup.evaluate(alerts(0), NORMAL, "c1", ts(0));

        let mut next = alerts(1);
        next.zone_intrusions[0].location = LatLon::new(24.2, 121.0);
        let payload = dedup.evaluate(next, NORMAL, "c2", ts(1)).unwrap();
        assert!(payload.outside.is_empty());
        assert_eq!(payload.zone_intrusions.len(), 1);
    }

    #[test]
    fn test_collapse_duplicate_zone_pairs() {
        let collapsed = collapse_zone_alerts(vec![
            zone_alert("2", 5, 24.0),
            zone_alert("1", 5, 24.0),
            zone_alert("2", 5, 24.3),
            zone_alert("2", 4, 24.0),
        ]);
        let keys: Vec<_> =
            collapsed.iter().map(|a| (a.vessel_id.as_str().to_string(), a.zone_id.0)).collect();
        assert_eq!(
            keys,
            vec![("1".to_string(), 5), ("2".to_string(), 4), ("2".to_string(), 5)]
        );
        // First occurrence kept
        assert_eq!(collapsed[2].location.lat, 24.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut dedup = AlertDeduplicator::default();
        dedup.evaluate(occupancy(0), NORMAL, "c1", ts(0));
        dedup.reset();
        assert!(dedup.evaluate(occupancy(1), NORMAL, "c2", ts(1)).is_some());
    }

    #[test]
    fn test_restored_history_keeps_cooldown() {
        let mut before = AlertDeduplicator::default();
        before.evaluate(occupancy(0), NORMAL, "c1", ts(0));
        before.evaluate(
            CycleAlerts { exited: vec![exit_alert("7")], ..Default::default() },
            NORMAL,
            "c2",
            ts(0),
        );
        let json = serde_json::to_string(&before.snapshot()).unwrap();

        let mut after = AlertDeduplicator::default();
        after.restore(serde_json::from_str(&json).unwrap());

        assert_eq!(after.snapshot(), before.snapshot());
        assert!(after.evaluate(occupancy(1), NORMAL, "c3", ts(1)).is_none());
        assert!(after.evaluate(occupancy(9), NORMAL, "c4", ts(9)).is_some());
    }
}
