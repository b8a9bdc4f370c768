//! Polling cycle orchestration
//!
//! `CycleEngine` is the pure core of one cycle:
//! classify -> filter watched -> track -> build alert batches -> deduplicate.
//! It is deterministic given its inputs and `now`.
//!
//! `CycleRunner` wraps the engine behind an async mutex (one cycle at a time)
//! and wires it to the collaborators: zone store, position source, storage,
//! dispatcher and metrics.


use crate::domain::classification::Classification;
use crate::domain::events::{
    AlertPayload, ExitAlert, TierAlert, Transition, TransitionEvent, TransitionKind, ZoneAlert,
};
use crate::domain::types::{Position, Tier, VesselId, ZoneId};
use crate::domain::zone::ZoneSnapshot;
use crate::error::CycleError;
use crate::infra::metrics::Metrics;
use crate::io::classification_log::ClassificationSink;
use crate::io::position_source::PositionSource;
use crate::io::state_store::StateStore;
use crate::io::zone_store::ZoneStore;
use crate::services::classifier::classify_all;
use crate::services::dedup::{collapse_zone_alerts, AlertDeduplicator, CycleAlerts, DedupSnapshot};
use crate::services::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::services::state_tracker::{StateSnapshot, VesselStateTracker};
use crate::services::watch_filter::WatchFilter;
use crate::services::zone_registry::ZoneRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-invocation flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOptions {
    /// Bypass the dedup gate for every non-empty section
    pub force_dispatch: bool,
    /// With `force_dispatch`, send a summary even when nothing qualifies
    pub send_empty_summary: bool,
}

impl CycleOptions {
    /// Startup and manual health-check cycle
    pub const fn health_check() -> Self {
        Self { force_dispatch: true, send_empty_summary: true }
    }
}

/// Output of the pure core for one cycle
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub classifications: Vec<Classification>,
    pub watched: usize,
    pub events: Vec<TransitionEvent>,
    pub payload: Option<AlertPayload>,
}

/// Durable engine state: alerted vessels plus dispatch history.
///
/// Restoring both keeps a restart from re-alerting an unchanged fleet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub vessels: StateSnapshot,
    #[serde(default)]
    pub dedup: DedupSnapshot,
}

impl EngineSnapshot {
    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty() && self.dedup == DedupSnapshot::default()
    }
}

/// Explicit cycle state: retained vessel state plus dedup records
pub struct CycleEngine {
    tracker: VesselStateTracker,
    dedup: AlertDeduplicator,
    filter: WatchFilter,
}

impl CycleEngine {
    pub fn new(filter: WatchFilter, cooldown: Duration) -> Self {
        Self { tracker: VesselStateTracker::new(), dedup: AlertDeduplicator::new(cooldown), filter }
    }

    pub fn restore_state(&mut self, snapshot: EngineSnapshot) {
        self.tracker.restore(snapshot.vessels);
        self.dedup.restore(snapshot.dedup);
    }

    pub fn state_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot { vessels: self.tracker.snapshot(), dedup: self.dedup.snapshot() }
    }

    pub fn tracked_vessels(&self) -> usize {
        self.tracker.len()
    }

    /// Run the core of one cycle over an already-validated position batch
    pub fn process(
        &mut self,
        positions: &[Position],
        zones: &ZoneSnapshot,
        options: CycleOptions,
        cycle_id: &str,
        now: DateTime<Utc>,
    ) -> CycleResult {
        let classifications = classify_all(positions, zones);

        let watched: Vec<Classification> = classifications
            .iter()
            .filter(|c| self.filter.is_watched(&c.position))
            .cloned()
            .collect();

        let events = self.tracker.advance(&watched, now);
        let alerts = build_alerts(&watched, &events, zones);
        let payload = self.dedup.evaluate(alerts, options, cycle_id, now);

        CycleResult { classifications, watched: watched.len(), events, payload }
    }
}

/// Turn watched classifications and transitions into candidate alert batches
fn build_alerts(
    watched: &[Classification],
    events: &[TransitionEvent],
    zones: &ZoneSnapshot,
) -> CycleAlerts {
    let tier_entered: FxHashSet<&VesselId> = events
        .iter()
        .filter(|e| e.kind() == TransitionKind::TierEnter)
        .map(|e| &e.vessel_id)
        .collect();
    let zone_entered: FxHashSet<(&VesselId, ZoneId)> = events
        .iter()
        .filter_map(|e| match e.transition {
            Transition::ZoneEnter { zone } => Some((&e.vessel_id, zone)),
            _ => None,
        })
        .collect();

    // One occupancy entry per vessel, highest tier first on duplicates
    let mut inside: Vec<&Classification> = watched.iter().filter(|c| c.tier.is_inside()).collect();
    inside.sort_by(|a, b| a.vessel_id().cmp(b.vessel_id()).then(b.tier.cmp(&a.tier)));
    inside.dedup_by(|b, a| a.vessel_id() == b.vessel_id());

    let occupancy = inside
        .into_iter()
        .map(|c| TierAlert {
            vessel_id: c.vessel_id().clone(),
            name: c.position.name.clone(),
            tier: c.tier,
            location: c.position.location,
            course: c.position.course,
            speed: c.position.speed,
            distance_to_inner_km: c.distance_to_inner_km,
            observed_at: c.position.observed_at,
            newly_entered: tier_entered.contains(c.vessel_id()),
        })
        .collect();

    let exited = events
        .iter()
        .filter_map(|e| match e.transition {
            Transition::TierExit { from, to: Tier::None } => Some(ExitAlert {
                vessel_id: e.vessel_id.clone(),
                name: e.vessel_name.clone(),
                from,
                last_location: e.location,
                exited_at: e.at,
                absent: e.absent,
            }),
            _ => None,
        })
        .collect();

    let zone_intrusions = collapse_zone_alerts(
        watched
            .iter()
            .flat_map(|c| {
                c.custom_zones.iter().map(move |zone_id| ZoneAlert {
                    vessel_id: c.vessel_id().clone(),
                    name: c.position.name.clone(),
                    zone_id: *zone_id,
                    zone_name: zones
                        .custom_zone_name(*zone_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("zone {zone_id}")),
                    location: c.position.location,
                    course: c.position.course,
                    speed: c.position.speed,
                    observed_at: c.position.observed_at,
                    newly_entered: false,
                })
            })
            .collect(),
    )
    .into_iter()
    .map(|mut a| {
        a.newly_entered = zone_entered.contains(&(&a.vessel_id, a.zone_id));
        a
    })
    .collect();

    let entered = events.iter().filter(|e| e.kind() == TransitionKind::TierEnter).cloned().collect();

    CycleAlerts { occupancy, entered, exited, zone_intrusions }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle_id: String,
    pub positions: usize,
    pub rejected: usize,
    pub classified: usize,
    pub watched: usize,
    pub events: usize,
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchReport>,
    pub duration_ms: u64,
}

/// Something that can run a cycle on demand (HTTP trigger, scheduler)
#[async_trait]
pub trait CycleTrigger: Send + Sync {
    async fn trigger(&self, options: CycleOptions) -> Result<CycleOutcome, CycleError>;
}

pub struct CycleRunner {
    engine: Mutex<CycleEngine>,
    registry: Arc<ZoneRegistry>,
    source: Arc<dyn PositionSource>,
    dispatcher: NotificationDispatcher,
    metrics: Arc<Metrics>,
    zone_store: Option<Arc<dyn ZoneStore>>,
    state_store: Option<Arc<dyn StateStore>>,
    classification_log: Option<Arc<dyn ClassificationSink>>,
}

impl CycleRunner {
    pub fn new(
        engine: CycleEngine,
        registry: Arc<ZoneRegistry>,
        source: Arc<dyn PositionSource>,
        dispatcher: NotificationDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            registry,
            source,
            dispatcher,
            metrics,
            zone_store: None,
            state_store: None,
            classification_log: None,
        }
    }

    /// Builder: reload custom zones from this store at the start of each cycle
    pub fn with_zone_store(mut self, store: Arc<dyn ZoneStore>) -> Self {
        self.zone_store = Some(store);
        self
    }

    /// Builder: persist the alerted-vessel snapshot after each cycle
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Builder: append classifications to a log after each cycle
    pub fn with_classification_log(mut self, log: Arc<dyn ClassificationSink>) -> Self {
        self.classification_log = Some(log);
        self
    }

    /// Retained vessel count (waits for a running cycle)
    pub async fn tracked_vessels(&self) -> usize {
        self.engine.lock().await.tracked_vessels()
    }

    /// Run one full cycle.
    ///
    /// Fails only when the position fetch fails; retained state is then left
    /// untouched and the next tick retries from scratch.
    pub async fn run_cycle(&self, options: CycleOptions) -> Result<CycleOutcome, CycleError> {
        let cycle_id = Uuid::now_v7().to_string();
        let start = Instant::now();
        let mut engine = self.engine.lock().await;

        if let Some(store) = &self.zone_store {
            if self.registry.reload_custom(store.as_ref()).is_err() {
                self.metrics.record_zone_reload_failed();
            }
        }
        let zones = self.registry.snapshot();
        self.metrics.set_custom_zones(zones.custom().len() as u64);

        let batch = match self.source.fetch().await {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.record_cycle_failed();
                error!(cycle_id = %cycle_id, error = %e, "cycle_fetch_failed");
                return Err(e.into());
            }
        };
        self.metrics.record_positions(batch.positions.len() as u64, batch.rejected as u64);

        let now = Utc::now();
        let result = engine.process(&batch.positions, &zones, options, &cycle_id, now);
        self.metrics.set_tracked_vessels(engine.tracked_vessels() as u64);

        if let Some(log) = &self.classification_log {
            if let Err(e) = log.record(&cycle_id, &result.classifications) {
                self.metrics.record_persistence_failed();
                warn!(cycle_id = %cycle_id, error = %e, "classification_log_failed");
            }
        }
        if let Some(store) = &self.state_store {
            if let Err(e) = store.save(&engine.state_snapshot()) {
                self.metrics.record_persistence_failed();
                warn!(cycle_id = %cycle_id, error = %e, "state_snapshot_save_failed");
            }
        }

        // State is settled; the next cycle may start while channels deliver
        drop(engine);

        let dispatch = match result.payload {
            Some(payload) => {
                let report = self.dispatcher.dispatch(Arc::new(payload)).await;
                self.metrics.record_dispatch(report.delivered.len() as u64, report.failed.len() as u64);
                Some(report)
            }
            None => None,
        };

        let elapsed = start.elapsed();
        self.metrics.record_cycle_completed(elapsed.as_millis() as u64, result.events.len() as u64);

        let outcome = CycleOutcome {
            cycle_id,
            positions: batch.positions.len(),
            rejected: batch.rejected,
            classified: result.classifications.len(),
            watched: result.watched,
            events: result.events.len(),
            dispatched: dispatch.is_some(),
            dispatch,
            duration_ms: elapsed.as_millis() as u64,
        };
        info!(
            cycle_id = %outcome.cycle_id,
            positions = %outcome.positions,
            rejected = %outcome.rejected,
            watched = %outcome.watched,
            events = %outcome.events,
            dispatched = %outcome.dispatched,
            duration_ms = %outcome.duration_ms,
            "cycle_completed"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl CycleTrigger for CycleRunner {
    async fn trigger(&self, options: CycleOptions) -> Result<CycleOutcome, CycleError> {
        self.run_cycle(options).await
    }
}

/// Run cycles on a fixed interval until shutdown.
///
/// With `startup` set, one eager cycle with those options runs first. Missed
/// ticks are delayed, never bursted.
pub async fn run_schedule<T: CycleTrigger + ?Sized>(
    trigger: Arc<T>,
    interval: Duration,
    startup: Option<CycleOptions>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    if let Some(options) = startup {
        // Consume the immediate first tick; the startup cycle stands in for it
        ticker.tick().await;
        info!(force = %options.force_dispatch, "startup_cycle");
        if let Err(e) = trigger.trigger(options).await {
            warn!(error = %e, "startup_cycle_failed");
        }
    }

    info!(interval_secs = %interval.as_secs(), "scheduler_started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = trigger.trigger(CycleOptions::default()).await {
                    warn!(error = %e, "scheduled_cycle_failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("scheduler_shutdown");
                    return;
                }
            }
        }
    }
}
