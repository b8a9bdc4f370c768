//! Services - classification, state tracking and alerting
//!
//! - `zone_registry` - fixed tiers plus the reloadable custom zone set
//! - `classifier` - tier, distance and custom-zone membership per position
//! - `watch_filter` - which vessels are of interest
//! - `state_tracker` - per-vessel membership and transition events
//! - `dedup` - cooldown and content-hash gate per alert class
//! - `dispatcher` - concurrent fan-out to notification channels
//! - `cycle` - one polling cycle end to end, plus the schedule

pub mod classifier;
pub mod cycle;
pub mod dedup;
pub mod dispatcher;
pub mod state_tracker;
pub mod watch_filter;
pub mod zone_registry;

// Re-export commonly used types
pub use cycle::{
    run_schedule, CycleEngine, CycleOptions, CycleOutcome, CycleRunner, CycleTrigger, EngineSnapshot,
};
pub use dedup::AlertDeduplicator;
pub use dispatcher::{AlertChannel, DispatchReport, NotificationDispatcher};
pub use state_tracker::VesselStateTracker;
pub use watch_filter::WatchFilter;
pub use zone_registry::ZoneRegistry;
