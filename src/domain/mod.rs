//! Domain models - core types for zone classification and alerting
//!
//! - `geometry` - planar polygon tests and great-circle measurements
//! - `types` - vessel positions, identifiers, tiers
//! - `zone` - zones and the per-cycle zone snapshot
//! - `classification` - per-vessel classification record
//! - `events` - transition events and alert payloads
//! - `landmarks` - nearest-landmark location descriptions

pub mod classification;
pub mod events;
pub mod geometry;
pub mod landmarks;
pub mod types;
pub mod zone;

// Re-export commonly used types at module level
pub use classification::{Classification, ZoneSet};
pub use events::{
    AlertPayload, ExitAlert, TierAlert, Transition, TransitionEvent, TransitionKind, ZoneAlert,
};
pub use geometry::{LatLon, Polygon};
pub use landmarks::Landmark;
pub use types::{Position, RawPositionReport, Tier, VesselId, ZoneId};
pub use zone::{Zone, ZoneKind, ZoneSnapshot};
