//! Zone registry - fixed tiers plus reloadable custom zones
//!
//! The inner and outer tiers are loaded once at startup and never change.
//! Custom zones are replaced at the start of every cycle from the zone store;
//! a failed reload keeps the previous list.

use crate::domain::zone::{Zone, ZoneSnapshot};
use crate::error::GeometryLoadError;
use crate::io::zone_store::ZoneStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ZoneRegistry {
    inner: Arc<Zone>,
    outer: Arc<Zone>,
    custom: RwLock<Arc<Vec<Zone>>>,
}

impl ZoneRegistry {
    pub fn new(inner: Zone, outer: Zone) -> Self {
        Self {
            inner: Arc::new(inner),
            outer: Arc::new(outer),
            custom: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Builder: start with an initial custom zone list
    pub fn with_custom_zones(self, zones: Vec<Zone>) -> Self {
        *self.custom.write() = Arc::new(zones);
        self
    }

    /// Immutable view for one cycle
    pub fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot::new(self.inner.clone(), self.outer.clone(), self.custom.read().clone())
    }

    pub fn custom_zone_count(&self) -> usize {
        self.custom.read().len()
    }

    /// Replace the custom zone list from the store.
    ///
    /// On failure the previous list stays in place and the error is returned
    /// for accounting only.
    pub fn reload_custom(&self, store: &dyn ZoneStore) -> Result<usize, GeometryLoadError> {
        match store.load_custom_zones() {
            Ok(zones) => {
                let count = zones.len();
                let previous = std::mem::replace(&mut *self.custom.write(), Arc::new(zones));
                if previous.len() != count {
                    info!(previous = %previous.len(), current = %count, "custom_zones_reloaded");
                }
                Ok(count)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kept = %self.custom_zone_count(),
                    "custom_zone_reload_failed"
                );
                Err(e)
            }
        }
    }
}
