//! Durable snapshot of currently alerted vessels and alert dispatch history
//!
//! Loaded once at startup so a restart neither re-fires enter alerts for
//! vessels that were already inside nor resends an unchanged alert batch
//! before its cooldown. Written after every cycle through a temporary file
//! and a rename. Files holding only the bare vessel map still load, with an
//! empty dispatch history.

use crate::error::PersistenceError;
use crate::services::cycle::EngineSnapshot;
use crate::services::dedup::DedupSnapshot;
use crate::services::state_tracker::StateSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait StateStore: Send + Sync {
    /// Missing, unreadable or corrupt storage yields an empty snapshot
    fn load(&self) -> EngineSnapshot;

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError>;
}

pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io { path: self.path.clone(), source }
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self) -> EngineSnapshot {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "state_snapshot_absent");
                return EngineSnapshot::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state_snapshot_unreadable");
                return EngineSnapshot::default();
            }
        };

        let parsed = serde_json::from_str::<EngineSnapshot>(&content).or_else(|e| {
            serde_json::from_str::<StateSnapshot>(&content)
                .map(|vessels| EngineSnapshot { vessels, ..Default::default() })
                .map_err(|_| e)
        });
        match parsed {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    vessels = %snapshot.vessels.len(),
                    dispatch_history = %(snapshot.dedup != DedupSnapshot::default()),
                    "state_snapshot_loaded"
                );
                snapshot
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state_snapshot_corrupt");
                EngineSnapshot::default()
            }
        }
    }

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), vessels = %snapshot.vessels.len(), "state_snapshot_saved");
        Ok(())
    }
}
