//! Classification log - appends every classification to a JSONL file
//!
//! One JSON object per line, tagged with the cycle id. Storage failures are
//! reported to the caller and never abort a cycle.

use crate::domain::classification::Classification;
use crate::error::PersistenceError;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ClassificationSink: Send + Sync {
    /// Persist one cycle's classifications, returning the number written
    fn record(
        &self,
        cycle_id: &str,
        classifications: &[Classification],
    ) -> Result<usize, PersistenceError>;
}

#[derive(Serialize)]
struct LogLine<'a> {
    cycle_id: &'a str,
    #[serde(flatten)]
    classification: &'a Classification,
}

pub struct JsonlClassificationLog {
    path: PathBuf,
}

impl JsonlClassificationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io { path: self.path.clone(), source }
    }
}

impl ClassificationSink for JsonlClassificationLog {
    fn record(
        &self,
        cycle_id: &str,
        classifications: &[Classification],
    ) -> Result<usize, PersistenceError> {
        if classifications.is_empty() {
            return Ok(0);
        }

        let path = Path::new(&self.path);
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let file =
            OpenOptions::new().create(true).append(true).open(path).map_err(|e| self.io_err(e))?;
        let mut writer = BufWriter::new(file);
        for classification in classifications {
            serde_json::to_writer(&mut writer, &LogLine { cycle_id, classification })?;
            writer.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }
        writer.flush().map_err(|e| self.io_err(e))?;

        debug!(file = %self.path.display(), records = %classifications.len(), "classifications_logged");
        Ok(classifications.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Position, Tier, ZoneId};
    use chrono::Utc;
    use smallvec::smallvec;
    use std::fs;
    use tempfile::tempdir;

    fn classification(id: &str) -> Classification {
        Classification {
            position: Position::new(id, "CHINACOASTGUARD2901", 24.0, 122.5, Utc::now()).unwrap(),
            tier: Tier::Outer,
            distance_to_inner_km: Some(50.79),
            custom_zones: smallvec![ZoneId(3)],
        }
    }

    #[test]
    fn test_appends_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("classifications.jsonl");
        let log = JsonlClassificationLog::new(&path);

        assert_eq!(log.record("c1", &[classification("1"), classification("2")]).unwrap(), 2);
        assert_eq!(log.record("c2", &[classification("1")]).unwrap(), 1);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(parsed["cycle_id"], "c2");
        assert_eq!(parsed["tier"], "outer");
        assert_eq!(parsed["position"]["vessel_id"], "1");
        assert_eq!(parsed["custom_zones"][0], 3);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classifications.jsonl");
        assert_eq!(JsonlClassificationLog::new(&path).record("c1", &[]).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_path_is_persistence_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let log = JsonlClassificationLog::new(dir.path());
        let err = log.record("c1", &[classification("1")]).unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }
}
