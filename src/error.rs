//! Error taxonomy for the classification and alerting core
//!
//! Propagation policy:
//! - `GeometryLoadError` is fatal for the fixed tiers and a skip-with-warning
//!   for custom zones
//! - `InvalidPosition` drops one record, the cycle continues
//! - `ClassificationError` drops one vessel's classification
//! - `DispatchError` is per channel, logged and never propagated
//! - `PersistenceError` is logged; the core still completes its state transition
//! - `CycleError` aborts one cycle, which is retried in full at the next tick

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or validate zone geometry
#[derive(Debug, Error)]
pub enum GeometryLoadError {
    #[error("failed to read zone file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse zone file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("zone file {path} contains no usable polygon")]
    Empty { path: PathBuf },

    #[error("zone '{zone}' has {vertices} distinct vertices, at least 3 required")]
    Degenerate { zone: String, vertices: usize },

    #[error("zone '{zone}' has a non-finite or out-of-range coordinate")]
    InvalidCoordinate { zone: String },

    #[error("zone '{zone}' encloses no area")]
    ZeroArea { zone: String },

    #[error("zone '{zone}' is self-intersecting")]
    SelfIntersecting { zone: String },

    #[error("zone '{zone}' has unsupported geometry type '{kind}'")]
    UnsupportedGeometry { zone: String, kind: String },
}

/// A position report that cannot be classified
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidPosition {
    #[error("position report has no vessel identifier")]
    MissingId,

    #[error("position report for vessel {vessel_id} has no usable latitude/longitude")]
    MissingCoordinate { vessel_id: String },

    #[error("position report for vessel {vessel_id} is out of range ({lat}, {lon})")]
    OutOfRange { vessel_id: String, lat: f64, lon: f64 },
}

/// Invariant violation while classifying a well-formed position
#[derive(Debug, Clone, PartialEq, Error)]
#[error("classification invariant violated for vessel {vessel_id}: {reason}")]
pub struct ClassificationError {
    pub vessel_id: String,
    pub reason: String,
}

/// Per-channel delivery failure
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("mqtt publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("spool write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure in a storage collaborator (classification log, state snapshot)
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure fetching the position batch
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse response from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no position sources configured")]
    NoSources,

    #[error("all {0} position sources failed")]
    AllSourcesFailed(usize),
}

/// Failure that aborts a whole cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("position fetch failed: {0}")]
    Source(#[from] SourceError),
}
