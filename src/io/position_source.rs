//! Position sources - fetch one cycle's batch of vessel positions
//!
//! Both sources read the tile format `{"data": {"rows": [...]}}` where each
//! row is a `RawPositionReport`. Invalid rows are dropped and counted.
//! Vessels seen in several tiles are kept once (first tile wins).

use crate::domain::types::{Position, RawPositionReport, VesselId};
use crate::error::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Validated, de-duplicated positions of one cycle
#[derive(Debug, Clone, Default)]
pub struct PositionBatch {
    pub positions: Vec<Position>,
    /// Rows dropped as `InvalidPosition`
    pub rejected: usize,
}

impl PositionBatch {
    /// Append validated positions, skipping vessel ids already present
    fn merge(&mut self, seen: &mut FxHashSet<VesselId>, positions: Vec<Position>, rejected: usize) {
        self.rejected += rejected;
        for p in positions {
            if seen.insert(p.vessel_id.clone()) {
                self.positions.push(p);
            }
        }
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch(&self) -> Result<PositionBatch, SourceError>;
}

#[derive(Debug, Default, Deserialize)]
struct TileResponse {
    #[serde(default)]
    data: TileData,
}

#[derive(Debug, Default, Deserialize)]
struct TileData {
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

/// Parse one tile body into validated positions and a reject count
pub fn parse_tile(
    body: &str,
    origin: &str,
    observed_at: DateTime<Utc>,
) -> Result<(Vec<Position>, usize), SourceError> {
    let tile: TileResponse = serde_json::from_str(body)
        .map_err(|source| SourceError::Parse { origin: origin.to_string(), source })?;

    let mut positions = Vec::with_capacity(tile.data.rows.len());
    let mut rejected = 0;
    for row in tile.data.rows {
        let parsed = serde_json::from_value::<RawPositionReport>(row)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_position(observed_at).map_err(|e| e.to_string()));
        match parsed {
            Ok(p) => positions.push(p),
            Err(reason) => {
                debug!(origin = %origin, reason = %reason, "position_row_rejected");
                rejected += 1;
            }
        }
    }
    Ok((positions, rejected))
}

/// Fetches a list of tile URLs over HTTP
pub struct HttpPositionSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpPositionSource {
    /// Fails with `NoSources` on an empty URL list; every fetch would fail
    pub fn new(urls: Vec<String>, timeout: Duration, user_agent: &str) -> Result<Self, SourceError> {
        if urls.is_empty() {
            return Err(SourceError::NoSources);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|source| SourceError::Http { url: String::new(), source })?;
        Ok(Self { client, urls })
    }

    async fn fetch_tile(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
        let http_err = |source| SourceError::Http { url: url.to_string(), source };
        client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    async fn fetch(&self) -> Result<PositionBatch, SourceError> {
        let observed_at = Utc::now();
        let handles: Vec<_> = self
            .urls
            .iter()
            .map(|url| {
                let client = self.client.clone();
                let url = url.clone();
                tokio::spawn(async move {
                    let body = Self::fetch_tile(&client, &url).await;
                    (url, body)
                })
            })
            .collect();

        let mut batch = PositionBatch::default();
        let mut seen = FxHashSet::default();
        let mut failed = 0;

        // Collected in URL order so the first tile wins on duplicates
        for handle in handles {
            let result = match handle.await {
                Ok((url, body)) => body.and_then(|b| parse_tile(&b, &url, observed_at)),
                Err(e) => {
                    warn!(error = %e, "tile_fetch_task_failed");
                    failed += 1;
                    continue;
                }
            };
            match result {
                Ok((positions, rejected)) => batch.merge(&mut seen, positions, rejected),
                Err(e) => {
                    warn!(error = %e, "tile_fetch_failed");
                    failed += 1;
                }
            }
        }

        if failed == self.urls.len() {
            return Err(SourceError::AllSourcesFailed(failed));
        }
        debug!(
            tiles = %self.urls.len(),
            failed = %failed,
            positions = %batch.positions.len(),
            rejected = %batch.rejected,
            "positions_fetched"
        );
        Ok(batch)
    }
}

/// Reads one or more tile files from disk (offline runs, replays)
pub struct FilePositionSource {
    paths: Vec<PathBuf>,
}

impl FilePositionSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl PositionSource for FilePositionSource {
    async fn fetch(&self) -> Result<PositionBatch, SourceError> {
        if self.paths.is_empty() {
            return Err(SourceError::NoSources);
        }
        let observed_at = Utc::now();
        let mut batch = PositionBatch::default();
        let mut seen = FxHashSet::default();
        let mut failed = 0;

        for path in &self.paths {
            let result = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SourceError::Io { path: path.clone(), source })
                .and_then(|body| parse_tile(&body, &path.display().to_string(), observed_at));
            match result {
                Ok((positions, rejected)) => batch.merge(&mut seen, positions, rejected),
                Err(e) => {
                    warn!(error = %e, "position_file_failed");
                    failed += 1;
                }
            }
        }

        if failed == self.paths.len() {
            return Err(SourceError::AllSourcesFailed(failed));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TILE_A: &str = r#"{"data":{"rows":[
        {"SHIP_ID":"1","SHIPNAME":"CHINACOASTGUARD2901","LAT":"24.0","LON":"121.0","SPEED":"85","COURSE":"90"},
        {"SHIP_ID":"2","SHIPNAME":"EVER GIVEN","LAT":23.1,"LON":119.2},
        {"SHIP_ID":"3","SHIPNAME":"NO FIX","LAT":"","LON":""},
        {"SHIPNAME":"NO ID","LAT":23.0,"LON":120.0}
    ]}}"#;

    const TILE_B: &str = r#"{"data":{"rows":[
        {"SHIP_ID":"1","SHIPNAME":"CHINACOASTGUARD2901","LAT":"30.0","LON":"130.0"},
        {"SHIP_ID":"4","SHIPNAME":"CHINACOASTGUARD14609","LAT":25.5,"LON":121.0}
    ]}}"#;

    #[test]
    fn test_parse_tile_counts_rejects() {
        let (positions, rejected) = parse_tile(TILE_A, "tile_a", Utc::now()).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(rejected, 2);
        assert_eq!(positions[0].speed, Some(8.5));
    }

    #[test]
    fn test_parse_tile_without_rows() {
        let (positions, rejected) = parse_tile(r#"{"data":{}}"#, "empty", Utc::now()).unwrap();
        assert!(positions.is_empty());
        assert_eq!(rejected, 0);
    }

    #[test]
    fn test_parse_tile_invalid_json() {
        let err = parse_tile("<html>blocked</html>", "tile", Utc::now()).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_file_source_first_tile_wins() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        fs::write(&a, TILE_A).unwrap();
        fs::write(&b, TILE_B).unwrap();

        let batch = FilePositionSource::new(vec![a, b]).fetch().await.unwrap();

        let ids: Vec<_> = batch.positions.iter().map(|p| p.vessel_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "4"]);
        assert_eq!(batch.positions[0].location.lat, 24.0);
        assert_eq!(batch.rejected, 2);
    }

    #[tokio::test]
    async fn test_file_source_partial_failure_is_ok() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.json");
        fs::write(&a, TILE_A).unwrap();

        let source = FilePositionSource::new(vec![dir.path().join("missing.json"), a]);
        assert_eq!(source.fetch().await.unwrap().positions.len(), 2);
    }

    #[tokio::test]
    async fn test_file_source_all_failed() {
        let dir = tempdir().unwrap();
        let source = FilePositionSource::new(vec![dir.path().join("missing.json")]);
        assert!(matches!(source.fetch().await, Err(SourceError::AllSourcesFailed(1))));
    }

    #[tokio::test]
    async fn test_no_sources_is_rejected() {
        let http = HttpPositionSource::new(Vec::new(), Duration::from_secs(5), "vessel-watch/test");
        assert!(matches!(http, Err(SourceError::NoSources)));

        let files = FilePositionSource::new(Vec::new());
        assert!(matches!(files.fetch().await, Err(SourceError::NoSources)));
    }
}
