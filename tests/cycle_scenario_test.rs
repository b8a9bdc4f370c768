//! End-to-end cycle over files: tiers, a position tile, state and mail spool

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use vessel_watch::domain::landmarks::default_landmarks;
use vessel_watch::domain::zone::ZoneKind;
use vessel_watch::infra::Metrics;
use vessel_watch::io::{
    load_tier, FilePositionSource, JsonFileStateStore, JsonlClassificationLog, MailSpoolChannel,
    RenderContext, StateStore,
};
use vessel_watch::services::{
    CycleEngine, CycleOptions, CycleRunner, NotificationDispatcher, WatchFilter, ZoneRegistry,
};

fn square(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> String {
    format!(
        r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","properties":{{}},
        "geometry":{{"type":"Polygon","coordinates":[[[{lon0},{lat0}],[{lon1},{lat0}],[{lon1},{lat1}],[{lon0},{lat1}],[{lon0},{lat0}]]]}}}}]}}"#
    )
}

const TILE: &str = r#"{"data":{"rows":[
    {"SHIP_ID":"1","SHIPNAME":"CHINACOASTGUARD2901","LAT":"24.0","LON":"121.0","SPEED":"85","COURSE":"90"},
    {"SHIP_ID":"2","SHIPNAME":"EVER GIVEN","LAT":23.0,"LON":120.0},
    {"SHIP_ID":"3","SHIPNAME":"CHINACOASTGUARD1","LAT":"","LON":""}
]}}"#;

struct Site {
    dir: TempDir,
    tile: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("inner.geojson"), square(120.5, 23.5, 121.5, 24.5)).unwrap();
        fs::write(dir.path().join("outer.geojson"), square(119.0, 22.0, 124.0, 26.0)).unwrap();
        let tile = dir.path().join("tile.json");
        fs::write(&tile, TILE).unwrap();
        Self { dir, tile }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn runner(&self) -> CycleRunner {
        let inner = load_tier(&self.path("inner.geojson"), ZoneKind::Inner, "inner").unwrap();
        let outer = load_tier(&self.path("outer.geojson"), ZoneKind::Outer, "outer").unwrap();
        let registry = Arc::new(ZoneRegistry::new(inner, outer));

        let state_store = Arc::new(JsonFileStateStore::new(self.path("state/alerted.json")));
        let mut engine = CycleEngine::new(WatchFilter::default(), Duration::from_secs(480));
        engine.restore_state(state_store.load());

        let render = Arc::new(RenderContext::new(default_landmarks(), 8));
        let mail = MailSpoolChannel::new(Some("ops@example.org".to_string()), self.path("spool/mail.jsonl"), render);
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5)).with_channel(Arc::new(mail));

        let source = Arc::new(FilePositionSource::new(vec![self.tile.clone()]));
        CycleRunner::new(engine, registry, source, dispatcher, Arc::new(Metrics::new()))
            .with_state_store(state_store)
            .with_classification_log(Arc::new(JsonlClassificationLog::new(self.path("logs/classifications.jsonl"))))
    }
}

fn lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_cycle_from_files_to_spool() {
    let site = Site::new();
    let runner = site.runner();

    let outcome = runner.run_cycle(CycleOptions::default()).await.unwrap();

    assert_eq!(outcome.positions, 2);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(outcome.classified, 2);
    assert_eq!(outcome.watched, 1);
    assert_eq!(outcome.events, 1);
    assert!(outcome.dispatched);

    let mails = lines(&site.path("spool/mail.jsonl"));
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0]["to"], "ops@example.org");
    assert!(mails[0]["subject"].as_str().unwrap().starts_with("[ALERT]"));
    assert!(mails[0]["html"].as_str().unwrap().contains("CHINACOASTGUARD2901"));

    let logged = lines(&site.path("logs/classifications.jsonl"));
    assert_eq!(logged.len(), 2);
    assert!(logged.iter().all(|l| l["cycle_id"] == outcome.cycle_id.as_str()));

    let state = fs::read_to_string(site.path("state/alerted.json")).unwrap();
    assert!(state.contains("CHINACOASTGUARD2901"));
}

#[tokio::test]
async fn test_restart_does_not_refire_enter() {
    let site = Site::new();
    site.runner().run_cycle(CycleOptions::default()).await.unwrap();

    // Fresh process: engine restored from the state file
    let restarted = site.runner();
    assert_eq!(restarted.tracked_vessels().await, 1);

    // Same fleet inside the cooldown window: no transition and no resend
    let outcome = restarted.run_cycle(CycleOptions::default()).await.unwrap();
    assert_eq!(outcome.events, 0);
    assert!(!outcome.dispatched);
    assert_eq!(lines(&site.path("spool/mail.jsonl")).len(), 1);
}

#[tokio::test]
async fn test_missing_tile_fails_cycle() {
    let site = Site::new();
    let runner = site.runner();
    fs::remove_file(&site.tile).unwrap();

    assert!(runner.run_cycle(CycleOptions::default()).await.is_err());
    assert!(!site.path("spool/mail.jsonl").exists());
}
