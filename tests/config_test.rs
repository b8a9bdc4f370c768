//! Integration tests for configuration loading

use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use vessel_watch::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "taipei"

[source]
urls = ["https://tiles.example.org/z:10/X:426/Y:217", "https://tiles.example.org/z:10/X:427/Y:217"]
timeout_secs = 5

[zones]
inner = "zones/inner.geojson"
outer = "zones/outer.geojson"
custom = "zones/custom.geojson"

[watch]
name_prefixes = ["CHINACOASTGUARD", "CHINA COAST GUARD"]
flags = ["CN"]

[alerts]
cooldown_secs = 300
utc_offset_hours = 9

[schedule]
interval_secs = 120
startup_health_check = false

[line]
enabled = true
access_token = "file-token"
target_user_id = "U0001"

[email]
enabled = true
recipient = "ops@example.org"

[mqtt]
enabled = true
host = "broker.local"
topic = "ops/vessels"

[storage]
state_file = "/var/lib/vessel-watch/alerted.json"

[metrics]
interval_secs = 30
prometheus_port = 9191

[[landmarks.points]]
name = "Pengjia Islet"
lat = 25.628
lon = 122.077
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "taipei");
    assert_eq!(config.source_urls().len(), 2);
    assert_eq!(config.source_timeout(), Duration::from_secs(5));
    assert_eq!(config.custom_zone_file(), Some(Path::new("zones/custom.geojson")));
    assert_eq!(config.watch_flags(), &["CN".to_string()]);
    assert_eq!(config.cooldown(), Duration::from_secs(300));
    assert_eq!(config.utc_offset_hours(), 9);
    assert_eq!(config.interval(), Duration::from_secs(120));
    assert!(!config.startup_health_check());
    assert_eq!(config.line_access_token(), Some("file-token"));
    assert_eq!(config.email_recipient(), Some("ops@example.org"));
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.mqtt_topic(), "ops/vessels");
    assert_eq!(config.classification_log(), Path::new("logs/classifications.jsonl"));
    assert_eq!(config.prometheus_port(), 9191);
    assert_eq!(config.landmarks().len(), 1);
    assert_eq!(config.landmarks()[0].name, "Pengjia Islet");
}

#[test]
fn test_broken_file_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[alerts]\ncooldown_secs = \"soon\"\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.cooldown(), Duration::from_secs(480));
    assert_eq!(config.interval(), Duration::from_secs(600));
}
