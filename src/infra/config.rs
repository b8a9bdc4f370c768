//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Secrets may also come from the environment, overriding the file:
//! `LINE_ACCESS_TOKEN`, `LINE_TARGET_USER_ID`, `ALERT_EMAIL_TO`,
//! `MQTT_USERNAME`, `MQTT_PASSWORD`.

use crate::domain::landmarks::{default_landmarks, Landmark};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier used as the Prometheus `site` label
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "vessel-watch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Tile URLs fetched concurrently every cycle
    #[serde(default)]
    pub urls: Vec<String>,
    /// Local tile files; used instead of `urls` when non-empty
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            files: Vec::new(),
            timeout_secs: default_source_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_source_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) vessel-watch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    #[serde(default = "default_inner_path")]
    pub inner: String,
    #[serde(default = "default_outer_path")]
    pub outer: String,
    /// Custom zone FeatureCollection, re-read every cycle
    #[serde(default)]
    pub custom: Option<String>,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self { inner: default_inner_path(), outer: default_outer_path(), custom: None }
    }
}

fn default_inner_path() -> String {
    "data/inner.geojson".to_string()
}

fn default_outer_path() -> String {
    "data/outer.geojson".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { name_prefixes: default_name_prefixes(), flags: Vec::new() }
    }
}

fn default_name_prefixes() -> Vec<String> {
    vec!["CHINACOASTGUARD".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Per-channel delivery timeout
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Display offset for rendered times
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    480
}

fn default_dispatch_timeout_secs() -> u64 {
    15
}

fn default_utc_offset_hours() -> i32 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Run one forced cycle with an empty summary at startup
    #[serde(default = "default_true")]
    pub startup_health_check: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs(), startup_health_check: true }
    }
}

fn default_interval_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LineConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub target_user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default = "default_spool_file")]
    pub spool_file: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self { enabled: false, recipient: None, spool_file: default_spool_file() }
    }
}

fn default_spool_file() -> String {
    "spool/mail.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "vessel-watch/alerts".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_classification_log")]
    pub classification_log: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_file: default_state_file(), classification_log: default_classification_log() }
    }
}

fn default_state_file() -> String {
    "state/alerted.json".to_string()
}

fn default_classification_log() -> String {
    "logs/classifications.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LandmarksConfig {
    /// Replaces the built-in list when non-empty
    #[serde(default)]
    pub points: Vec<Landmark>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub landmarks: LandmarksConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    source_urls: Vec<String>,
    source_files: Vec<PathBuf>,
    source_timeout: Duration,
    user_agent: String,
    inner_zone_file: PathBuf,
    outer_zone_file: PathBuf,
    custom_zone_file: Option<PathBuf>,
    watch_name_prefixes: Vec<String>,
    watch_flags: Vec<String>,
    cooldown: Duration,
    dispatch_timeout: Duration,
    utc_offset_hours: i32,
    interval: Duration,
    startup_health_check: bool,
    line_enabled: bool,
    line_access_token: Option<String>,
    line_target: Option<String>,
    email_enabled: bool,
    email_recipient: Option<String>,
    email_spool_file: PathBuf,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    state_file: PathBuf,
    classification_log: PathBuf,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    landmarks: Vec<Landmark>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

/// Empty or whitespace-only strings count as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let landmarks = if toml_config.landmarks.points.is_empty() {
            default_landmarks()
        } else {
            toml_config.landmarks.points
        };

        Self {
            site_id: toml_config.site.id,
            source_urls: toml_config.source.urls,
            source_files: toml_config.source.files.into_iter().map(PathBuf::from).collect(),
            source_timeout: Duration::from_secs(toml_config.source.timeout_secs),
            user_agent: toml_config.source.user_agent,
            inner_zone_file: PathBuf::from(toml_config.zones.inner),
            outer_zone_file: PathBuf::from(toml_config.zones.outer),
            custom_zone_file: non_empty(toml_config.zones.custom).map(PathBuf::from),
            watch_name_prefixes: toml_config.watch.name_prefixes,
            watch_flags: toml_config.watch.flags,
            cooldown: Duration::from_secs(toml_config.alerts.cooldown_secs),
            dispatch_timeout: Duration::from_secs(toml_config.alerts.dispatch_timeout_secs),
            utc_offset_hours: toml_config.alerts.utc_offset_hours,
            interval: Duration::from_secs(toml_config.schedule.interval_secs.max(1)),
            startup_health_check: toml_config.schedule.startup_health_check,
            line_enabled: toml_config.line.enabled,
            line_access_token: non_empty(toml_config.line.access_token),
            line_target: non_empty(toml_config.line.target_user_id),
            email_enabled: toml_config.email.enabled,
            email_recipient: non_empty(toml_config.email.recipient),
            email_spool_file: PathBuf::from(toml_config.email.spool_file),
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: non_empty(toml_config.mqtt.username),
            mqtt_password: non_empty(toml_config.mqtt.password),
            state_file: PathBuf::from(toml_config.storage.state_file),
            classification_log: PathBuf::from(toml_config.storage.classification_log),
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            landmarks,
            config_file,
        }
    }

    /// Config file path: the `--config` flag, then `CONFIG_FILE`, then `config/dev.toml`
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        Self::resolve_config_path_with(cli, |key| env::var(key).ok())
    }

    fn resolve_config_path_with(cli: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> String {
        cli.map(str::to_string)
            .or_else(|| non_empty(lookup("CONFIG_FILE")))
            .unwrap_or_else(|| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(cli: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli))
    }

    /// Load from an explicit path, falling back to defaults; applies env overrides
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Override secrets from a key lookup (the process environment in production)
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = non_empty(lookup("LINE_ACCESS_TOKEN")) {
            self.line_access_token = Some(token);
        }
        if let Some(target) = non_empty(lookup("LINE_TARGET_USER_ID")) {
            self.line_target = Some(target);
        }
        if let Some(to) = non_empty(lookup("ALERT_EMAIL_TO")) {
            self.email_recipient = Some(to);
        }
        if let Some(user) = non_empty(lookup("MQTT_USERNAME")) {
            self.mqtt_username = Some(user);
        }
        if let Some(pass) = non_empty(lookup("MQTT_PASSWORD")) {
            self.mqtt_password = Some(pass);
        }
        self
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn source_urls(&self) -> &[String] {
        &self.source_urls
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn source_timeout(&self) -> Duration {
        self.source_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn inner_zone_file(&self) -> &Path {
        &self.inner_zone_file
    }

    pub fn outer_zone_file(&self) -> &Path {
        &self.outer_zone_file
    }

    pub fn custom_zone_file(&self) -> Option<&Path> {
        self.custom_zone_file.as_deref()
    }

    pub fn watch_name_prefixes(&self) -> &[String] {
        &self.watch_name_prefixes
    }

    pub fn watch_flags(&self) -> &[String] {
        &self.watch_flags
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn startup_health_check(&self) -> bool {
        self.startup_health_check
    }

    pub fn line_enabled(&self) -> bool {
        self.line_enabled
    }

    pub fn line_access_token(&self) -> Option<&str> {
        self.line_access_token.as_deref()
    }

    pub fn line_target(&self) -> Option<&str> {
        self.line_target.as_deref()
    }

    pub fn email_enabled(&self) -> bool {
        self.email_enabled
    }

    pub fn email_recipient(&self) -> Option<&str> {
        self.email_recipient.as_deref()
    }

    pub fn email_spool_file(&self) -> &Path {
        &self.email_spool_file
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn classification_log(&self) -> &Path {
        &self.classification_log
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
