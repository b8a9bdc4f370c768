//! Vessel watch - coast guard vessel zone classification and alerting
//!
//! Polls vessel positions on a fixed interval, classifies them against the
//! inner/outer tiers and custom zones, tracks membership transitions and
//! dispatches deduplicated alerts to LINE, email and MQTT.
//!
//! Module structure:
//! - `domain/` - Core types (positions, zones, classifications, events)
//! - `io/` - External interfaces (position source, zone files, channels)
//! - `services/` - Business logic (classifier, tracker, dedup, cycle)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use vessel_watch::domain::zone::ZoneKind;
use vessel_watch::infra::{Config, Metrics};
use vessel_watch::io::{
    load_tier, FilePositionSource, GeoJsonZoneStore, HttpPositionSource, JsonFileStateStore,
    JsonlClassificationLog, LinePushChannel, MailSpoolChannel, MqttAlertChannel, PositionSource,
    RenderContext, StateStore,
};
use vessel_watch::io::prometheus::start_metrics_server;
use vessel_watch::services::{
    run_schedule, CycleEngine, CycleOptions, CycleRunner, CycleTrigger, NotificationDispatcher,
    WatchFilter, ZoneRegistry,
};

/// Vessel watch - zone classification and alert engine
#[derive(Parser, Debug)]
#[command(name = "vessel-watch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for full cycle visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "vessel_watch_starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        sources = %config.source_urls().len(),
        source_files = %config.source_files().len(),
        inner = %config.inner_zone_file().display(),
        outer = %config.outer_zone_file().display(),
        cooldown_secs = %config.cooldown().as_secs(),
        interval_secs = %config.interval().as_secs(),
        line = %config.line_enabled(),
        email = %config.email_enabled(),
        mqtt = %config.mqtt_enabled(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Fixed tiers are required; a broken tier file is fatal
    let inner = load_tier(config.inner_zone_file(), ZoneKind::Inner, "inner")
        .context("failed to load inner tier")?;
    let outer = load_tier(config.outer_zone_file(), ZoneKind::Outer, "outer")
        .context("failed to load outer tier")?;
    let registry = Arc::new(ZoneRegistry::new(inner, outer));

    let zone_store = config.custom_zone_file().map(GeoJsonZoneStore::new);
    if let Some(store) = &zone_store {
        if let Ok(count) = registry.reload_custom(store) {
            info!(custom_zones = %count, "custom_zones_loaded");
        }
    }

    let filter = WatchFilter::new(config.watch_name_prefixes(), config.watch_flags());
    let mut engine = CycleEngine::new(filter, config.cooldown());
    let state_store = Arc::new(JsonFileStateStore::new(config.state_file()));
    engine.restore_state(state_store.load());

    // Without any source every cycle would fail; refuse to start
    let source: Arc<dyn PositionSource> = if config.source_files().is_empty() {
        Arc::new(
            HttpPositionSource::new(
                config.source_urls().to_vec(),
                config.source_timeout(),
                config.user_agent(),
            )
            .context("failed to build position source (set source.urls or source.files)")?,
        )
    } else {
        Arc::new(FilePositionSource::new(config.source_files().to_vec()))
    };

    let render = Arc::new(RenderContext::new(config.landmarks().to_vec(), config.utc_offset_hours()));
    let mut dispatcher = NotificationDispatcher::new(config.dispatch_timeout());
    if config.line_enabled() {
        let line = LinePushChannel::new(
            config.line_access_token().map(str::to_string),
            config.line_target().map(str::to_string),
            render.clone(),
            config.dispatch_timeout(),
        )
        .context("failed to build LINE channel")?;
        dispatcher = dispatcher.with_channel(Arc::new(line));
    }
    if config.email_enabled() {
        dispatcher = dispatcher.with_channel(Arc::new(MailSpoolChannel::new(
            config.email_recipient().map(str::to_string),
            config.email_spool_file(),
            render.clone(),
        )));
    }
    if config.mqtt_enabled() {
        dispatcher = dispatcher.with_channel(Arc::new(MqttAlertChannel::new(&config)));
    }
    info!(channels = %dispatcher.channel_count(), "dispatcher_ready");

    let metrics = Arc::new(Metrics::new());
    let mut runner = CycleRunner::new(engine, registry, source, dispatcher, metrics.clone())
        .with_state_store(state_store)
        .with_classification_log(Arc::new(JsonlClassificationLog::new(config.classification_log())));
    if let Some(store) = zone_store {
        runner = runner.with_zone_store(Arc::new(store));
    }
    let runner = Arc::new(runner);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start Prometheus metrics server (0 disables)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let metrics = metrics.clone();
        let site_id = config.site_id().to_string();
        let trigger: Arc<dyn CycleTrigger> = runner.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_metrics_server(prometheus_port, metrics, site_id, Some(trigger), shutdown).await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics = metrics.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => metrics.report().log(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    let startup = config.startup_health_check().then(CycleOptions::health_check);
    let scheduler = tokio::spawn(run_schedule(runner, config.interval(), startup, shutdown_rx));

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl+c")?;
    info!("shutdown_requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler_join_failed");
    }
    info!("vessel_watch_stopped");
    Ok(())
}
