//! Prometheus metrics HTTP endpoint
//!
//! - `GET /metrics` - cycle metrics in Prometheus text format
//! - `GET /health` - liveness
//! - `POST /cycle/run` - run a forced health-check cycle and return its outcome
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::cycle::{CycleOptions, CycleTrigger};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS};
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, site_id, &summary);
    write_position_metrics(&mut output, site_id, &summary);
    write_dispatch_metrics(&mut output, site_id, &summary);
    write_state_metrics(&mut output, site_id, &summary);

    output
}

fn write_cycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "vessel_watch_cycles_total",
        "Completed polling cycles",
        MetricType::Counter,
        site,
        summary.cycles_total,
    );
    write_metric(
        output,
        "vessel_watch_cycles_failed_total",
        "Cycles aborted by a position fetch failure",
        MetricType::Counter,
        site,
        summary.cycles_failed_total,
    );
    write_histogram(
        output,
        "vessel_watch_cycle_duration_ms",
        "Cycle duration in milliseconds",
        site,
        &summary.cycle_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.cycle_latency_avg_ms,
    );
    write_metric(
        output,
        "vessel_watch_cycle_duration_p99_ms",
        "99th percentile cycle duration",
        MetricType::Gauge,
        site,
        summary.cycle_latency_p99_ms,
    );
}

fn write_position_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "vessel_watch_positions_total",
        "Valid position reports received",
        MetricType::Counter,
        site,
        summary.positions_total,
    );
    write_metric(
        output,
        "vessel_watch_positions_rejected_total",
        "Position reports dropped as invalid",
        MetricType::Counter,
        site,
        summary.positions_rejected_total,
    );
    write_metric(
        output,
        "vessel_watch_transition_events_total",
        "Zone membership transitions emitted",
        MetricType::Counter,
        site,
        summary.events_total,
    );
}

fn write_dispatch_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "vessel_watch_dispatches_total",
        "Alert payloads handed to the dispatcher",
        MetricType::Counter,
        site,
        summary.dispatches_total,
    );
    write_metric(
        output,
        "vessel_watch_channel_deliveries_total",
        "Successful channel deliveries",
        MetricType::Counter,
        site,
        summary.channel_deliveries_total,
    );
    write_metric(
        output,
        "vessel_watch_channel_failures_total",
        "Failed, timed out or panicked channel deliveries",
        MetricType::Counter,
        site,
        summary.channel_failures_total,
    );
}

fn write_state_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "vessel_watch_tracked_vessels",
        "Vessels currently retained by the state tracker",
        MetricType::Gauge,
        site,
        summary.tracked_vessels,
    );
    write_metric(
        output,
        "vessel_watch_custom_zones",
        "Custom zones in the current snapshot",
        MetricType::Gauge,
        site,
        summary.custom_zones,
    );
    write_metric(
        output,
        "vessel_watch_zone_reload_failures_total",
        "Custom zone reloads that kept the previous set",
        MetricType::Counter,
        site,
        summary.zone_reload_failures_total,
    );
    write_metric(
        output,
        "vessel_watch_persistence_failures_total",
        "Classification log or state snapshot write failures",
        MetricType::Counter,
        site,
        summary.persistence_failures_total,
    );
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
    trigger: Option<Arc<dyn CycleTrigger>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::POST, "/cycle/run") => with_cors(run_cycle(trigger).await),
        (&Method::OPTIONS, "/cycle/run") => {
            let mut response = with_cors(respond(StatusCode::OK, "text/plain", ""));
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS"));
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
            response
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Manual health-check cycle - POST /cycle/run
async fn run_cycle(trigger: Option<Arc<dyn CycleTrigger>>) -> Response<Full<Bytes>> {
    let Some(trigger) = trigger else {
        return respond(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            r#"{"ok":false,"error":"cycle_trigger_not_configured"}"#,
        );
    };

    match trigger.trigger(CycleOptions::health_check()).await {
        Ok(outcome) => {
            info!(cycle_id = %outcome.cycle_id, "manual_cycle_run");
            let body = serde_json::json!({ "ok": true, "outcome": outcome });
            respond(StatusCode::OK, "application/json", body.to_string())
        }
        Err(e) => {
            warn!(error = %e, "manual_cycle_failed");
            let body = serde_json::json!({ "ok": false, "error": e.to_string() });
            respond(StatusCode::BAD_GATEWAY, "application/json", body.to_string())
        }
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    trigger: Option<Arc<dyn CycleTrigger>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();
                        let trigger = trigger.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                let trigger = trigger.clone();
                                async move { handle_request(req, metrics, site_id, trigger).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CycleError, SourceError};
    use crate::services::cycle::CycleOutcome;
    use async_trait::async_trait;
    use http_body_util::BodyExt;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_cycle_completed(300, 2);
        metrics.record_cycle_completed(1200, 0);
        metrics.record_positions(40, 1);
        metrics.set_tracked_vessels(5);

        let output = format_prometheus_metrics(&metrics, "taipei");

        assert!(output.contains("vessel_watch_cycles_total{site=\"taipei\"} 2"));
        assert!(output.contains("vessel_watch_cycle_duration_ms_bucket{site=\"taipei\",le=\"250\"} 0"));
        assert!(output.contains("vessel_watch_cycle_duration_ms_bucket{site=\"taipei\",le=\"500\"} 1"));
        assert!(output.contains("vessel_watch_cycle_duration_ms_bucket{site=\"taipei\",le=\"+Inf\"} 2"));
        assert!(output.contains("vessel_watch_cycle_duration_ms_count{site=\"taipei\"} 2"));
        assert!(output.contains("vessel_watch_positions_rejected_total{site=\"taipei\"} 1"));
        assert!(output.contains("vessel_watch_tracked_vessels{site=\"taipei\"} 5"));
    }

    #[test]
    fn test_scrape_does_not_reset_report() {
        let metrics = Metrics::new();
        metrics.record_cycle_completed(300, 0);
        let _ = format_prometheus_metrics(&metrics, "s");
        assert_eq!(metrics.report().cycles_since_report, 1);
    }

    struct FixedTrigger {
        fail: bool,
    }

    #[async_trait]
    impl CycleTrigger for FixedTrigger {
        async fn trigger(&self, options: CycleOptions) -> Result<CycleOutcome, CycleError> {
            assert_eq!(options, CycleOptions::health_check());
            if self.fail {
                return Err(SourceError::AllSourcesFailed(2).into());
            }
            Ok(CycleOutcome {
                cycle_id: "manual".to_string(),
                positions: 3,
                rejected: 0,
                classified: 3,
                watched: 1,
                events: 0,
                dispatched: true,
                dispatch: None,
                duration_ms: 12,
            })
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_run_cycle_responses() {
        let response = run_cycle(Some(Arc::new(FixedTrigger { fail: false }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["outcome"]["cycle_id"], "manual");

        let response = run_cycle(Some(Arc::new(FixedTrigger { fail: true }))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["ok"], false);

        let response = run_cycle(None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
