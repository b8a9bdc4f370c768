//! Notification dispatcher - fan-out of an approved payload to all channels
//!
//! Every configured channel runs in its own task with its own timeout. A
//! failure, timeout or panic in one channel is logged and recorded in the
//! report; it never affects the other channels or the cycle.

use crate::domain::events::AlertPayload;
use crate::error::DispatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A notification transport
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    /// False when credentials or the target are missing; the channel is skipped
    fn is_configured(&self) -> bool;

    async fn deliver(&self, payload: &AlertPayload) -> Result<(), DispatchError>;
}

/// Per-channel outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { channels: Vec::new(), timeout }
    }

    /// Builder: add a channel
    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn dispatch(&self, payload: Arc<AlertPayload>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut handles = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let name = channel.name().to_string();
            if !channel.is_configured() {
                debug!(channel = %name, "channel_not_configured");
                report.skipped.push(name);
                continue;
            }

            let channel = channel.clone();
            let payload = payload.clone();
            let timeout = self.timeout;
            let handle = tokio::spawn(async move {
                let start = Instant::now();
                let result = match tokio::time::timeout(timeout, channel.deliver(&payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout(timeout)),
                };
                (result, start.elapsed())
            });
            handles.push((name, handle));
        }

        // Tasks already run concurrently; awaiting in order only collects them
        for (name, handle) in handles {
            match handle.await {
                Ok((Ok(()), elapsed)) => {
                    info!(
                        channel = %name,
                        cycle_id = %payload.cycle_id,
                        latency_ms = %elapsed.as_millis(),
                        "alert_delivered"
                    );
                    report.delivered.push(name);
                }
                Ok((Err(e), elapsed)) => {
                    warn!(
                        channel = %name,
                        cycle_id = %payload.cycle_id,
                        error = %e,
                        latency_ms = %elapsed.as_millis(),
                        "alert_delivery_failed"
                    );
                    report.failed.push((name, e.to_string()));
                }
                Err(e) => {
                    warn!(channel = %name, error = %e, "alert_channel_panicked");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        Fail,
        Hang,
        Panic,
    }

    struct TestChannel {
        name: &'static str,
        configured: bool,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl TestChannel {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self { name, configured: true, behavior, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl AlertChannel for TestChannel {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn deliver(&self, _payload: &AlertPayload) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(DispatchError::Rejected { status: 401, body: "denied".into() }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
                Behavior::Panic => panic!("renderer bug"),
            }
        }
    }

    fn payload() -> Arc<AlertPayload> {
        Arc::new(AlertPayload {
            cycle_id: "test".to_string(),
            created_at: Utc::now(),
            inside: vec![],
            outside: vec![],
            exited: vec![],
            zone_intrusions: vec![],
            entered: vec![],
            forced: true,
        })
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let ok = TestChannel::new("ok", Behavior::Succeed);
        let dispatcher = NotificationDispatcher::new(Duration::from_millis(200))
            .with_channel(TestChannel::new("failing", Behavior::Fail))
            .with_channel(TestChannel::new("slow", Behavior::Hang))
            .with_channel(TestChannel::new("broken", Behavior::Panic))
            .with_channel(ok.clone());

        let report = dispatcher.dispatch(payload()).await;

        assert_eq!(report.delivered, vec!["ok".to_string()]);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().any(|(n, e)| n == "slow" && e.contains("timed out")));
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_skipped() {
        let channel = Arc::new(TestChannel {
            name: "line",
            configured: false,
            behavior: Behavior::Succeed,
            calls: AtomicUsize::new(0),
        });
        let dispatcher =
            NotificationDispatcher::new(Duration::from_secs(1)).with_channel(channel.clone());

        let report = dispatcher.dispatch(payload()).await;

        assert_eq!(report.skipped, vec!["line".to_string()]);
        assert_eq!(report.attempted(), 0);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }
}
