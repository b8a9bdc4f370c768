//! MQTT alert channel
//!
//! Publishes every approved payload as JSON on one topic with QoS 1
//! (at-least-once). The rumqttc event loop runs in its own task and
//! reconnects on error.

use crate::domain::events::AlertPayload;
use crate::error::DispatchError;
use crate::infra::config::Config;
use crate::services::dispatcher::AlertChannel;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct MqttAlertChannel {
    client: AsyncClient,
    topic: String,
}

impl MqttAlertChannel {
    /// Create the client and spawn its event loop. Must run inside a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("vessel-watch-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_alerts_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_alerts_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_alerts_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!(
            host = %config.mqtt_host(),
            port = %config.mqtt_port(),
            topic = %config.mqtt_topic(),
            "mqtt_alerts_started"
        );

        Self { client, topic: config.mqtt_topic().to_string() }
    }
}

#[async_trait]
impl AlertChannel for MqttAlertChannel {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn is_configured(&self) -> bool {
        !self.topic.is_empty()
    }

    async fn deliver(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let json = serde_json::to_vec(payload)?;
        // Resolves once the request is queued; PubAck arrives on the event loop
        self.client.publish(&self.topic, QoS::AtLeastOnce, false, json).await?;
        debug!(cycle_id = %payload.cycle_id, topic = %self.topic, "mqtt_alert_published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_is_queued_without_broker() {
        let channel = MqttAlertChannel::new(&Config::default());
        assert!(channel.is_configured());
        assert_eq!(channel.name(), "mqtt");

        let payload = AlertPayload {
            cycle_id: "c1".to_string(),
            created_at: Utc::now(),
            inside: vec![],
            outside: vec![],
            exited: vec![],
            zone_intrusions: vec![],
            entered: vec![],
            forced: true,
        };
        channel.deliver(&payload).await.unwrap();
    }
}
