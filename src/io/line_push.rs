//! LINE Messaging API push channel
//!
//! One push per approved section:
//! - tier carousel (at most 12 cards, red header for inner, orange for outer)
//! - departure bubble (green) listing vessels that left both tiers
//! - custom-zone intrusion carousel (at most 10 cards)
//! - plain text summary for an empty forced payload

use crate::domain::events::{AlertPayload, ExitAlert, TierAlert, ZoneAlert};
use crate::domain::types::Tier;
use crate::error::DispatchError;
use crate::io::render::{google_maps_url, marine_traffic_url, RenderContext};
use crate::services::dispatcher::AlertChannel;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

const MAX_TIER_CARDS: usize = 12;
const MAX_ZONE_CARDS: usize = 10;

const INNER_COLOR: &str = "#B71C1C";
const OUTER_COLOR: &str = "#EF6C00";
const DEPARTURE_COLOR: &str = "#2E7D32";
const ZONE_COLOR: &str = "#D32F2F";

fn tier_card(alert: &TierAlert, render: &RenderContext) -> Value {
    let (color, title) = match alert.tier {
        Tier::Inner => (INNER_COLOR, "Coast guard vessel inside the inner zone"),
        _ => (OUTER_COLOR, "Coast guard vessel inside the outer zone"),
    };
    let title = if alert.newly_entered { format!("NEW: {title}") } else { title.to_string() };
    let course = alert.course.map_or("-".to_string(), |c| format!("{c:.0}"));
    let speed = alert.speed.map_or("- kn".to_string(), |s| format!("{s:.1} kn"));

    let mut body = vec![
        json!({"type": "text", "text": alert.name, "weight": "bold", "size": "md"}),
        json!({"type": "text", "text": format!("{:.6}, {:.6}", alert.location.lat, alert.location.lon), "size": "sm"}),
        json!({"type": "text", "text": format!("Course {course} | {speed}"), "size": "sm"}),
        json!({"type": "text", "text": format!("Observed {}", render.local_time(alert.observed_at)), "size": "sm"}),
    ];
    if let (Tier::Outer, Some(km)) = (alert.tier, alert.distance_to_inner_km) {
        body.push(json!({"type": "text", "text": format!("{km:.2} km to the inner boundary"), "size": "sm"}));
    }
    body.push(json!({"type": "separator", "margin": "md"}));
    body.push(json!({"type": "text", "text": render.describe(alert.location), "size": "sm", "wrap": true}));

    json!({
        "type": "bubble",
        "header": {
            "type": "box",
            "layout": "vertical",
            "backgroundColor": color,
            "contents": [{"type": "text", "text": title, "weight": "bold", "color": "#FFFFFF", "wrap": true}]
        },
        "body": {"type": "box", "layout": "vertical", "spacing": "sm", "contents": body},
        "footer": {
            "type": "box",
            "layout": "vertical",
            "spacing": "sm",
            "contents": [
                {"type": "button", "style": "primary", "color": color,
                 "action": {"type": "uri", "label": "Google Maps", "uri": google_maps_url(alert.location)}},
                {"type": "button", "style": "link",
                 "action": {"type": "uri", "label": "MarineTraffic", "uri": marine_traffic_url(alert.location)}}
            ]
        }
    })
}

/// Inside vessels first, then outside, capped at 12 cards
pub fn tier_carousel(inside: &[TierAlert], outside: &[TierAlert], render: &RenderContext) -> Value {
    let bubbles: Vec<Value> = inside
        .iter()
        .chain(outside)
        .take(MAX_TIER_CARDS)
        .map(|a| tier_card(a, render))
        .collect();
    json!({
        "type": "flex",
        "altText": "Coast guard vessel activity",
        "contents": {"type": "carousel", "contents": bubbles}
    })
}

pub fn departure_bubble(exited: &[ExitAlert], render: &RenderContext) -> Value {
    let mut body = vec![json!({"type": "text", "text": "Left the watched waters:", "size": "sm", "wrap": true})];
    body.extend(exited.iter().map(|e| {
        json!({
            "type": "text",
            "text": format!("{}  {}", e.name, render.landmark_distance(e.last_location)),
            "size": "sm",
            "wrap": true
        })
    }));
    body.push(json!({"type": "separator", "margin": "md"}));
    if let Some(at) = exited.iter().map(|e| e.exited_at).max() {
        body.push(json!({"type": "text", "text": render.local_time(at), "size": "xs", "color": "#777777"}));
    }

    json!({
        "type": "flex",
        "altText": "Coast guard vessels left the watched waters",
        "contents": {
            "type": "bubble",
            "header": {
                "type": "box",
                "layout": "vertical",
                "backgroundColor": DEPARTURE_COLOR,
                "contents": [{"type": "text", "text": "Update: left the alert zone", "weight": "bold", "color": "#FFFFFF"}]
            },
            "body": {"type": "box", "layout": "vertical", "spacing": "sm", "contents": body}
        }
    })
}

fn zone_card(alert: &ZoneAlert, render: &RenderContext) -> Value {
    json!({
        "type": "bubble",
        "size": "micro",
        "body": {
            "type": "box",
            "layout": "vertical",
            "spacing": "sm",
            "paddingAll": "12px",
            "contents": [
                {"type": "text", "text": "Custom zone intrusion", "weight": "bold", "size": "md", "color": ZONE_COLOR},
                {"type": "text", "text": format!("Zone: {}", alert.zone_name), "wrap": true, "size": "sm"},
                {"type": "text", "text": format!("Vessel: {}", alert.name), "wrap": true, "size": "sm"},
                {"type": "text", "text": format!("{:.4},{:.4}", alert.location.lat, alert.location.lon), "size": "xs"},
                {"type": "text", "text": render.local_time(alert.observed_at), "size": "xs", "color": "#777777"},
                {"type": "button", "style": "link", "height": "sm",
                 "action": {"type": "uri", "label": "Google Maps", "uri": google_maps_url(alert.location)}},
                {"type": "button", "style": "link", "height": "sm",
                 "action": {"type": "uri", "label": "MarineTraffic", "uri": marine_traffic_url(alert.location)}}
            ]
        }
    })
}

pub fn zone_carousel(alerts: &[ZoneAlert], render: &RenderContext) -> Value {
    let bubbles: Vec<Value> = alerts.iter().take(MAX_ZONE_CARDS).map(|a| zone_card(a, render)).collect();
    json!({
        "type": "flex",
        "altText": "Custom zone intrusion alert",
        "contents": {"type": "carousel", "contents": bubbles}
    })
}

pub fn summary_text(payload: &AlertPayload, render: &RenderContext) -> Value {
    json!({
        "type": "text",
        "text": format!(
            "Vessel watch is running ({}). No coast guard vessels inside the watched zones.",
            render.local_time(payload.created_at)
        )
    })
}

/// All messages for one payload, in push order
pub fn build_messages(payload: &AlertPayload, render: &RenderContext) -> Vec<Value> {
    let mut messages = Vec::new();
    if !payload.inside.is_empty() || !payload.outside.is_empty() {
        messages.push(tier_carousel(&payload.inside, &payload.outside, render));
    }
    if !payload.exited.is_empty() {
        messages.push(departure_bubble(&payload.exited, render));
    }
    if !payload.zone_intrusions.is_empty() {
        messages.push(zone_carousel(&payload.zone_intrusions, render));
    }
    if messages.is_empty() {
        messages.push(summary_text(payload, render));
    }
    messages
}

pub struct LinePushChannel {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    target: Option<String>,
    render: Arc<RenderContext>,
}

impl LinePushChannel {
    pub fn new(
        access_token: Option<String>,
        target: Option<String>,
        render: Arc<RenderContext>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_PUSH_ENDPOINT.to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            target: target.filter(|t| !t.trim().is_empty()),
            render,
        })
    }

    /// Builder: push to another endpoint (test servers, proxies)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn push(&self, token: &str, target: &str, message: Value) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(&json!({"to": target, "messages": [message]}))?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected { status: status.as_u16(), body });
        }
        Ok(())
    }
}

#[async_trait]
impl AlertChannel for LinePushChannel {
    fn name(&self) -> &str {
        "line"
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.target.is_some()
    }

    async fn deliver(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let (Some(token), Some(target)) = (&self.access_token, &self.target) else {
            return Ok(());
        };
        let messages = build_messages(payload, &self.render);
        let count = messages.len();
        for message in messages {
            self.push(token, target, message).await?;
        }
        debug!(cycle_id = %payload.cycle_id, messages = %count, "line_push_sent");
        Ok(())
    }
}
