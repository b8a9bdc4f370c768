//! Email channel - renders an HTML alert mail and appends it to a spool file
//!
//! The site mailer drains the spool (one JSON object per line) and owns SMTP.

use crate::domain::events::{AlertPayload, TierAlert, ZoneAlert};
use crate::domain::geometry::LatLon;
use crate::error::DispatchError;
use crate::io::render::{google_maps_url, marine_traffic_url, RenderContext};
use crate::services::dispatcher::AlertChannel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct SpooledMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

/// Most severe section decides the subject
pub fn subject_for(payload: &AlertPayload) -> &'static str {
    if !payload.inside.is_empty() {
        "[ALERT] Coast guard vessel inside the inner zone"
    } else if !payload.outside.is_empty() {
        "[WARNING] Coast guard vessel inside the outer zone"
    } else if !payload.zone_intrusions.is_empty() {
        "[NOTICE] Custom zone intrusion"
    } else if !payload.exited.is_empty() {
        "[UPDATE] Coast guard vessels left the alert zone"
    } else {
        "[HEALTH CHECK] Vessel watch is running"
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn motion(course: Option<f64>, speed: Option<f64>) -> String {
    let course = course.map_or("-".to_string(), |c| format!("{c:.0}&deg;"));
    let speed = speed.map_or("-".to_string(), |s| format!("{s:.1} kn"));
    format!("Course <b>{course}</b> | Speed <b>{speed}</b>")
}

fn links(location: LatLon) -> String {
    format!(
        r#"<a href="{}" style="color:#1976D2;">Map</a> | <a href="{}" style="color:#0D47A1;">MarineTraffic</a>"#,
        escape(&google_maps_url(location)),
        escape(&marine_traffic_url(location))
    )
}

fn tier_card(out: &mut String, alert: &TierAlert, render: &RenderContext) {
    let _ = write!(
        out,
        r#"<div style="border:1px solid #1E88E5;border-radius:8px;padding:12px;margin-bottom:12px;background:#F5FBFF;">
<h3 style="margin:0;color:#0D47A1;">{name}{new}</h3>
<p style="margin:4px 0;font-size:14px;">Position <b>{lat:.5}, {lon:.5}</b><br>{motion}<br>Observed {time}<br>{desc}"#,
        name = escape(&alert.name),
        new = if alert.newly_entered { " (new)" } else { "" },
        lat = alert.location.lat,
        lon = alert.location.lon,
        motion = motion(alert.course, alert.speed),
        time = render.local_time(alert.observed_at),
        desc = escape(&render.describe(alert.location)),
    );
    if let Some(km) = alert.distance_to_inner_km.filter(|km| *km > 0.0) {
        let _ = write!(out, "<br>{km:.2} km to the inner boundary");
    }
    let _ = write!(out, "</p>{}</div>\n", links(alert.location));
}

fn tier_section(out: &mut String, title: &str, alerts: &[TierAlert], render: &RenderContext) {
    if alerts.is_empty() {
        return;
    }
    let _ = writeln!(out, r#"<h2 style="color:#0D47A1;">{} ({})</h2>"#, escape(title), alerts.len());
    for alert in alerts {
        tier_card(out, alert, render);
    }
}

fn zone_section(out: &mut String, alerts: &[ZoneAlert], render: &RenderContext) {
    if alerts.is_empty() {
        return;
    }
    let mut by_zone: BTreeMap<&str, Vec<&ZoneAlert>> = BTreeMap::new();
    for alert in alerts {
        by_zone.entry(alert.zone_name.as_str()).or_default().push(alert);
    }

    let _ = writeln!(out, r#"<h2 style="color:#D32F2F;">Custom zone intrusions</h2>"#);
    for (zone, alerts) in by_zone {
        let _ = writeln!(out, "<h3>{}</h3><ul>", escape(zone));
        for alert in alerts {
            let _ = writeln!(
                out,
                "<li><b>{}</b> at {:.4}, {:.4}, {} ({})</li>",
                escape(&alert.name),
                alert.location.lat,
                alert.location.lon,
                render.local_time(alert.observed_at),
                links(alert.location)
            );
        }
        out.push_str("</ul>\n");
    }
}

pub fn render_html(payload: &AlertPayload, render: &RenderContext) -> String {
    let mut body = String::new();
    tier_section(&mut body, "Inside the inner zone", &payload.inside, render);
    tier_section(&mut body, "Inside the outer zone", &payload.outside, render);

    if !payload.exited.is_empty() {
        body.push_str(r#"<h2 style="color:#2E7D32;">Left the alert zone</h2><ul>"#);
        body.push('\n');
        for exit in &payload.exited {
            let _ = writeln!(
                body,
                "<li><b>{}</b> {}</li>",
                escape(&exit.name),
                escape(&render.landmark_distance(exit.last_location))
            );
        }
        body.push_str("</ul>\n");
    }

    zone_section(&mut body, &payload.zone_intrusions, render);

    if payload.is_empty() {
        let _ = writeln!(
            body,
            "<p>No coast guard vessels inside the watched zones at {}.</p>",
            render.local_time(payload.created_at)
        );
    }

    format!(
        r#"<html><body style="font-family:Arial,sans-serif;background:#f2f6f9;padding:20px;">
<div style="max-width:600px;margin:auto;background:white;border-radius:10px;padding:20px;border-top:6px solid #0D47A1;">
<h1 style="margin-top:0;color:#0D47A1;">{}</h1>
{}<p style="font-size:12px;color:#666;margin-top:20px;">Sent automatically by vessel-watch, cycle {}.</p>
</div></body></html>"#,
        escape(subject_for(payload)),
        body,
        escape(&payload.cycle_id)
    )
}

pub struct MailSpoolChannel {
    recipient: Option<String>,
    spool_path: PathBuf,
    render: Arc<RenderContext>,
}

impl MailSpoolChannel {
    pub fn new(recipient: Option<String>, spool_path: impl Into<PathBuf>, render: Arc<RenderContext>) -> Self {
        Self {
            recipient: recipient.filter(|r| r.contains('@')),
            spool_path: spool_path.into(),
            render,
        }
    }
}

#[async_trait]
impl AlertChannel for MailSpoolChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn is_configured(&self) -> bool {
        self.recipient.is_some()
    }

    async fn deliver(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let Some(to) = &self.recipient else {
            return Ok(());
        };
        let mail = SpooledMail {
            to: to.clone(),
            subject: subject_for(payload).to_string(),
            html: render_html(payload, &self.render),
            created_at: payload.created_at,
        };
        let mut line = serde_json::to_vec(&mail)?;
        line.push(b'\n');

        if let Some(parent) = self.spool_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.spool_path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(cycle_id = %payload.cycle_id, spool = %self.spool_path.display(), "mail_spooled");
        Ok(())
    }
}
