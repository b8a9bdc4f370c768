//! IO modules - external system interfaces
//!
//! Collaborator adapters:
//! - `position_source` - position batches from HTTP tiles or JSON files
//! - `zone_store` - GeoJSON tier and custom zone loading
//! - `state_store` - durable snapshot of alerted vessels
//! - `classification_log` - JSONL log of every classification
//!
//! Notification channels:
//! - `line_push` - LINE Messaging API push (Flex messages)
//! - `mail_spool` - HTML alert mail appended to a spool file
//! - `mqtt_alerts` - payload JSON published over MQTT
//! - `render` - shared time and location formatting
//!
//! - `prometheus` - Prometheus metrics HTTP endpoint and manual cycle trigger

pub mod classification_log;
pub mod line_push;
pub mod mail_spool;
pub mod mqtt_alerts;
pub mod position_source;
pub mod prometheus;
pub mod render;
pub mod state_store;
pub mod zone_store;

// Re-export commonly used types
pub use classification_log::{ClassificationSink, JsonlClassificationLog};
pub use line_push::LinePushChannel;
pub use mail_spool::MailSpoolChannel;
pub use mqtt_alerts::MqttAlertChannel;
pub use position_source::{FilePositionSource, HttpPositionSource, PositionBatch, PositionSource};
pub use render::RenderContext;
pub use state_store::{JsonFileStateStore, StateStore};
pub use zone_store::{load_tier, GeoJsonZoneStore, ZoneStore};
