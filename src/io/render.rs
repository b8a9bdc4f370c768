//! Shared rendering helpers for notification channels

use crate::domain::geometry::LatLon;
use crate::domain::landmarks::{describe_location, nearest_landmark, Landmark};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Landmarks and display time zone used by every renderer
#[derive(Debug, Clone)]
pub struct RenderContext {
    landmarks: Vec<Landmark>,
    offset: FixedOffset,
}

impl RenderContext {
    /// Offsets outside +-24h fall back to UTC
    pub fn new(landmarks: Vec<Landmark>, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600))
            .unwrap_or_else(|| Utc.fix());
        Self { landmarks, offset }
    }

    /// `YYYY-MM-DD HH:MM:SS` in the display offset
    pub fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn describe(&self, location: LatLon) -> String {
        describe_location(&self.landmarks, location)
    }

    /// "Keelung Harbor 8.0 nm" style reference, or raw coordinates
    pub fn landmark_distance(&self, location: LatLon) -> String {
        match nearest_landmark(&self.landmarks, location) {
            Some(rel) => format!("{:.1} nm from {}", rel.distance_nm, rel.landmark),
            None => format!("{:.4}, {:.4}", location.lat, location.lon),
        }
    }
}

pub fn google_maps_url(location: LatLon) -> String {
    format!("https://www.google.com/maps?q={},{}", location.lat, location.lon)
}

pub fn marine_traffic_url(location: LatLon) -> String {
    format!(
        "https://www.marinetraffic.com/en/ais/home/centerx:{}/centery:{}/zoom:12",
        location.lon, location.lat
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::landmarks::default_landmarks;
    use chrono::TimeZone;

    #[test]
    fn test_local_time_offset() {
        let ctx = RenderContext::new(vec![], 8);
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 20, 30, 0).unwrap();
        assert_eq!(ctx.local_time(at), "2025-11-04 04:30:00");
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        let ctx = RenderContext::new(vec![], 99);
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 20, 30, 0).unwrap();
        assert_eq!(ctx.local_time(at), "2025-11-03 20:30:00");
    }

    #[test]
    fn test_landmark_distance() {
        let ctx = RenderContext::new(default_landmarks(), 8);
        let text = ctx.landmark_distance(LatLon::new(25.152, 121.763));
        assert_eq!(text, "0.0 nm from Keelung Harbor");
    }

    #[test]
    fn test_map_urls() {
        let at = LatLon::new(24.5, 121.25);
        assert_eq!(google_maps_url(at), "https://www.google.com/maps?q=24.5,121.25");
        assert!(marine_traffic_url(at).contains("centerx:121.25/centery:24.5"));
    }
}
