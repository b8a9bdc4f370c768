//! Nearest-landmark location descriptions for rendered alerts

use crate::domain::geometry::{
    bearing_degrees, compass_point, great_circle_distance_km, LatLon, KM_TO_NM,
};
use serde::{Deserialize, Serialize};

/// A named reference point (island, harbour, coastline centroid)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Landmark {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self { name: name.to_string(), lat, lon }
    }

    fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Built-in reference points used when none are configured
pub fn default_landmarks() -> Vec<Landmark> {
    vec![
        Landmark::new("Taiwan main island", 23.6978, 120.9605),
        Landmark::new("Kinmen", 24.436, 118.318),
        Landmark::new("Dongding Island", 24.431, 118.392),
        Landmark::new("Matsu Nangan", 26.157, 119.948),
        Landmark::new("Penghu", 23.567, 119.566),
        Landmark::new("Keelung Harbor", 25.152, 121.763),
        Landmark::new("Taichung Harbor", 24.276, 120.517),
        Landmark::new("Kaohsiung Harbor", 22.621, 120.284),
    ]
}

/// Position of a vessel relative to its nearest landmark
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeLocation {
    pub landmark: String,
    pub distance_nm: f64,
    /// Bearing from the landmark to the vessel
    pub bearing: f64,
    pub direction: &'static str,
}

impl RelativeLocation {
    /// Short human description, graded by distance
    pub fn describe(&self) -> String {
        if self.distance_nm <= 12.0 {
            format!(
                "close off {}, only {:.1} nm {}",
                self.landmark, self.distance_nm, self.direction
            )
        } else if self.distance_nm <= 24.0 {
            format!(
                "in the waters around {}, about {:.1} nm {}",
                self.landmark, self.distance_nm, self.direction
            )
        } else {
            format!("about {:.1} nm {} of {}", self.distance_nm, self.direction, self.landmark)
        }
    }
}

/// Nearest landmark to `point`, `None` when the list is empty
pub fn nearest_landmark(landmarks: &[Landmark], point: LatLon) -> Option<RelativeLocation> {
    landmarks
        .iter()
        .map(|l| (l, great_circle_distance_km(l.location(), point)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(landmark, km)| {
            let bearing = bearing_degrees(landmark.location(), point);
            RelativeLocation {
                landmark: landmark.name.clone(),
                distance_nm: km * KM_TO_NM,
                bearing,
                direction: compass_point(bearing),
            }
        })
}

/// Location text for a rendered alert, falling back to raw coordinates
pub fn describe_location(landmarks: &[Landmark], point: LatLon) -> String {
    match nearest_landmark(landmarks, point) {
        Some(rel) => rel.describe(),
        None => format!("{:.4}, {:.4}", point.lat, point.lon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_landmark_keelung() {
        let rel = nearest_landmark(&default_landmarks(), LatLon::new(25.3, 121.763)).unwrap();
        assert_eq!(rel.landmark, "Keelung Harbor");
        assert_eq!(rel.direction, "N");
        // 0.148 degrees of latitude
        assert!((rel.distance_nm - 0.148 * 111.19492664455873 * KM_TO_NM).abs() < 0.01);
    }

    #[test]
    fn test_describe_graded_by_distance() {
        let near = RelativeLocation {
            landmark: "Penghu".to_string(),
            distance_nm: 5.0,
            bearing: 90.0,
            direction: "E",
        };
        assert_eq!(near.describe(), "close off Penghu, only 5.0 nm E");

        let far = RelativeLocation { distance_nm: 30.3, ..near.clone() };
        assert_eq!(far.describe(), "about 30.3 nm E of Penghu");
    }

    #[test]
    fn test_describe_without_landmarks() {
        assert_eq!(describe_location(&[], LatLon::new(24.0, 121.0)), "24.0000, 121.0000");
    }
}
