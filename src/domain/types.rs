//! Shared types for vessel zone watching

use crate::domain::geometry::LatLon;
use crate::error::InvalidPosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for vessel identifiers, stable across cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VesselId(pub String);

impl VesselId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VesselId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for zone identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-tier membership of a position.
///
/// Variant order is the precedence order: `Inner` > `Outer` > `None`, so an
/// upward move compares greater.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    None,
    Outer,
    Inner,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Outer => "outer",
            Tier::Inner => "inner",
        }
    }

    /// True for `Inner` and `Outer`
    #[inline]
    pub fn is_inside(&self) -> bool {
        !matches!(self, Tier::None)
    }
}

/// A validated vessel position for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub vessel_id: VesselId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    pub location: LatLon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Speed over ground in knots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Position {
    /// Build a position, rejecting empty identifiers and unusable coordinates
    pub fn new(
        vessel_id: &str,
        name: &str,
        lat: f64,
        lon: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, InvalidPosition> {
        let vessel_id = vessel_id.trim();
        if vessel_id.is_empty() {
            return Err(InvalidPosition::MissingId);
        }
        if !lat.is_finite() || !lon.is_finite() {
            return Err(InvalidPosition::MissingCoordinate { vessel_id: vessel_id.to_string() });
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(InvalidPosition::OutOfRange { vessel_id: vessel_id.to_string(), lat, lon });
        }

        Ok(Self {
            vessel_id: VesselId::new(vessel_id),
            name: name.trim().to_string(),
            flag: None,
            location: LatLon::new(lat, lon),
            course: None,
            speed: None,
            observed_at,
        })
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flag = Some(flag.to_string());
        self
    }

    pub fn with_motion(mut self, course: Option<f64>, speed: Option<f64>) -> Self {
        self.course = course.filter(|c| c.is_finite());
        self.speed = speed.filter(|s| s.is_finite());
        self
    }
}

/// One row of an upstream position feed, before validation.
///
/// Upstream tiles encode numbers inconsistently (numbers, numeric strings,
/// empty strings), so numeric fields are parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPositionReport {
    #[serde(rename = "SHIP_ID", default, deserialize_with = "deserialize_lenient_string")]
    pub ship_id: Option<String>,
    #[serde(rename = "SHIPNAME", default, deserialize_with = "deserialize_lenient_string")]
    pub shipname: Option<String>,
    #[serde(rename = "LAT", default, deserialize_with = "deserialize_lenient_f64")]
    pub lat: Option<f64>,
    #[serde(rename = "LON", default, deserialize_with = "deserialize_lenient_f64")]
    pub lon: Option<f64>,
    /// Tenths of a knot
    #[serde(rename = "SPEED", default, deserialize_with = "deserialize_lenient_f64")]
    pub speed: Option<f64>,
    #[serde(rename = "COURSE", default, deserialize_with = "deserialize_lenient_f64")]
    pub course: Option<f64>,
    #[serde(rename = "FLAG", default, deserialize_with = "deserialize_lenient_string")]
    pub flag: Option<String>,
}

impl RawPositionReport {
    /// Validate into a `Position` stamped with the cycle's observation time
    pub fn into_position(self, observed_at: DateTime<Utc>) -> Result<Position, InvalidPosition> {
        let ship_id = self.ship_id.unwrap_or_default();
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            if ship_id.trim().is_empty() {
                return Err(InvalidPosition::MissingId);
            }
            return Err(InvalidPosition::MissingCoordinate { vessel_id: ship_id });
        };

        let name = self.shipname.unwrap_or_default();
        let mut position = Position::new(&ship_id, &name, lat, lon, observed_at)?
            .with_motion(self.course, self.speed.map(|s| s / 10.0));
        if let Some(flag) = self.flag.filter(|f| !f.trim().is_empty()) {
            position = position.with_flag(flag.trim());
        }
        Ok(position)
    }
}

fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct LenientF64Visitor;

    impl<'de> Visitor<'de> for LenientF64Visitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number, a numeric string, or null")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Option<f64>, E> {
            Ok(Some(value).filter(|v| v.is_finite()))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Option<f64>, E> {
            Ok(Some(value as f64))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Option<f64>, E> {
            Ok(Some(value as f64))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Option<f64>, E> {
            Ok(value.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<f64>, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Option<f64>, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(LenientF64Visitor)
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct LenientStringVisitor;

    impl<'de> Visitor<'de> for LenientStringVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, an integer, or null")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Option<String>, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<Option<String>, E> {
            Ok(Some(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Option<String>, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Option<String>, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<String>, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Option<String>, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(LenientStringVisitor)
}
