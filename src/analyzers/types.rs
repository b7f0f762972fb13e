//! Records flowing through the analysis pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// One observed vehicle position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub vehicle_id: String,
    pub line_id: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub lat: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub lon: Option<f64>,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

impl PositionSample {
    pub fn point(&self) -> Option<GeoPoint> {
        GeoPoint::from_optional(self.lat, self.lon)
    }
}

/// A boarding post of a stop group, as served by one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_group: String,
    pub stop_post: String,
    pub route_id: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub lat: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub lon: Option<f64>,
}

impl Stop {
    pub fn point(&self) -> Option<GeoPoint> {
        GeoPoint::from_optional(self.lat, self.lon)
    }
}

/// Published departures of one route at one stop post.
#[derive(Debug, Clone, PartialEq)]
pub struct TimetableEntry {
    pub stop_group: String,
    pub stop_post: String,
    pub route_id: String,
    /// Position of the stop along the route, starting at 1.
    pub sequence: u32,
    pub departures: Vec<String>,
}

/// A position sample with its nearest stop on the same line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedSample {
    pub vehicle_id: String,
    pub line_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub nearest_stop_group: Option<String>,
    pub nearest_stop_post: Option<String>,
    pub distance_to_stop: Option<f64>,
    pub is_at_stop: bool,
}

impl AugmentedSample {
    pub fn unmatched(sample: &PositionSample) -> Self {
        Self {
            vehicle_id: sample.vehicle_id.clone(),
            line_id: sample.line_id.clone(),
            lat: sample.lat,
            lon: sample.lon,
            timestamp: sample.timestamp,
            nearest_stop_group: None,
            nearest_stop_post: None,
            distance_to_stop: None,
            is_at_stop: false,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.nearest_stop_group.is_some()
    }
}

/// Speed derived for one sample from its predecessor on the same vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedSample {
    pub vehicle_id: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub speed_kmh: Option<f64>,
    pub is_violation: bool,
}

/// Speed violations observed around one stop group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopViolationSummary {
    pub stop_group: String,
    pub total_violations: usize,
    /// Distinct vehicles matched to the group.
    pub total_measurements: usize,
    pub violation_percentage: Option<f64>,
    pub significant: bool,
    /// Mean position of the group's posts.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Lateness of one at-stop sample against its timetable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatenessRecord {
    pub vehicle_id: String,
    pub line_id: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub stop_group: String,
    pub stop_post: String,
    /// Departure the arrival was measured against; absent at a trip's first stop.
    #[serde(serialize_with = "timestamp_format::serialize_opt")]
    pub scheduled: Option<NaiveDateTime>,
    pub lateness_minutes: f64,
}

/// `YYYY-MM-DD HH:MM:SS`, the format the position feed uses.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(raw: &str) -> chrono::ParseResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
    }

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn serialize_opt<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.collect_str(&ts.format(FORMAT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
