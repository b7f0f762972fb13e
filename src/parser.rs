//! Parsers for the Warsaw open-data transit API.
//!
//! Every endpoint wraps its payload in `{"result": ...}`. On failure the API
//! still answers 200 but puts an error message string in `result`.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::analyzers::types::{PositionSample, timestamp_format};
use crate::reference::{RouteStop, StopLocation};

#[derive(Deserialize)]
struct Envelope {
    result: Value,
}

fn result<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    match envelope.result {
        Value::String(message) => Err(anyhow!("API returned an error: {message}")),
        result => Ok(serde_json::from_value(result)?),
    }
}

#[derive(Deserialize)]
struct VehicleRecord {
    #[serde(rename = "Lines")]
    lines: String,
    #[serde(rename = "Lat")]
    lat: Option<f64>,
    #[serde(rename = "Lon")]
    lon: Option<f64>,
    #[serde(rename = "VehicleNumber")]
    vehicle_number: String,
    #[serde(rename = "Time")]
    time: String,
}

/// Decodes a `busestrams_get` response.
///
/// Records with an unreadable `Time` are dropped with a warning.
pub fn parse_positions(bytes: &[u8]) -> Result<Vec<PositionSample>> {
    let records: Vec<VehicleRecord> = result(bytes)?;

    Ok(records
        .into_iter()
        .filter_map(|r| match timestamp_format::parse(&r.time) {
            Ok(timestamp) => Some(PositionSample {
                vehicle_id: r.vehicle_number,
                line_id: r.lines,
                lat: r.lat,
                lon: r.lon,
                timestamp,
            }),
            Err(e) => {
                warn!(vehicle_id = %r.vehicle_number, time = %r.time, error = %e, "Dropping position with bad time");
                None
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<KeyValue>,
}

impl Values {
    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
            .filter(|v| *v != "null")
    }
}

/// Decodes a `dbstore_get` response listing stop posts.
///
/// Posts without a group or post number are skipped; unreadable coordinates
/// are kept as undefined.
pub fn parse_stop_locations(bytes: &[u8]) -> Result<Vec<StopLocation>> {
    let records: Vec<Values> = result(bytes)?;

    Ok(records
        .iter()
        .filter_map(|r| {
            Some(StopLocation {
                stop_group: r.get("zespol")?.to_string(),
                stop_post: r.get("slupek")?.to_string(),
                name: r.get("nazwa_zespolu").map(str::to_string),
                lat: r.get("szer_geo").and_then(|v| v.trim().parse().ok()),
                lon: r.get("dlug_geo").and_then(|v| v.trim().parse().ok()),
            })
        })
        .collect())
}

/// Decodes a `dbtimetable_get` response into departure strings, in order.
pub fn parse_timetable(bytes: &[u8]) -> Result<Vec<String>> {
    let records: Vec<Values> = result(bytes)?;

    Ok(records
        .iter()
        .filter_map(|r| r.get("czas").map(str::to_string))
        .collect())
}

#[derive(Deserialize)]
struct RouteCall {
    nr_zespolu: String,
    nr_przystanku: String,
}

/// Decodes a `public_transport_routes` response.
///
/// The payload nests route, then variant, then the call's position along
/// the variant. Calls whose position is not a number are skipped.
pub fn parse_routes(bytes: &[u8]) -> Result<Vec<RouteStop>> {
    let routes: BTreeMap<String, BTreeMap<String, BTreeMap<String, RouteCall>>> = result(bytes)?;

    let mut flattened = Vec::new();
    for (route_id, variants) in routes {
        for (variant, calls) in variants {
            for (position, call) in calls {
                let Ok(sequence) = position.parse::<u32>() else {
                    warn!(%route_id, %variant, %position, "Skipping route call with bad position");
                    continue;
                };
                flattened.push(RouteStop {
                    route_id: route_id.clone(),
                    variant: variant.clone(),
                    sequence,
                    stop_group: call.nr_zespolu,
                    stop_post: call.nr_przystanku,
                });
            }
        }
    }

    flattened.sort_by(|a, b| {
        (&a.route_id, &a.variant, a.sequence).cmp(&(&b.route_id, &b.variant, b.sequence))
    });
    Ok(flattened)
}
