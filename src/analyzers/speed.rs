//! Per-vehicle speed derivation.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::analyzers::types::{PositionSample, SpeedSample};
use crate::analyzers::utility::mean;
use crate::diagnostics::{Diagnostic, DiagnosticsSink, SpeedGap};

/// Speeds above this are violations.
pub const VIOLATION_MIN_KMH: f64 = 50.0;
/// Speeds at or above this are treated as GPS artifacts, never violations.
pub const ARTIFACT_MIN_KMH: f64 = 100.0;
/// Vehicles at or below this are considered standing.
pub const MOVING_MIN_KMH: f64 = 3.0;

pub fn is_violation(speed_kmh: f64) -> bool {
    speed_kmh > VIOLATION_MIN_KMH && speed_kmh < ARTIFACT_MIN_KMH
}

pub fn is_plausible(speed_kmh: f64) -> bool {
    speed_kmh > MOVING_MIN_KMH && speed_kmh < ARTIFACT_MIN_KMH
}

#[derive(Debug, Clone)]
pub struct SpeedReport {
    /// One entry per input sample, ordered by vehicle then timestamp.
    pub samples: Vec<SpeedSample>,
    /// Mean over samples in the plausible moving band.
    pub average_plausible_speed: Option<f64>,
}

impl SpeedReport {
    pub fn violations(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter().filter(|s| s.is_violation)
    }
}

fn speed_between(prev: &PositionSample, cur: &PositionSample) -> Result<f64, SpeedGap> {
    let elapsed_hours = (cur.timestamp - prev.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if elapsed_hours <= 0.0 {
        return Err(SpeedGap::NonPositiveElapsed);
    }

    let (Some(from), Some(to)) = (prev.point(), cur.point()) else {
        return Err(SpeedGap::MissingCoordinates);
    };

    Ok(from.distance_m(&to) / 1000.0 / elapsed_hours)
}

/// Speeds along one vehicle's track. `track` must already be time-ordered.
fn track_speeds(track: &[&PositionSample], sink: &dyn DiagnosticsSink) -> Vec<SpeedSample> {
    let mut out = Vec::with_capacity(track.len());
    let mut prev: Option<&PositionSample> = None;

    for &cur in track {
        let speed_kmh = prev.and_then(|prev| match speed_between(prev, cur) {
            Ok(speed) => Some(speed),
            Err(gap) => {
                sink.report(Diagnostic::SpeedUndefined {
                    vehicle_id: cur.vehicle_id.clone(),
                    timestamp: cur.timestamp,
                    gap,
                });
                None
            }
        });

        out.push(SpeedSample {
            vehicle_id: cur.vehicle_id.clone(),
            timestamp: cur.timestamp,
            speed_kmh,
            is_violation: speed_kmh.is_some_and(is_violation),
        });
        prev = Some(cur);
    }

    out
}

/// Derives a speed for every sample from the previous sample of the same
/// vehicle.
///
/// A vehicle's first sample has no speed. So does any sample whose
/// predecessor is not strictly earlier or where either side lacks
/// coordinates; those are reported to `sink`.
pub fn analyze_speeds(samples: &[PositionSample], sink: &dyn DiagnosticsSink) -> SpeedReport {
    let mut tracks: BTreeMap<&str, Vec<&PositionSample>> = BTreeMap::new();
    for sample in samples {
        tracks.entry(sample.vehicle_id.as_str()).or_default().push(sample);
    }

    let mut tracks: Vec<Vec<&PositionSample>> = tracks.into_values().collect();

    let per_vehicle: Vec<Vec<SpeedSample>> = tracks
        .par_iter_mut()
        .map(|track| {
            // stable, so samples sharing a timestamp keep arrival order
            track.sort_by_key(|s| s.timestamp);
            track_speeds(track, sink)
        })
        .collect();

    let samples: Vec<SpeedSample> = per_vehicle.into_iter().flatten().collect();

    let plausible: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.speed_kmh)
        .filter(|&speed| is_plausible(speed))
        .collect();

    SpeedReport {
        average_plausible_speed: mean(&plausible),
        samples,
    }
}
