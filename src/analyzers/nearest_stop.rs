//! Nearest-stop matching.
//!
//! Every position sample is compared against the stops of its own line only.
//! Stops are partitioned by route once; each sample is then matched
//! independently, so the work spreads across the rayon pool.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::analyzers::types::{AugmentedSample, PositionSample, Stop};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::geo::GeoPoint;

/// A sample this close to its nearest stop counts as standing at it.
pub const AT_STOP_THRESHOLD_M: f64 = 15.0;

struct Candidate<'a> {
    stop: &'a Stop,
    point: GeoPoint,
}

enum Unmatched {
    MissingCoordinates,
    NoStopsForLine,
    NoStopCoordinates,
}

/// Stops of one route, in input order, with coordinates pre-converted.
/// `None` when the route has stops but none of them carry coordinates.
type RouteIndex<'a> = HashMap<&'a str, Option<Vec<Candidate<'a>>>>;

fn index_routes(stops: &[Stop]) -> RouteIndex<'_> {
    let mut routes: RouteIndex<'_> = HashMap::new();
    for stop in stops {
        let slot = routes.entry(stop.route_id.as_str()).or_insert(None);
        if let Some(point) = stop.point() {
            slot.get_or_insert_with(Vec::new)
                .push(Candidate { stop, point });
        }
    }
    routes
}

/// Returns the closest candidate and its distance in meters.
///
/// The comparison is strict, so on exactly equal distances the stop that
/// came first in the input wins.
fn closest<'a>(point: &GeoPoint, candidates: &[Candidate<'a>]) -> Option<(&'a Stop, f64)> {
    let mut best: Option<(&'a Stop, f64)> = None;
    for candidate in candidates {
        let distance = point.distance_m(&candidate.point);
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((candidate.stop, distance));
        }
    }
    best
}

fn match_sample(
    sample: &PositionSample,
    routes: &RouteIndex<'_>,
) -> Result<AugmentedSample, Unmatched> {
    let point = sample.point().ok_or(Unmatched::MissingCoordinates)?;
    let candidates = routes
        .get(sample.line_id.as_str())
        .ok_or(Unmatched::NoStopsForLine)?
        .as_deref()
        .ok_or(Unmatched::NoStopCoordinates)?;
    let (stop, distance) = closest(&point, candidates).ok_or(Unmatched::NoStopCoordinates)?;

    Ok(AugmentedSample {
        nearest_stop_group: Some(stop.stop_group.clone()),
        nearest_stop_post: Some(stop.stop_post.clone()),
        distance_to_stop: Some(distance),
        is_at_stop: distance <= AT_STOP_THRESHOLD_M,
        ..AugmentedSample::unmatched(sample)
    })
}

/// Produces one [`AugmentedSample`] per input sample, in input order.
///
/// Samples without coordinates, on a line no stop serves, or on a line whose
/// stops all lack coordinates come back unmatched. Those gaps are reported to
/// `sink`; lines are reported once with the number of samples affected.
pub fn match_nearest_stops(
    samples: &[PositionSample],
    stops: &[Stop],
    sink: &dyn DiagnosticsSink,
) -> Vec<AugmentedSample> {
    let routes = index_routes(stops);

    let outcomes: Vec<Result<AugmentedSample, Unmatched>> = samples
        .par_iter()
        .map(|sample| match_sample(sample, &routes))
        .collect();

    let mut lines_without_stops: BTreeMap<&str, usize> = BTreeMap::new();
    let mut lines_without_coordinates: BTreeMap<&str, usize> = BTreeMap::new();

    let augmented: Vec<AugmentedSample> = samples
        .iter()
        .zip(outcomes)
        .map(|(sample, outcome)| match outcome {
            Ok(augmented) => augmented,
            Err(reason) => {
                match reason {
                    Unmatched::MissingCoordinates => sink.report(Diagnostic::MissingCoordinates {
                        vehicle_id: sample.vehicle_id.clone(),
                        timestamp: sample.timestamp,
                    }),
                    Unmatched::NoStopsForLine => {
                        *lines_without_stops.entry(sample.line_id.as_str()).or_default() += 1
                    }
                    Unmatched::NoStopCoordinates => {
                        *lines_without_coordinates.entry(sample.line_id.as_str()).or_default() += 1
                    }
                }
                AugmentedSample::unmatched(sample)
            }
        })
        .collect();

    for (line_id, samples) in lines_without_stops {
        sink.report(Diagnostic::NoStopsForLine {
            line_id: line_id.to_string(),
            samples,
        });
    }
    for (line_id, samples) in lines_without_coordinates {
        sink.report(Diagnostic::NoStopCoordinates {
            line_id: line_id.to_string(),
            samples,
        });
    }

    augmented
}
