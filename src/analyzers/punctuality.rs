//! Lateness of vehicles standing at stops, measured against the timetable.
//!
//! Departure times are placed on the calendar date of the observed sample.
//! A sample taken just after midnight on a trip whose service day began the
//! previous evening is therefore compared against the wrong day's timetable;
//! this is a known approximation and is not compensated for.

use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeDelta};
use rayon::prelude::*;

use crate::analyzers::types::{AugmentedSample, LatenessRecord, TimetableEntry};
use crate::analyzers::utility::{mean, stddev};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::schedule::ScheduleTime;

/// Sequence index of a trip's origin stop. Lateness there is always zero.
pub const FIRST_STOP_SEQUENCE: u32 = 1;

/// Departures up to this far after the observed arrival still count as due.
pub const GRACE_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct PunctualityReport {
    /// One record per at-stop sample with a defined lateness, in input order.
    pub records: Vec<LatenessRecord>,
    pub average_lateness: Option<f64>,
    pub lateness_stddev: Option<f64>,
}

/// A timetable entry with its departure strings parsed once.
struct Schedule<'a> {
    entry: &'a TimetableEntry,
    departures: Vec<ScheduleTime>,
}

type ScheduleIndex<'a> = HashMap<(&'a str, &'a str, &'a str), Schedule<'a>>;

fn index_timetables<'a>(
    timetables: &'a [TimetableEntry],
    sink: &dyn DiagnosticsSink,
) -> ScheduleIndex<'a> {
    let mut index: ScheduleIndex<'a> = HashMap::new();
    for entry in timetables {
        let key = (
            entry.stop_group.as_str(),
            entry.stop_post.as_str(),
            entry.route_id.as_str(),
        );
        // the first entry for a stop post and route wins
        index.entry(key).or_insert_with(|| Schedule {
            entry,
            departures: parse_departures(entry, sink),
        });
    }
    index
}

fn parse_departures(entry: &TimetableEntry, sink: &dyn DiagnosticsSink) -> Vec<ScheduleTime> {
    entry
        .departures
        .iter()
        .filter_map(|raw| match raw.parse::<ScheduleTime>() {
            Ok(time) => Some(time),
            Err(_) => {
                sink.report(Diagnostic::InvalidScheduleTime {
                    stop_group: entry.stop_group.clone(),
                    stop_post: entry.stop_post.clone(),
                    route_id: entry.route_id.clone(),
                    value: raw.clone(),
                });
                None
            }
        })
        .collect()
}

/// Picks the departure an arrival at `actual` should be measured against.
///
/// That is the latest departure due by `actual` plus the grace window. When
/// the vehicle is earlier than every departure, the departure closest to
/// `actual` is used instead (the first one on a tie).
pub fn reference_departure(
    actual: NaiveDateTime,
    scheduled: &[NaiveDateTime],
) -> Option<NaiveDateTime> {
    let cutoff = actual + TimeDelta::seconds(GRACE_WINDOW_SECS);

    scheduled
        .iter()
        .copied()
        .filter(|&t| t <= cutoff)
        .max()
        .or_else(|| {
            scheduled
                .iter()
                .copied()
                .min_by_key(|&t| (t - actual).abs())
        })
}

/// Signed minutes from `scheduled` to `actual`; positive means late.
pub fn lateness_minutes(actual: NaiveDateTime, scheduled: NaiveDateTime) -> f64 {
    (actual - scheduled).num_seconds() as f64 / 60.0
}

fn lateness_for(
    sample: &AugmentedSample,
    index: &ScheduleIndex<'_>,
    sink: &dyn DiagnosticsSink,
) -> Option<LatenessRecord> {
    let stop_group = sample.nearest_stop_group.as_deref()?;
    let stop_post = sample.nearest_stop_post.as_deref()?;

    let gap = |empty: bool| {
        let (vehicle_id, timestamp) = (sample.vehicle_id.clone(), sample.timestamp);
        let (stop_group, stop_post) = (stop_group.to_string(), stop_post.to_string());
        let line_id = sample.line_id.clone();
        if empty {
            Diagnostic::EmptySchedule {
                vehicle_id,
                timestamp,
                stop_group,
                stop_post,
                line_id,
            }
        } else {
            Diagnostic::TimetableMissing {
                vehicle_id,
                timestamp,
                stop_group,
                stop_post,
                line_id,
            }
        }
    };

    let Some(schedule) = index.get(&(stop_group, stop_post, sample.line_id.as_str())) else {
        sink.report(gap(false));
        return None;
    };

    let (scheduled, lateness) = if schedule.entry.sequence == FIRST_STOP_SEQUENCE {
        (None, 0.0)
    } else {
        let service_date = sample.timestamp.date();
        let instants: Vec<NaiveDateTime> = schedule
            .departures
            .iter()
            .filter_map(|t| t.on(service_date))
            .collect();

        let Some(reference) = reference_departure(sample.timestamp, &instants) else {
            sink.report(gap(true));
            return None;
        };
        (Some(reference), lateness_minutes(sample.timestamp, reference))
    };

    Some(LatenessRecord {
        vehicle_id: sample.vehicle_id.clone(),
        line_id: sample.line_id.clone(),
        timestamp: sample.timestamp,
        stop_group: stop_group.to_string(),
        stop_post: stop_post.to_string(),
        scheduled,
        lateness_minutes: lateness,
    })
}

/// Computes lateness for every sample standing at its nearest stop.
///
/// Samples whose stop has no timetable on their line, or whose timetable has
/// no usable departures, get no record; both cases are reported to `sink`.
pub fn analyze_punctuality(
    augmented: &[AugmentedSample],
    timetables: &[TimetableEntry],
    sink: &dyn DiagnosticsSink,
) -> PunctualityReport {
    let index = index_timetables(timetables, sink);

    let records: Vec<LatenessRecord> = augmented
        .par_iter()
        .filter(|sample| sample.is_at_stop)
        .filter_map(|sample| lateness_for(sample, &index, sink))
        .collect();

    let values: Vec<f64> = records.iter().map(|r| r.lateness_minutes).collect();
    let average_lateness = mean(&values);

    PunctualityReport {
        lateness_stddev: average_lateness.and_then(|m| stddev(&values, m)),
        average_lateness,
        records,
    }
}
