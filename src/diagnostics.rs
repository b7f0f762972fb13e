//! Per-record data-quality events raised by the analyzers.
//!
//! The analyzers never log directly. They report a [`Diagnostic`] to an
//! injected [`DiagnosticsSink`]; the binary wires in [`TracingSink`] and
//! tests use [`RecordingSink`] to assert on what was skipped and why.

use std::sync::Mutex;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

/// Why a speed could not be derived for a sample that has a predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedGap {
    MissingCoordinates,
    NonPositiveElapsed,
}

/// A record-level problem that left an output value undefined.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A position sample without usable coordinates could not be matched.
    MissingCoordinates {
        vehicle_id: String,
        timestamp: NaiveDateTime,
    },
    /// Samples on a line that no stop serves.
    NoStopsForLine { line_id: String, samples: usize },
    /// Samples on a line whose stops all lack coordinates.
    NoStopCoordinates { line_id: String, samples: usize },
    SpeedUndefined {
        vehicle_id: String,
        timestamp: NaiveDateTime,
        gap: SpeedGap,
    },
    /// An at-stop sample whose stop has no timetable on its line.
    TimetableMissing {
        vehicle_id: String,
        timestamp: NaiveDateTime,
        stop_group: String,
        stop_post: String,
        line_id: String,
    },
    /// An at-stop sample whose timetable has no usable departures.
    EmptySchedule {
        vehicle_id: String,
        timestamp: NaiveDateTime,
        stop_group: String,
        stop_post: String,
        line_id: String,
    },
    InvalidScheduleTime {
        stop_group: String,
        stop_post: String,
        route_id: String,
        value: String,
    },
}

/// Receiver for [`Diagnostic`]s. Shared across worker threads.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` as structured events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::MissingCoordinates {
                vehicle_id,
                timestamp,
            } => debug!(%vehicle_id, %timestamp, "Sample has no coordinates, left unmatched"),
            Diagnostic::NoStopsForLine { line_id, samples } => {
                debug!(%line_id, samples, "No stops serve line, samples left unmatched")
            }
            Diagnostic::NoStopCoordinates { line_id, samples } => {
                warn!(%line_id, samples, "All stops on line lack coordinates")
            }
            Diagnostic::SpeedUndefined {
                vehicle_id,
                timestamp,
                gap,
            } => debug!(%vehicle_id, %timestamp, ?gap, "Speed could not be computed"),
            Diagnostic::TimetableMissing {
                vehicle_id,
                timestamp,
                stop_group,
                stop_post,
                line_id,
            } => debug!(
                %vehicle_id,
                %timestamp,
                %stop_group,
                %stop_post,
                %line_id,
                "No timetable for stop"
            ),
            Diagnostic::EmptySchedule {
                vehicle_id,
                timestamp,
                stop_group,
                stop_post,
                line_id,
            } => warn!(
                %vehicle_id,
                %timestamp,
                %stop_group,
                %stop_post,
                %line_id,
                "Timetable has no departures"
            ),
            Diagnostic::InvalidScheduleTime {
                stop_group,
                stop_post,
                route_id,
                value,
            } => warn!(
                %stop_group,
                %stop_post,
                %route_id,
                %value,
                "Dropping unparseable departure time"
            ),
        }
    }
}

/// Keeps every reported diagnostic in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|d| predicate(d))
            .count()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}
