//! Runs the four analysis stages over one snapshot.

use serde::Serialize;
use tracing::info;

use crate::analyzers::nearest_stop::match_nearest_stops;
use crate::analyzers::punctuality::{PunctualityReport, analyze_punctuality};
use crate::analyzers::speed::{SpeedReport, analyze_speeds};
use crate::analyzers::types::{
    AugmentedSample, PositionSample, Stop, StopViolationSummary, TimetableEntry,
};
use crate::analyzers::violations::aggregate_violations;
use crate::diagnostics::DiagnosticsSink;

/// Materialized inputs for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub positions: Vec<PositionSample>,
    pub stops: Vec<Stop>,
    pub timetables: Vec<TimetableEntry>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub augmented: Vec<AugmentedSample>,
    pub speeds: SpeedReport,
    pub violations: Vec<StopViolationSummary>,
    pub punctuality: PunctualityReport,
}

/// Headline numbers of a run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub samples: usize,
    pub matched_samples: usize,
    pub at_stop_samples: usize,
    pub speed_violations: usize,
    pub average_plausible_speed: Option<f64>,
    pub stop_groups: usize,
    pub significant_stop_groups: usize,
    pub lateness_records: usize,
    pub average_lateness_minutes: Option<f64>,
    pub lateness_stddev_minutes: Option<f64>,
}

impl PipelineOutput {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            samples: self.augmented.len(),
            matched_samples: self.augmented.iter().filter(|a| a.is_matched()).count(),
            at_stop_samples: self.augmented.iter().filter(|a| a.is_at_stop).count(),
            speed_violations: self.speeds.violations().count(),
            average_plausible_speed: self.speeds.average_plausible_speed,
            stop_groups: self.violations.len(),
            significant_stop_groups: self.violations.iter().filter(|s| s.significant).count(),
            lateness_records: self.punctuality.records.len(),
            average_lateness_minutes: self.punctuality.average_lateness,
            lateness_stddev_minutes: self.punctuality.lateness_stddev,
        }
    }
}

/// Matches, speeds, aggregates and scores `snapshot`.
#[tracing::instrument(skip_all, fields(positions = snapshot.positions.len()))]
pub fn run(snapshot: &Snapshot, sink: &dyn DiagnosticsSink) -> PipelineOutput {
    let augmented = match_nearest_stops(&snapshot.positions, &snapshot.stops, sink);
    info!(samples = augmented.len(), "Nearest stops matched");

    let speeds = analyze_speeds(&snapshot.positions, sink);
    info!(violations = speeds.violations().count(), "Speeds derived");

    let violations = aggregate_violations(&speeds.samples, &augmented, &snapshot.stops);
    info!(stop_groups = violations.len(), "Violations aggregated");

    let punctuality = analyze_punctuality(&augmented, &snapshot.timetables, sink);
    info!(records = punctuality.records.len(), "Punctuality computed");

    PipelineOutput {
        augmented,
        speeds,
        violations,
        punctuality,
    }
}
