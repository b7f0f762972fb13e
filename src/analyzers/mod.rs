//! Fleet analytics over a fixed snapshot.
//!
//! Each stage is a pure function from input records to output records:
//! nearest-stop matching, speed derivation, violation aggregation by stop
//! group, and timetable lateness. Record-level data gaps never fail a stage;
//! they leave the affected value undefined and are reported to a
//! [`DiagnosticsSink`](crate::diagnostics::DiagnosticsSink).

pub mod nearest_stop;
pub mod punctuality;
pub mod speed;
pub mod types;
pub mod utility;
pub mod violations;
