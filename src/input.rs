//! Snapshot tables on disk.
//!
//! A snapshot directory holds `positions.csv`, `stops.csv` and
//! `timetables.csv`. Every required column is checked before any row is read,
//! since a table without one of them cannot be joined at all.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analyzers::types::{PositionSample, Stop, TimetableEntry};
use crate::error::InputError;
use crate::pipeline::Snapshot;

pub const POSITIONS_FILE: &str = "positions.csv";
pub const STOPS_FILE: &str = "stops.csv";
pub const TIMETABLES_FILE: &str = "timetables.csv";

pub const POSITION_COLUMNS: &[&str] = &["vehicle_id", "line_id", "lat", "lon", "timestamp"];
pub const STOP_COLUMNS: &[&str] = &["stop_group", "stop_post", "route_id", "lat", "lon"];
pub const TIMETABLE_COLUMNS: &[&str] = &[
    "stop_group",
    "stop_post",
    "route_id",
    "sequence",
    "departures",
];

/// On-disk shape of a [`TimetableEntry`]; departures are space separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableRow {
    pub stop_group: String,
    pub stop_post: String,
    pub route_id: String,
    pub sequence: u32,
    pub departures: String,
}

impl From<TimetableRow> for TimetableEntry {
    fn from(row: TimetableRow) -> Self {
        TimetableEntry {
            departures: row.departures.split_whitespace().map(str::to_string).collect(),
            stop_group: row.stop_group,
            stop_post: row.stop_post,
            route_id: row.route_id,
            sequence: row.sequence,
        }
    }
}

impl From<&TimetableEntry> for TimetableRow {
    fn from(entry: &TimetableEntry) -> Self {
        TimetableRow {
            stop_group: entry.stop_group.clone(),
            stop_post: entry.stop_post.clone(),
            route_id: entry.route_id.clone(),
            sequence: entry.sequence,
            departures: entry.departures.join(" "),
        }
    }
}

fn load_table<R: Read, T: DeserializeOwned>(
    table: &'static str,
    required: &[&'static str],
    reader: R,
) -> Result<Vec<T>, InputError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|source| InputError::Csv { table, source })?;
    if let Some(column) = required
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(InputError::MissingColumn {
            table,
            column: *column,
        });
    }

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| InputError::Record {
            table,
            row: source.position().map_or(0, |p| p.line()),
            source,
        })?;
        rows.push(row);
    }

    debug!(table, rows = rows.len(), "Table loaded");
    Ok(rows)
}

pub fn load_positions<R: Read>(reader: R) -> Result<Vec<PositionSample>, InputError> {
    load_table("positions", POSITION_COLUMNS, reader)
}

pub fn load_stops<R: Read>(reader: R) -> Result<Vec<Stop>, InputError> {
    load_table("stops", STOP_COLUMNS, reader)
}

pub fn load_timetables<R: Read>(reader: R) -> Result<Vec<TimetableEntry>, InputError> {
    let rows: Vec<TimetableRow> = load_table("timetables", TIMETABLE_COLUMNS, reader)?;
    Ok(rows.into_iter().map(TimetableEntry::from).collect())
}

fn open(path: &Path) -> Result<File, InputError> {
    File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the three snapshot tables from `dir`.
#[tracing::instrument(skip(dir), fields(dir = %dir.display()))]
pub fn load_snapshot(dir: &Path) -> Result<Snapshot, InputError> {
    let snapshot = Snapshot {
        positions: load_positions(open(&dir.join(POSITIONS_FILE))?)?,
        stops: load_stops(open(&dir.join(STOPS_FILE))?)?,
        timetables: load_timetables(open(&dir.join(TIMETABLES_FILE))?)?,
    };

    info!(
        positions = snapshot.positions.len(),
        stops = snapshot.stops.len(),
        timetables = snapshot.timetables.len(),
        "Snapshot loaded"
    );
    Ok(snapshot)
}
