//! Output formatting and persistence for analysis tables.
//!
//! Supports pretty JSON logging and CSV tables, optionally gzip-compressed.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::input::{POSITIONS_FILE, STOPS_FILE, TIMETABLES_FILE, TimetableRow};
use crate::pipeline::{PipelineOutput, Snapshot};

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_rows<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<W> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
}

/// Writes `rows` as a CSV table with headers, replacing any existing file.
///
/// With `gzip` the table is compressed and `.gz` is appended to the file
/// name. Returns the path actually written.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T], gzip: bool) -> Result<PathBuf> {
    let path = if gzip {
        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        path.to_path_buf()
    };

    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    if gzip {
        let encoder = write_rows(GzEncoder::new(file, Compression::default()), rows)?;
        encoder.finish()?;
    } else {
        write_rows(file, rows)?;
    }

    debug!(path = %path.display(), rows = rows.len(), gzip, "Table written");
    Ok(path)
}

/// Writes a snapshot in the layout [`crate::input::load_snapshot`] reads.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let timetables: Vec<TimetableRow> = snapshot.timetables.iter().map(TimetableRow::from).collect();
    write_table(&dir.join(POSITIONS_FILE), &snapshot.positions, false)?;
    write_table(&dir.join(STOPS_FILE), &snapshot.stops, false)?;
    write_table(&dir.join(TIMETABLES_FILE), &timetables, false)?;

    info!(
        positions = snapshot.positions.len(),
        stops = snapshot.stops.len(),
        timetables = timetables.len(),
        "Snapshot written"
    );
    Ok(())
}

/// Writes every result table of a run into `dir`.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), gzip = gzip))]
pub fn write_results(dir: &Path, output: &PipelineOutput, gzip: bool) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let significant = crate::analyzers::violations::significant(&output.violations);
    write_table(&dir.join("augmented_samples.csv"), &output.augmented, gzip)?;
    write_table(&dir.join("speed_samples.csv"), &output.speeds.samples, gzip)?;
    write_table(&dir.join("stop_violations.csv"), &output.violations, gzip)?;
    write_table(&dir.join("significant_violations.csv"), &significant, gzip)?;
    write_table(&dir.join("lateness.csv"), &output.punctuality.records, gzip)?;

    info!(significant = significant.len(), "Results written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::{SpeedSample, timestamp_format};
    use flate2::read::GzDecoder;
    use std::env;
    use std::fs;
    use std::io::Read;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&crate::pipeline::RunSummary::default()).unwrap();
    }

    #[test]
    fn test_write_table_writes_header_and_rows() {
        let path = temp_path("avl_analyzer_test_speeds.csv");
        let _ = fs::remove_file(&path);

        let written = write_table(&path, &speeds(), false).unwrap();

        assert_eq!(written, path);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "vehicle_id,timestamp,speed_kmh,is_violation");
        assert_eq!(lines[1], "1000,2024-01-15 12:00:00,,false");
        assert_eq!(lines[2], "1000,2024-01-15 12:00:30,62.5,true");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_table_overwrites() {
        let path = temp_path("avl_analyzer_test_overwrite.csv");
        let _ = fs::remove_file(&path);

        write_table(&path, &speeds(), false).unwrap();
        write_table(&path, &speeds()[..1], false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_table_gzip() {
        let path = temp_path("avl_analyzer_test_gzip.csv");
        let _ = fs::remove_file(temp_path("avl_analyzer_test_gzip.csv.gz"));

        let written = write_table(&path, &speeds(), true).unwrap();

        assert_eq!(written, temp_path("avl_analyzer_test_gzip.csv.gz"));
        let mut content = String::new();
        GzDecoder::new(fs::File::open(&written).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.starts_with("vehicle_id,timestamp"));

        fs::remove_file(&written).unwrap();
    }

    // Helper functions for tests
    fn speeds() -> Vec<SpeedSample> {
        vec![
            SpeedSample {
                vehicle_id: "1000".to_string(),
                timestamp: timestamp_format::parse("2024-01-15 12:00:00").unwrap(),
                speed_kmh: None,
                is_violation: false,
            },
            SpeedSample {
                vehicle_id: "1000".to_string(),
                timestamp: timestamp_format::parse("2024-01-15 12:00:30").unwrap(),
                speed_kmh: Some(62.5),
                is_violation: true,
            },
        ]
    }
}
