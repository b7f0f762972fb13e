use std::collections::HashMap;
use std::fs;

use avl_analyzer::diagnostics::{Diagnostic, RecordingSink};
use avl_analyzer::input::{load_positions, load_snapshot, load_stops, load_timetables};
use avl_analyzer::output::{write_results, write_snapshot};
use avl_analyzer::parser::{parse_routes, parse_stop_locations, parse_timetable};
use avl_analyzer::pipeline::{self, Snapshot};
use avl_analyzer::reference::{assemble, timetable_keys};

#[test]
fn test_full_pipeline() {
    let sink = RecordingSink::new();
    let output = pipeline::run(&fixture_snapshot(), &sink);
    let summary = output.summary();

    assert_eq!(summary.samples, 7);
    assert_eq!(summary.matched_samples, 5);
    assert_eq!(summary.at_stop_samples, 4);
    assert_eq!(summary.speed_violations, 1);

    let average = summary.average_plausible_speed.unwrap();
    assert!((average - 53.37).abs() < 0.05, "average speed {average}");

    // the speeding sample is closer to 7002 than to 7001
    assert_eq!(output.violations.len(), 2);
    assert_eq!(output.violations[0].stop_group, "7001");
    assert_eq!(output.violations[0].total_violations, 0);
    assert_eq!(output.violations[0].violation_percentage, Some(0.0));
    assert!(!output.violations[0].significant);
    assert_eq!(output.violations[1].stop_group, "7002");
    assert_eq!(output.violations[1].total_violations, 1);
    assert_eq!(output.violations[1].total_measurements, 2);
    assert_eq!(output.violations[1].violation_percentage, Some(50.0));
    assert!(output.violations[1].significant);
    assert_eq!(output.violations[1].lat, Some(52.01));

    let lateness: Vec<(&str, f64)> = output
        .punctuality
        .records
        .iter()
        .map(|r| (r.vehicle_id.as_str(), r.lateness_minutes))
        .collect();
    assert_eq!(
        lateness,
        vec![("1001", 0.0), ("1002", 0.0), ("1002", 0.5), ("1001", -1.5)]
    );
    assert_eq!(output.punctuality.average_lateness, Some(-0.25));
    assert_eq!(output.punctuality.records[0].scheduled, None);

    assert!(sink.events().contains(&Diagnostic::NoStopsForLine {
        line_id: "300".to_string(),
        samples: 1,
    }));
    assert_eq!(
        sink.count(|d| matches!(d, Diagnostic::MissingCoordinates { .. })),
        1
    );
}

#[test]
fn test_speed_samples_follow_vehicle_and_time() {
    let output = pipeline::run(&fixture_snapshot(), &RecordingSink::new());

    let order: Vec<&str> = output
        .speeds
        .samples
        .iter()
        .map(|s| s.vehicle_id.as_str())
        .collect();
    assert_eq!(order, vec!["1001", "1001", "1001", "1002", "1002", "1003", "1004"]);

    let speeds: Vec<Option<f64>> = output.speeds.samples.iter().map(|s| s.speed_kmh).collect();
    assert_eq!(speeds[0], None);
    assert!((speeds[1].unwrap() - 80.06).abs() < 0.05);
    assert!((speeds[2].unwrap() - 26.69).abs() < 0.05);
    assert_eq!(speeds[4], Some(0.0));
    assert_eq!(speeds[6], None);
}

#[test]
fn test_snapshot_and_results_on_disk() {
    let dir = std::env::temp_dir().join("avl_analyzer_integration");
    let _ = fs::remove_dir_all(&dir);
    let snapshot_dir = dir.join("snapshot");
    let results_dir = dir.join("results");

    write_snapshot(&snapshot_dir, &fixture_snapshot()).unwrap();
    let reloaded = load_snapshot(&snapshot_dir).unwrap();
    assert_eq!(reloaded.positions, fixture_snapshot().positions);
    assert_eq!(reloaded.timetables, fixture_snapshot().timetables);

    let output = pipeline::run(&reloaded, &RecordingSink::new());
    write_results(&results_dir, &output, false).unwrap();

    let significant = fs::read_to_string(results_dir.join("significant_violations.csv")).unwrap();
    let lines: Vec<&str> = significant.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("7002,1,2,50.0,true"));

    let lateness = fs::read_to_string(results_dir.join("lateness.csv")).unwrap();
    assert_eq!(lateness.lines().count(), 5);
    assert!(lateness.contains("2024-01-15 12:03:00"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_reference_data_from_api_payloads() {
    let routes = parse_routes(include_bytes!("fixtures/routes.json")).unwrap();
    let locations = parse_stop_locations(include_bytes!("fixtures/stops.json")).unwrap();
    let times = parse_timetable(include_bytes!("fixtures/timetable_7002_01_100.json")).unwrap();

    let keys = timetable_keys(&routes);
    assert_eq!(keys.len(), 2);
    let mut departures = HashMap::new();
    departures.insert(keys[1].clone(), times);

    let (stops, timetables) = assemble(&routes, &locations, &departures);

    let expected_stops = load_stops(include_str!("fixtures/stops.csv").as_bytes()).unwrap();
    assert_eq!(stops, expected_stops[..2]);
    let expected_timetables =
        load_timetables(include_str!("fixtures/timetables.csv").as_bytes()).unwrap();
    assert_eq!(timetables, expected_timetables[..2]);
}

// Helper functions for tests
fn fixture_snapshot() -> Snapshot {
    Snapshot {
        positions: load_positions(include_str!("fixtures/positions.csv").as_bytes()).unwrap(),
        stops: load_stops(include_str!("fixtures/stops.csv").as_bytes()).unwrap(),
        timetables: load_timetables(include_str!("fixtures/timetables.csv").as_bytes()).unwrap(),
    }
}
