//! Speed violations aggregated by stop group.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::analyzers::types::{AugmentedSample, SpeedSample, Stop, StopViolationSummary};
use crate::analyzers::utility::mean;

/// Stop groups where at least this share of measured vehicles sped are significant.
pub const SIGNIFICANT_VIOLATION_PCT: f64 = 20.0;

/// Violation share in percent, undefined when nothing was measured.
pub fn violation_percentage(violations: usize, measurements: usize) -> Option<f64> {
    if measurements == 0 {
        None
    } else {
        Some(100.0 * violations as f64 / measurements as f64)
    }
}

pub fn is_significant(percentage: Option<f64>) -> bool {
    percentage.is_some_and(|p| p >= SIGNIFICANT_VIOLATION_PCT)
}

/// Mean coordinates of every stop group, counting each post once.
fn group_centroids(stops: &[Stop]) -> BTreeMap<&str, (f64, f64)> {
    let mut posts: BTreeMap<(&str, &str), (f64, f64)> = BTreeMap::new();
    for stop in stops {
        if let (Some(lat), Some(lon)) = (stop.lat, stop.lon) {
            posts
                .entry((stop.stop_group.as_str(), stop.stop_post.as_str()))
                .or_insert((lat, lon));
        }
    }

    // posts iterate in (group, post) order, so each sum is taken in a fixed order
    let mut by_group: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for ((group, _), (lat, lon)) in posts {
        let (lats, lons) = by_group.entry(group).or_default();
        lats.push(lat);
        lons.push(lon);
    }

    by_group
        .into_iter()
        .filter_map(|(group, (lats, lons))| Some((group, (mean(&lats)?, mean(&lons)?))))
        .collect()
}

/// Joins speeds with nearest-stop matches and summarizes each stop group.
///
/// Violations count violating samples matched to the group; measurements
/// count distinct vehicles matched to the group, violating or not. Results
/// are ordered by stop group id.
pub fn aggregate_violations(
    speeds: &[SpeedSample],
    augmented: &[AugmentedSample],
    stops: &[Stop],
) -> Vec<StopViolationSummary> {
    let mut by_key: HashMap<(&str, NaiveDateTime), &AugmentedSample> = HashMap::new();
    for sample in augmented {
        by_key
            .entry((sample.vehicle_id.as_str(), sample.timestamp))
            .or_insert(sample);
    }

    let mut violations: BTreeMap<&str, usize> = BTreeMap::new();
    for speed in speeds.iter().filter(|s| s.is_violation) {
        let group = by_key
            .get(&(speed.vehicle_id.as_str(), speed.timestamp))
            .and_then(|a| a.nearest_stop_group.as_deref());
        if let Some(group) = group {
            *violations.entry(group).or_default() += 1;
        }
    }

    let mut vehicles: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for sample in augmented {
        if let Some(group) = sample.nearest_stop_group.as_deref() {
            vehicles
                .entry(group)
                .or_default()
                .insert(sample.vehicle_id.as_str());
        }
    }

    let centroids = group_centroids(stops);
    let groups: BTreeSet<&str> = violations.keys().chain(vehicles.keys()).copied().collect();

    groups
        .into_iter()
        .map(|group| {
            let total_violations = violations.get(group).copied().unwrap_or(0);
            let total_measurements = vehicles.get(group).map_or(0, HashSet::len);
            let violation_percentage = violation_percentage(total_violations, total_measurements);
            let centroid = centroids.get(group);

            StopViolationSummary {
                stop_group: group.to_string(),
                total_violations,
                total_measurements,
                violation_percentage,
                significant: is_significant(violation_percentage),
                lat: centroid.map(|c| c.0),
                lon: centroid.map(|c| c.1),
            }
        })
        .collect()
}

/// Summaries flagged significant.
pub fn significant(summaries: &[StopViolationSummary]) -> Vec<StopViolationSummary> {
    summaries.iter().filter(|s| s.significant).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::timestamp_format;

    #[test]
    fn test_percentage_and_significance_policy() {
        assert_eq!(violation_percentage(3, 10), Some(30.0));
        assert!(is_significant(violation_percentage(3, 10)));

        assert_eq!(violation_percentage(1, 10), Some(10.0));
        assert!(!is_significant(violation_percentage(1, 10)));

        assert_eq!(violation_percentage(2, 10), Some(20.0));
        assert!(is_significant(violation_percentage(2, 10)));

        assert_eq!(violation_percentage(0, 0), None);
        assert!(!is_significant(None));
    }

    #[test]
    fn test_three_violations_over_ten_vehicles_is_significant() {
        let (speeds, augmented) = stop_with_vehicles("1001", 10, 3);

        let summaries = aggregate_violations(&speeds, &augmented, &[]);

        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.stop_group, "1001");
        assert_eq!(s.total_violations, 3);
        assert_eq!(s.total_measurements, 10);
        assert_eq!(s.violation_percentage, Some(30.0));
        assert!(s.significant);
        assert_eq!(significant(&summaries).len(), 1);
    }

    #[test]
    fn test_one_violation_over_ten_vehicles_is_not_significant() {
        let (speeds, augmented) = stop_with_vehicles("1001", 10, 1);

        let summaries = aggregate_violations(&speeds, &augmented, &[]);

        assert_eq!(summaries[0].violation_percentage, Some(10.0));
        assert!(!summaries[0].significant);
        assert!(significant(&summaries).is_empty());
    }

    #[test]
    fn test_measurements_count_distinct_vehicles() {
        let augmented = vec![
            matched("v1", "2024-01-15 12:00:00", "1001"),
            matched("v1", "2024-01-15 12:00:30", "1001"),
            matched("v2", "2024-01-15 12:00:00", "1001"),
        ];
        let speeds = vec![
            speed("v1", "2024-01-15 12:00:00", false),
            speed("v1", "2024-01-15 12:00:30", true),
            speed("v2", "2024-01-15 12:00:00", false),
        ];

        let summaries = aggregate_violations(&speeds, &augmented, &[]);

        assert_eq!(summaries[0].total_measurements, 2);
        assert_eq!(summaries[0].total_violations, 1);
        assert_eq!(summaries[0].violation_percentage, Some(50.0));
    }

    #[test]
    fn test_groups_without_violations_are_reported_with_zero() {
        let augmented = vec![
            matched("v1", "2024-01-15 12:00:00", "2002"),
            matched("v2", "2024-01-15 12:00:00", "1001"),
        ];
        let speeds = vec![
            speed("v1", "2024-01-15 12:00:00", true),
            speed("v2", "2024-01-15 12:00:00", false),
        ];

        let summaries = aggregate_violations(&speeds, &augmented, &[]);

        let groups: Vec<_> = summaries.iter().map(|s| s.stop_group.as_str()).collect();
        assert_eq!(groups, vec!["1001", "2002"]);
        assert_eq!(summaries[0].total_violations, 0);
        assert_eq!(summaries[0].violation_percentage, Some(0.0));
        assert_eq!(summaries[1].violation_percentage, Some(100.0));
    }

    #[test]
    fn test_unmatched_violations_are_ignored() {
        let mut unmatched = matched("v1", "2024-01-15 12:00:00", "1001");
        unmatched.nearest_stop_group = None;
        let speeds = vec![
            speed("v1", "2024-01-15 12:00:00", true),
            speed("v9", "2024-01-15 12:00:00", true),
        ];

        let summaries = aggregate_violations(&speeds, &[unmatched], &[]);

        assert!(summaries.is_empty());
    }

    #[test]
    fn test_centroid_averages_distinct_posts() {
        let stops = vec![
            stop("1001", "01", "100", 52.0, 21.0),
            stop("1001", "01", "200", 52.0, 21.0),
            stop("1001", "02", "100", 52.002, 21.002),
        ];
        let augmented = vec![matched("v1", "2024-01-15 12:00:00", "1001")];

        let summaries = aggregate_violations(&[], &augmented, &stops);

        let lat = summaries[0].lat.unwrap();
        let lon = summaries[0].lon.unwrap();
        assert!((lat - 52.001).abs() < 1e-9);
        assert!((lon - 21.001).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_sums_posts_in_post_order() {
        let stops = vec![
            stop("1001", "03", "100", 52.4, 21.3),
            stop("1001", "01", "100", 52.1, 21.7),
            stop("1001", "02", "100", 52.2, 21.1),
        ];
        let augmented = vec![matched("v1", "2024-01-15 12:00:00", "1001")];

        let summaries = aggregate_violations(&[], &augmented, &stops);

        assert_eq!(summaries[0].lat, Some((52.1 + 52.2 + 52.4) / 3.0));
        assert_eq!(summaries[0].lon, Some((21.7 + 21.1 + 21.3) / 3.0));
    }

    // Helper functions for tests
    fn stop_with_vehicles(
        group: &str,
        vehicles: usize,
        violating: usize,
    ) -> (Vec<SpeedSample>, Vec<AugmentedSample>) {
        let time = "2024-01-15 12:00:00";
        let augmented = (0..vehicles)
            .map(|i| matched(&format!("v{i}"), time, group))
            .collect();
        let speeds = (0..vehicles)
            .map(|i| speed(&format!("v{i}"), time, i < violating))
            .collect();
        (speeds, augmented)
    }

    fn matched(vehicle: &str, time: &str, group: &str) -> AugmentedSample {
        AugmentedSample {
            vehicle_id: vehicle.to_string(),
            line_id: "100".to_string(),
            lat: Some(52.0),
            lon: Some(21.0),
            timestamp: timestamp_format::parse(time).unwrap(),
            nearest_stop_group: Some(group.to_string()),
            nearest_stop_post: Some("01".to_string()),
            distance_to_stop: Some(40.0),
            is_at_stop: false,
        }
    }

    fn speed(vehicle: &str, time: &str, is_violation: bool) -> SpeedSample {
        SpeedSample {
            vehicle_id: vehicle.to_string(),
            timestamp: timestamp_format::parse(time).unwrap(),
            speed_kmh: Some(if is_violation { 70.0 } else { 30.0 }),
            is_violation,
        }
    }

    fn stop(group: &str, post: &str, route: &str, lat: f64, lon: f64) -> Stop {
        Stop {
            stop_group: group.to_string(),
            stop_post: post.to_string(),
            route_id: route.to_string(),
            lat: Some(lat),
            lon: Some(lon),
        }
    }
}
