//! Static reference data as published: route layouts and stop locations.
//!
//! Route layouts list which stop posts each route variant calls at and in
//! which order; stop locations carry the coordinates. Joining the two yields
//! the [`Stop`] and [`TimetableEntry`] records the analyzers consume.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analyzers::types::{Stop, TimetableEntry};

/// One call of a route variant at a stop post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub route_id: String,
    pub variant: String,
    /// Position along the variant, starting at 1.
    pub sequence: u32,
    pub stop_group: String,
    pub stop_post: String,
}

impl RouteStop {
    pub fn key(&self) -> TimetableKey {
        TimetableKey {
            stop_group: self.stop_group.clone(),
            stop_post: self.stop_post.clone(),
            route_id: self.route_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLocation {
    pub stop_group: String,
    pub stop_post: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Identifies the timetable of one route at one stop post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimetableKey {
    pub stop_group: String,
    pub stop_post: String,
    pub route_id: String,
}

/// One [`Stop`] per route call. Calls at posts with no known location keep
/// undefined coordinates.
pub fn route_stops(routes: &[RouteStop], locations: &[StopLocation]) -> Vec<Stop> {
    let mut by_post: HashMap<(&str, &str), &StopLocation> = HashMap::new();
    for location in locations {
        by_post
            .entry((location.stop_group.as_str(), location.stop_post.as_str()))
            .or_insert(location);
    }

    routes
        .iter()
        .map(|route| {
            let location = by_post.get(&(route.stop_group.as_str(), route.stop_post.as_str()));
            Stop {
                stop_group: route.stop_group.clone(),
                stop_post: route.stop_post.clone(),
                route_id: route.route_id.clone(),
                lat: location.and_then(|l| l.lat),
                lon: location.and_then(|l| l.lon),
            }
        })
        .collect()
}

/// Distinct timetables needed for `routes`, in first-seen order.
pub fn timetable_keys(routes: &[RouteStop]) -> Vec<TimetableKey> {
    let mut seen = HashSet::new();
    routes
        .iter()
        .map(RouteStop::key)
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// One [`TimetableEntry`] per route call, with the departures published for
/// its stop post and route. Calls without published departures get an empty
/// list.
pub fn timetable_entries(
    routes: &[RouteStop],
    departures: &HashMap<TimetableKey, Vec<String>>,
) -> Vec<TimetableEntry> {
    routes
        .iter()
        .map(|route| TimetableEntry {
            stop_group: route.stop_group.clone(),
            stop_post: route.stop_post.clone(),
            route_id: route.route_id.clone(),
            sequence: route.sequence,
            departures: departures.get(&route.key()).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Joins published reference data into the stop and timetable tables of a
/// snapshot.
pub fn assemble(
    routes: &[RouteStop],
    locations: &[StopLocation],
    departures: &HashMap<TimetableKey, Vec<String>>,
) -> (Vec<Stop>, Vec<TimetableEntry>) {
    (
        route_stops(routes, locations),
        timetable_entries(routes, departures),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_stops_left_join_locations() {
        let routes = vec![
            route("100", 1, "1001", "01"),
            route("100", 2, "1002", "03"),
        ];
        let locations = vec![location("1001", "01", 52.0, 21.0)];

        let stops = route_stops(&routes, &locations);

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].lat, Some(52.0));
        assert_eq!(stops[0].route_id, "100");
        assert_eq!(stops[1].lat, None);
        assert_eq!(stops[1].stop_post, "03");
    }

    #[test]
    fn test_timetable_keys_are_distinct() {
        let routes = vec![
            route("100", 1, "1001", "01"),
            route("100", 4, "1001", "01"),
            route("200", 2, "1001", "01"),
        ];

        let keys = timetable_keys(&routes);

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].route_id, "100");
        assert_eq!(keys[1].route_id, "200");
    }

    #[test]
    fn test_timetable_entries_share_departures_per_key() {
        let routes = vec![
            route("100", 1, "1001", "01"),
            route("100", 4, "1001", "01"),
            route("100", 5, "1002", "01"),
        ];
        let mut departures = HashMap::new();
        departures.insert(routes[0].key(), vec!["05:10:00".to_string()]);

        let entries = timetable_entries(&routes, &departures);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[1].sequence, 4);
        assert_eq!(entries[1].departures, vec!["05:10:00"]);
        assert!(entries[2].departures.is_empty());
    }

    #[test]
    fn test_assemble_yields_one_stop_and_entry_per_call() {
        let routes = vec![
            route("100", 1, "1001", "01"),
            route("100", 2, "1002", "03"),
        ];
        let locations = vec![
            location("1001", "01", 52.0, 21.0),
            location("1002", "03", 52.01, 21.0),
        ];
        let mut departures = HashMap::new();
        departures.insert(routes[1].key(), vec!["05:12:00".to_string()]);

        let (stops, entries) = assemble(&routes, &locations, &departures);

        assert_eq!(stops.len(), 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(stops[1].lat, Some(52.01));
        assert_eq!(entries[1].sequence, 2);
        assert_eq!(entries[1].departures, vec!["05:12:00"]);
    }

    // Helper functions for tests
    fn route(route_id: &str, sequence: u32, group: &str, post: &str) -> RouteStop {
        RouteStop {
            route_id: route_id.to_string(),
            variant: "TP-TEST".to_string(),
            sequence,
            stop_group: group.to_string(),
            stop_post: post.to_string(),
        }
    }

    fn location(group: &str, post: &str, lat: f64, lon: f64) -> StopLocation {
        StopLocation {
            stop_group: group.to_string(),
            stop_post: post.to_string(),
            name: None,
            lat: Some(lat),
            lon: Some(lon),
        }
    }
}
