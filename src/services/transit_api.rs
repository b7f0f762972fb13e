//! Trait for a live transit data provider, and position collection on top
//! of it.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use avl_analyzer::analyzers::types::PositionSample;
use avl_analyzer::reference::{RouteStop, StopLocation, TimetableKey};
use tracing::{debug, info, warn};

/// Abstraction over a provider of live positions and reference data
/// (e.g., the Warsaw open-data API).
#[async_trait::async_trait]
pub trait TransitApi: Send + Sync {
    /// Current position of every reporting vehicle.
    async fn vehicle_positions(&self) -> Result<Vec<PositionSample>>;

    async fn stop_locations(&self) -> Result<Vec<StopLocation>>;

    async fn routes(&self) -> Result<Vec<RouteStop>>;

    /// Published departures of one route at one stop post, as `HH:MM:SS`.
    async fn departures(&self, key: &TimetableKey) -> Result<Vec<String>>;
}

/// How often, and how many times, positions are polled.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub polls: usize,
    pub interval: Duration,
    pub retry_delay: Duration,
}

impl PollSchedule {
    /// Two polls a minute for `minutes` minutes.
    pub fn every_half_minute(minutes: usize) -> Self {
        Self {
            polls: 2 * minutes,
            interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(30),
        }
    }
}

type SampleKey = (String, String, chrono::NaiveDateTime, Option<u64>, Option<u64>);

fn sample_key(sample: &PositionSample) -> SampleKey {
    (
        sample.vehicle_id.clone(),
        sample.line_id.clone(),
        sample.timestamp,
        sample.lat.map(f64::to_bits),
        sample.lon.map(f64::to_bits),
    )
}

/// Polls `api` per `schedule` and returns every distinct sample seen.
///
/// A poll that fails or comes back empty is retried after
/// `schedule.retry_delay` until it yields data. Vehicles that have not
/// reported since the previous poll repeat their last sample, so duplicates
/// are dropped keeping the first occurrence.
#[tracing::instrument(skip_all, fields(polls = schedule.polls))]
pub async fn collect_positions<A: TransitApi + ?Sized>(
    api: &A,
    schedule: PollSchedule,
) -> Vec<PositionSample> {
    let mut seen = HashSet::new();
    let mut samples = Vec::new();

    for poll in 1..=schedule.polls {
        let batch = loop {
            match api.vehicle_positions().await {
                Ok(batch) if !batch.is_empty() => break batch,
                Ok(_) => warn!(poll, "Position poll returned no vehicles, retrying"),
                Err(e) => warn!(poll, error = %e, "Position poll failed, retrying"),
            }
            tokio::time::sleep(schedule.retry_delay).await;
        };

        let received = batch.len();
        samples.extend(batch.into_iter().filter(|s| seen.insert(sample_key(s))));
        debug!(poll, received, total = samples.len(), "Positions polled");

        if poll < schedule.polls {
            tokio::time::sleep(schedule.interval).await;
        }
    }

    info!(samples = samples.len(), "Position collection finished");
    samples
}
