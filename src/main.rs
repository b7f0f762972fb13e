//! CLI entry point for the AVL analyzer.
//!
//! Provides subcommands for collecting a snapshot from the Warsaw open-data
//! API and for analyzing a snapshot on disk.

mod infra;
mod services;

use crate::infra::warsaw::client::WarsawApiClient;
use crate::services::transit_api::{PollSchedule, TransitApi, collect_positions};
use anyhow::{Context, Result};
use avl_analyzer::diagnostics::TracingSink;
use avl_analyzer::input::load_snapshot;
use avl_analyzer::output::{print_json, write_results, write_snapshot};
use avl_analyzer::pipeline::{self, Snapshot};
use avl_analyzer::reference::{self, TimetableKey};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "avl_analyzer")]
#[command(about = "A tool to analyze transit vehicle positions against stops and timetables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect positions, stops and timetables from the Warsaw API
    Fetch {
        /// How many minutes to poll vehicle positions for
        #[arg(short, long, default_value_t = 60)]
        minutes: usize,

        /// Directory to write the snapshot tables to
        #[arg(short, long, default_value = "snapshot")]
        output_dir: PathBuf,

        /// Maximum number of concurrent timetable downloads
        #[arg(short, long, default_value_t = 5)]
        concurrency: usize,
    },
    /// Analyze a snapshot and write the result tables
    Analyze {
        /// Directory holding positions.csv, stops.csv and timetables.csv
        #[arg(short, long, default_value = "snapshot")]
        input_dir: PathBuf,

        /// Directory to write the result tables to
        #[arg(short, long, default_value = "results")]
        output_dir: PathBuf,

        /// Gzip compress the result tables
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/avl_analyzer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("avl_analyzer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            minutes,
            output_dir,
            concurrency,
        } => {
            let api_key =
                std::env::var("WARSAW_API_KEY").context("WARSAW_API_KEY must be set")?;
            let client = Arc::new(WarsawApiClient::new(api_key)?);

            let snapshot = fetch_snapshot(client, minutes, concurrency).await?;
            write_snapshot(&output_dir, &snapshot)?;
        }
        Commands::Analyze {
            input_dir,
            output_dir,
            gzip,
        } => {
            let snapshot = load_snapshot(&input_dir)?;
            let output = pipeline::run(&snapshot, &TracingSink);

            write_results(&output_dir, &output, gzip)?;
            print_json(&output.summary())?;
        }
    }

    Ok(())
}

/// Collects reference data, the timetable of every route call and
/// `minutes` of vehicle positions.
#[tracing::instrument(skip(api))]
async fn fetch_snapshot<A: TransitApi + 'static>(
    api: Arc<A>,
    minutes: usize,
    concurrency: usize,
) -> Result<Snapshot> {
    info!("Fetching stops and routes");
    let locations = api.stop_locations().await?;
    let routes = api.routes().await?;
    info!(
        locations = locations.len(),
        route_calls = routes.len(),
        "Reference data fetched"
    );

    let keys = reference::timetable_keys(&routes);
    info!(timetables = keys.len(), "Fetching timetables");
    let departures = fetch_departures(api.clone(), keys, concurrency).await?;

    let positions = collect_positions(api.as_ref(), PollSchedule::every_half_minute(minutes)).await;

    let (stops, timetables) = reference::assemble(&routes, &locations, &departures);
    Ok(Snapshot {
        positions,
        stops,
        timetables,
    })
}

/// Downloads the departures for every key, at most `concurrency` at a time.
/// Timetables that fail to download are left out.
async fn fetch_departures<A: TransitApi + 'static>(
    api: Arc<A>,
    keys: Vec<TimetableKey>,
    concurrency: usize,
) -> Result<HashMap<TimetableKey, Vec<String>>> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = vec![];

    for key in keys {
        let sem = semaphore.clone();
        let api = api.clone();

        let span = tracing::info_span!(
            "fetch_timetable",
            stop_group = %key.stop_group,
            stop_post = %key.stop_post,
            route_id = %key.route_id,
        );

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await.ok()?;
                match api.departures(&key).await {
                    Ok(times) => Some((key, times)),
                    Err(e) => {
                        error!(error = %e, "Timetable fetch failed");
                        None
                    }
                }
            }
            .instrument(span),
        );

        tasks.push(task);
    }

    let mut departures = HashMap::new();
    let mut failed = 0;
    for task in tasks {
        match task.await? {
            Some((key, times)) => {
                departures.insert(key, times);
            }
            None => failed += 1,
        }
    }

    info!(fetched = departures.len(), failed, "Timetables fetched");
    Ok(departures)
}
