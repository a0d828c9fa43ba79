//! Birdwatch - field bird acoustic monitoring pipeline.
//!
//! A microphone feeds a continuous PCM stream into a neural classifier;
//! recognized vocalizations are persisted as detections, filtered against
//! regional eBird occurrence packs, joined against taxonomic and
//! translation reference databases, aggregated into ecological analytics,
//! and streamed to live subscribers.

#![warn(missing_docs)]

pub mod analytics;
pub mod analyzer;
pub mod audio;
pub mod config;
pub mod constants;
pub mod db;
pub mod ebird;
pub mod error;
pub mod ingest;
pub mod live;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod utils;

use clap::Parser;
use ingest::DetectionEvent;
use pipeline::Pipeline;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};

pub use error::{Error, Result};

/// Command-line interface for the station daemon.
#[derive(Debug, Parser)]
#[command(name = "birdwatch", version, about = "Bird acoustic monitoring station")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "BIRDWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Main entry point for the station daemon.
///
/// The daemon runs the ingest half of the pipeline in the sidecar
/// arrangement: detection events arrive as NDJSON on stdin (one event per
/// line, per the wire contract) and each outcome is echoed as NDJSON on
/// stdout. Embedders that run the classifier in-process use
/// [`pipeline::Pipeline::build`] with a [`analyzer::Classifier`] instead.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => config::load_default_config()?,
    };

    let pipeline = Pipeline::build(&config, None).await?;
    info!(
        data_root = %config.station.data_root.display(),
        "pipeline started, reading detection events from stdin"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => handle_event_line(&pipeline, &line).await,
                }
            }
        }
    }

    pipeline.stop().await;
    Ok(())
}

/// Parse and ingest one NDJSON event line, echoing the outcome.
async fn handle_event_line(pipeline: &Pipeline, line: &str) {
    let event: DetectionEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejected malformed event line");
            print_json(&serde_json::json!({ "error": format!("malformed event: {e}") }));
            return;
        }
    };

    match pipeline.ingest(event).await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(value) => print_json(&value),
            Err(e) => error!(error = %e, "failed to serialize outcome"),
        },
        Err(e) => {
            warn!(error = %e, "event rejected");
            print_json(&serde_json::json!({ "error": e.to_string() }));
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_json(value: &serde_json::Value) {
    println!("{value}");
}

/// Initialize logging to stderr, keeping stdout clean for NDJSON output.
fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter_str = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    // Use try_init() to avoid panic if a subscriber is already set (tests).
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
