//! Argus operational binary.
//!
//! Three modes: generate a default configuration, replay a newline-delimited
//! JSON event feed through the pipeline, or run as a long-lived service with
//! periodic maintenance until a signal arrives.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use argus_audit::{export_events, EventFilter, ExportFormat};
use argus_core::config::ArgusConfig;
use argus_core::types::SecurityEvent;
use argus_pipeline::{IngestOutcome, Pipeline};

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_STORAGE: i32 = 2;
const EXIT_SIGNAL: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "argus",
    version,
    about = "Security event analysis and alerting pipeline"
)]
struct Cli {
    /// Configuration file. Missing file falls back to defaults.
    #[arg(short, long, default_value = "argus.toml")]
    config: PathBuf,

    /// Write the default configuration to PATH and exit.
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,

    /// Replay newline-delimited JSON events from PATH ("-" for stdin),
    /// print a run report, then exit.
    #[arg(long, value_name = "PATH")]
    feed: Option<PathBuf>,

    /// After a feed run, export audited events to stdout (json|csv).
    #[arg(long, value_name = "FORMAT")]
    export: Option<String>,

    /// Day range for the statistics block printed after a feed run.
    #[arg(long, default_value_t = 7)]
    stats_days: u32,
}

#[derive(Debug, Default, serde::Serialize)]
struct FeedSummary {
    accepted: u64,
    rejected: u64,
    parse_errors: u64,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        return match ArgusConfig::default().save(path) {
            Ok(()) => {
                println!("configuration written to {}", path.display());
                EXIT_OK
            }
            Err(e) => {
                eprintln!("failed to write configuration: {e}");
                EXIT_CONFIG
            }
        };
    }

    let config = match ArgusConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_CONFIG;
        }
    };
    init_logging(&config.general.log_level);

    let pipeline = match Pipeline::builder(config).build() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Pipeline assembly failed");
            return EXIT_CONFIG;
        }
    };

    match &cli.feed {
        Some(path) => feed_mode(&pipeline, &cli, path),
        None => service_mode(&pipeline).await,
    }
}

fn feed_mode(pipeline: &Pipeline, cli: &Cli, path: &Path) -> i32 {
    let summary = if path.as_os_str() == "-" {
        feed_events(pipeline, BufReader::new(std::io::stdin().lock()))
    } else {
        match std::fs::File::open(path) {
            Ok(file) => feed_events(pipeline, BufReader::new(file)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot open feed");
                return EXIT_STORAGE;
            }
        }
    };
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Feed read failed");
            return EXIT_STORAGE;
        }
    };

    // Let the dispatcher drain before reporting.
    pipeline.shutdown();

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        parse_errors = summary.parse_errors,
        "Feed complete"
    );
    let stats = pipeline.audit().statistics(cli.stats_days, wall_now_ms());
    let report = serde_json::json!({
        "feed": summary,
        "pipeline": pipeline.report(),
        "statistics": stats,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            error!(error = %e, "Report serialization failed");
            return EXIT_STORAGE;
        }
    }

    if let Some(format) = &cli.export {
        let format = match ExportFormat::parse(format) {
            Ok(format) => format,
            Err(e) => {
                eprintln!("{e}");
                return EXIT_CONFIG;
            }
        };
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = export_events(pipeline.audit(), format, &EventFilter::default(), &mut out) {
            error!(error = %e, "Export failed");
            return EXIT_STORAGE;
        }
    }
    EXIT_OK
}

async fn service_mode(pipeline: &Pipeline) -> i32 {
    info!("Service started");
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Signal handler failed");
                }
                info!("Shutdown signal received");
                pipeline.shutdown();
                return EXIT_SIGNAL;
            }
            _ = ticker.tick() => {
                pipeline.maintain();
            }
        }
    }
}

fn feed_events(pipeline: &Pipeline, reader: impl BufRead) -> std::io::Result<FeedSummary> {
    let mut summary = FeedSummary::default();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: SecurityEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(e) => {
                summary.parse_errors += 1;
                warn!(error = %e, "Skipping malformed feed line");
                continue;
            }
        };
        match pipeline.ingest(event) {
            IngestOutcome::Accepted { .. } => summary.accepted += 1,
            IngestOutcome::Rejected(reason) => {
                summary.rejected += 1;
                warn!(?reason, "Event rejected");
            }
        }
    }
    Ok(summary)
}

fn wall_now_ms() -> i64 {
    use argus_core::clock::{Clock, SystemClock};
    SystemClock.now_ms()
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_feed_counts_accepted_rejected_and_malformed() {
        let pipeline = Pipeline::builder(ArgusConfig::default()).build().unwrap();
        let feed = concat!(
            "{\"id\":\"e1\",\"timestamp_ms\":1000,\"kind\":\"api_access\"}\n",
            "\n",
            "not json\n",
            "{\"id\":\"e1\",\"timestamp_ms\":2000,\"kind\":\"api_access\"}\n",
        );
        let summary = feed_events(&pipeline, Cursor::new(feed)).unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1); // duplicate id
        assert_eq!(summary.parse_errors, 1);
        pipeline.shutdown();
    }
}
