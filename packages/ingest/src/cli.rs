//! Command-line interface for the ingest service.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::IngestConfig;
use crate::error::Result;
use crate::ndw::NdwClient;
use crate::traffic::{AggregateMeasurement, DecodeStats, Scheduler, SiteFilter, TrafficHandler};

/// How often `run` checks that the scheduler thread is alive.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

/// trafficflow ingest - flow and speed per site from NDW DATEX II feeds.
#[derive(Parser)]
#[command(name = "trafficflow-ingest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode local feed files and print the aggregates.
    Decode {
        /// Measurement publication (trafficspeed.xml, optionally gzipped)
        #[arg(short, long)]
        measurements: PathBuf,

        /// Measurement site table (measurement_current.xml, optionally gzipped)
        #[arg(short, long)]
        sites: PathBuf,

        /// File with one site id per line to restrict the output to
        #[arg(long)]
        site_ids: Option<PathBuf>,

        /// Print aggregates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch feeds on schedule, configured from the environment.
    Run,
}

impl Commands {
    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Commands::Decode { .. } => "warn",
            Commands::Run => "info",
        }
    }
}

/// Run the CLI.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Decode {
            measurements,
            sites,
            site_ids,
            json,
        } => decode_command(&measurements, &sites, site_ids.as_deref(), json),
        Commands::Run => run_command(),
    }
}

/// Decode local files through the full pipeline.
fn decode_command(
    measurements: &Path,
    sites: &Path,
    site_ids: Option<&Path>,
    json: bool,
) -> Result<()> {
    let filter = match site_ids {
        Some(path) => SiteFilter::from_reader(BufReader::new(File::open(path)?))?,
        None => SiteFilter::all(),
    };
    let handler = TrafficHandler::new(filter, 1);

    let site_count = handler.reload_reference(&fs::read(sites)?)?;
    let stats = handler.trigger_decode(&fs::read(measurements)?)?;

    let aggregates: Vec<Arc<AggregateMeasurement>> = handler
        .cache()
        .site_ids()
        .iter()
        .filter_map(|id| handler.get_aggregate(id))
        .collect();

    if json {
        let values: Vec<&AggregateMeasurement> = aggregates.iter().map(Arc::as_ref).collect();
        let text = serde_json::to_string_pretty(&values).map_err(std::io::Error::from)?;
        println!("{text}");
        return Ok(());
    }

    print_stats(site_count, &stats);
    println!();
    for aggregate in &aggregates {
        println!(
            "{}  flow {}  speed {}  lanes {}",
            style(&aggregate.site_id).cyan(),
            format_value(aggregate.total_flow, "veh/h"),
            format_value(aggregate.avg_speed, "km/h"),
            aggregate.lanes.len()
        );
    }
    Ok(())
}

fn print_stats(site_count: usize, stats: &DecodeStats) {
    println!("{} {}", style("Reference sites:").bold(), site_count);
    println!("{} {}", style("Records:").bold(), stats.records_seen);
    println!("  Decoded: {}", style(stats.records_decoded).green());
    if stats.record_errors > 0 {
        println!("  Errors: {}", style(stats.record_errors).red().bold());
    }
    if stats.reference_mismatches > 0 {
        println!(
            "  Reference mismatches: {}",
            style(stats.reference_mismatches).yellow()
        );
    }
    println!("  Sites updated: {}", stats.sites_updated);
}

fn format_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format!("{value:.1} {unit}"),
        None => style("-").dim().to_string(),
    }
}

/// Start the scheduler and block for as long as it stays healthy.
fn run_command() -> Result<()> {
    let config = IngestConfig::from_env()?;
    let handler = Arc::new(TrafficHandler::from_config(&config)?);
    let client = NdwClient::new(&config)?;
    let scheduler = Scheduler::start(Arc::clone(&handler), client, &config)?;

    loop {
        std::thread::sleep(WATCHDOG_INTERVAL);
        if !scheduler.is_healthy() {
            tracing::error!("Scheduler thread is not responding");
            scheduler.stop()?;
            return Err(crate::error::IngestError::SchedulerStopped);
        }
        tracing::debug!(
            sites = handler.cache().len(),
            cycles = handler.cycles(),
            "Scheduler healthy"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_decode() {
        let cli = Cli::parse_from([
            "trafficflow-ingest",
            "decode",
            "--measurements",
            "trafficspeed.xml.gz",
            "--sites",
            "measurement_current.xml.gz",
        ]);

        let Commands::Decode {
            measurements,
            sites,
            site_ids,
            json,
        } = cli.command
        else {
            panic!("expected decode command");
        };
        assert_eq!(measurements, PathBuf::from("trafficspeed.xml.gz"));
        assert_eq!(sites, PathBuf::from("measurement_current.xml.gz"));
        assert!(site_ids.is_none());
        assert!(!json);
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["trafficflow-ingest", "run"]);
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.command.default_log_filter(), "info");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(86.666), "km/h"), "86.7 km/h");
    }
}
