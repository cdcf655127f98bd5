//! CLI entry point for the ingest service.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use trafficflow_ingest::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();

    // One-shot commands log warnings only, the service logs at info; RUST_LOG overrides both
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.command.default_log_filter())),
        )
        .with_target(false)
        .init();

    if let Err(e) = cli::run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
