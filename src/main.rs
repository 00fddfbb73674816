//! tfingest - Terraform module tree ingestion
//!
//! Scans a configuration directory and prints its resources, grouped by type,
//! as JSON on stdout. Diagnostics go to stderr; set `TFINGEST_LOG` to control them.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;

const LOG_ENV: &str = "TFINGEST_LOG";

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tfingest=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = commands::scan::run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
