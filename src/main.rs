//! omr-tri command-line entry point

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use omr_tri::config::Config;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let threads = config.threads();
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        tracing::warn!("could not size the worker pool to {}: {}", threads, e);
    }

    match &cli.command {
        Commands::Detect(args) => cli::run_detect(args, &config, cli.verbose),
        Commands::Score(args) => cli::run_score(args, &config),
        Commands::Tct(args) => cli::run_tct(args, &config),
        Commands::Template(args) => cli::run_template(args),
    }
}
