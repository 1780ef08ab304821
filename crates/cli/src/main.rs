//! memocache command-line entry point.
//!
//! Logging goes to stderr so that cached payloads written to stdout stay
//! byte-for-byte intact.

use anyhow::{Context, Result};
use clap::Parser;
use memocache_core::{CacheConfig, CacheEngine};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::load().context("loading memocache configuration")?;
    if let Some(path) = &cli.db_path {
        config.db_path = path.clone();
    }
    tracing::debug!(db_path = %config.db_path.display(), "using cache store");

    let engine = CacheEngine::new(&config).context("invalid memocache configuration")?;
    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    commands::run(&engine, &cli, &mut stdin, &mut stdout)?;

    Ok(())
}
