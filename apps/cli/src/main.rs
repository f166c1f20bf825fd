//! stacharvest CLI — harvest planetary-science data services into STAC
//! catalogs.
//!
//! Discovers registered services, extracts per-collection metadata,
//! transforms it into validated STAC records, and ingests the result into a
//! destination catalog.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
