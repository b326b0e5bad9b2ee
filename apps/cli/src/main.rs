//! SiteScribe CLI — turn a website into a long-form generated document.
//!
//! Crawls the target site, builds a searchable content index, and runs the
//! staged generation pipeline against it.

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
