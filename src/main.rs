mod cli;
mod config;
mod crawler;
mod discovery;
mod domain;
mod error;
mod fetcher;
mod output;
mod quality;
mod report;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting Qualens - CI Test Quality Indexer");
    cli.execute().await?;

    Ok(())
}
