use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::crawler::Crawler;
use crate::discovery::Discoverer;
use crate::error::QualensError;
use crate::fetcher::HttpFetcher;
use crate::output;
use crate::store::{ExecutionRepository, JsonStore};

#[derive(Parser)]
#[command(name = "qualens")]
#[command(author, version, about = "CI Test Quality Indexer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "qualens.toml")]
    config: PathBuf,

    /// Store directory (defaults to the platform data dir)
    #[arg(short, long, global = true)]
    store_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and index CI builds for the configured cycles
    Index {
        #[arg(short, long, env = "QUALENS_TOKEN")]
        token: Option<String>,

        /// Restrict to one cycle branch
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Show the stored quality breakdown of one indexed execution
    Quality {
        /// Job URL of the execution
        #[arg(short, long)]
        job_url: String,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(&self.config)?;
        let store = self.open_store()?;

        match &self.command {
            Commands::Index { token, branch } => {
                self.execute_index(&config, &store, token.as_deref(), branch.as_deref())
                    .await
            }
            Commands::Quality { job_url } => self.execute_quality(&store, job_url).await,
        }
    }

    fn open_store(&self) -> Result<JsonStore> {
        let store = match &self.store_dir {
            Some(dir) => JsonStore::open(dir)?,
            None => JsonStore::open_default()?,
        };
        Ok(store)
    }

    async fn execute_index(
        &self,
        config: &Config,
        store: &JsonStore,
        token: Option<&str>,
        branch: Option<&str>,
    ) -> Result<()> {
        info!("Indexing CI builds from: {}", config.fetcher.base_url);

        let token = token.or(config.fetcher.token.as_deref());
        let fetcher = HttpFetcher::new(&config.fetcher.base_url, token)?;

        let crawler = Crawler {
            config,
            fetcher: &fetcher,
            executions: store,
            completion_requests: store,
            assets: store,
        };
        let discoverer = Discoverer {
            config,
            fetcher: &fetcher,
            executions: store,
            crawler: &crawler,
        };

        let report = match branch {
            None => discoverer.discover_all().await?,
            Some(branch) => {
                let mut report = crate::discovery::DiscoveryReport::default();
                for cycle in config.cycles.iter().filter(|c| c.branch == branch) {
                    let cycle_report = discoverer.discover_cycle(cycle).await?;
                    report.indexed += cycle_report.indexed;
                    report.already_done += cycle_report.already_done;
                    report.failed += cycle_report.failed;
                }
                report
            }
        };

        output::print_discovery_summary(&report);

        if let Some(output_path) = &self.output {
            self.write_json(output_path, &store.all().await?)?;
        }

        Ok(())
    }

    async fn execute_quality(&self, store: &JsonStore, job_url: &str) -> Result<()> {
        let execution = store
            .find_by_job(Some(job_url), None)
            .await?
            .ok_or_else(|| QualensError::NotFound(format!("No execution for {job_url}")))?;

        output::print_quality_summary(&execution);

        if let Some(output_path) = &self.output {
            self.write_json(output_path, &execution)?;
        }

        Ok(())
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
        info!("Output written to: {}", path.display());
        Ok(())
    }
}
