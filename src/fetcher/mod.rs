mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::CiResult;
use crate::error::Result;

/// A CI build as seen from the job history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Canonical build URL, dedup key half
    pub url: String,
    /// Stable job link (path-style identity), dedup key half
    #[serde(default)]
    pub link: Option<String>,
    /// Build start time
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<CiResult>,
    /// Filled by `complete_build_information` once known
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_timestamp: Option<DateTime<Utc>>,
}

/// A candidate build tagged with the cycle that owns it.
#[derive(Debug, Clone)]
pub struct BuildToIndex {
    pub build: Build,
    pub cycle_branch: String,
    pub cycle_name: String,
}

/// One country's deployment job inside a build's execution tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryJob {
    pub country: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<CiResult>,
}

/// One (country × test-type) job inside a build's execution tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJob {
    pub country: String,
    #[serde(rename = "type")]
    pub type_code: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<CiResult>,
}

/// Which countries and test lanes a build actually ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTree {
    #[serde(default)]
    pub deployed_countries: Vec<CountryJob>,
    #[serde(default)]
    pub non_regression_runs: Vec<RunJob>,
}

impl ExecutionTree {
    pub fn country_job(&self, country: &str) -> Option<&CountryJob> {
        self.deployed_countries.iter().find(|c| c.country == country)
    }

    pub fn run_job(&self, country: &str, type_code: &str) -> Option<&RunJob> {
        self.non_regression_runs
            .iter()
            .find(|r| r.country == country && r.type_code == type_code)
    }
}

/// Abstraction over "pull" CI systems.
///
/// Push systems register builds externally and never enter the discovery
/// loop. Every method may fail with a fetch error, which the crawler treats
/// as "abort this build only"; timeout policy lives behind this contract.
#[async_trait]
pub trait BuildFetcher: Send + Sync {
    /// Lists the job history of one cycle, newest builds included.
    async fn list_job_history(&self, branch: &str, cycle_name: &str) -> Result<Vec<Build>>;

    /// Resolves which countries/test lanes a build ran.
    async fn get_execution_tree(&self, build: &Build) -> Result<ExecutionTree>;

    /// Fetches a run's Cucumber report, if published.
    async fn get_cucumber_report(&self, run_job_url: &str) -> Result<Option<String>>;

    /// Fetches a run's Newman report bytes, if published.
    async fn get_postman_report(&self, run_job_url: &str) -> Result<Option<Vec<u8>>>;

    /// Fills in timestamps/version/release once the CI exposes them.
    async fn complete_build_information(&self, build: &mut Build) -> Result<()>;
}
