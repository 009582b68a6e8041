//! Build discovery: candidate listing, retention and dispatch.
//!
//! Each dispatched build is an independent unit of work; a fetch failure on
//! one build is logged and the batch moves on, so partial CI outages never
//! block the indexing of sibling builds.

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::{Config, CycleConfig};
use crate::crawler::{CrawlOutcome, Crawler};
use crate::error::Result;
use crate::fetcher::{BuildFetcher, BuildToIndex};
use crate::store::ExecutionRepository;

/// Outcome counts of one discovery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub indexed: usize,
    pub already_done: usize,
    pub failed: usize,
}

pub struct Discoverer<'a> {
    pub config: &'a Config,
    pub fetcher: &'a dyn BuildFetcher,
    pub executions: &'a dyn ExecutionRepository,
    pub crawler: &'a Crawler<'a>,
}

impl Discoverer<'_> {
    /// Runs the full discovery pipeline for every configured cycle.
    pub async fn discover_all(&self) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();
        for cycle in &self.config.cycles {
            let cycle_report = self.discover_cycle(cycle).await?;
            report.indexed += cycle_report.indexed;
            report.already_done += cycle_report.already_done;
            report.failed += cycle_report.failed;
        }
        Ok(report)
    }

    /// Discovers, truncates, filters and indexes one cycle's builds.
    pub async fn discover_cycle(&self, cycle: &CycleConfig) -> Result<DiscoveryReport> {
        let candidates = self.retrieve_builds_to_index(cycle).await?;
        let retained = truncate_builds(
            candidates,
            self.config.indexing.max_build_days,
            self.config.indexing.min_builds_to_keep,
            Utc::now(),
        );
        let to_index = self.filter_out_done_executions(retained).await?;

        info!(
            "Indexing {} build(s) for cycle {}/{}",
            to_index.len(),
            cycle.branch,
            cycle.name
        );
        self.index(&to_index).await
    }

    /// Lists candidate builds for a cycle, tagged with their owner.
    ///
    /// Push-only CI systems register builds externally: nothing to pull.
    pub async fn retrieve_builds_to_index(&self, cycle: &CycleConfig) -> Result<Vec<BuildToIndex>> {
        if self.config.fetcher.push_only {
            return Ok(vec![]);
        }

        let builds = self
            .fetcher
            .list_job_history(&cycle.branch, &cycle.name)
            .await?;

        Ok(builds
            .into_iter()
            .map(|build| BuildToIndex {
                build,
                cycle_branch: cycle.branch.clone(),
                cycle_name: cycle.name.clone(),
            })
            .collect())
    }

    /// Drops candidates whose job URL is already indexed with terminal DONE
    /// status; that history is immutable and not worth re-parsing.
    pub async fn filter_out_done_executions(
        &self,
        candidates: Vec<BuildToIndex>,
    ) -> Result<Vec<BuildToIndex>> {
        let mut remaining = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.executions.is_done(&candidate.build.url).await? {
                continue;
            }
            remaining.push(candidate);
        }
        Ok(remaining)
    }

    /// Dispatches each candidate as its own unit of work.
    ///
    /// Fetch failures abort only their build and are retried naturally on
    /// the next discovery cycle; configuration errors abort the batch.
    pub async fn index(&self, candidates: &[BuildToIndex]) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        for candidate in candidates {
            match self.crawler.crawl(candidate).await {
                Ok(CrawlOutcome::AlreadyDone) => report.already_done += 1,
                Ok(CrawlOutcome::Indexed { .. }) => report.indexed += 1,
                Err(e) if e.is_retryable() => {
                    warn!("Crawl of {} failed, will retry next cycle: {e}", candidate.build.url);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

/// Applies the retention policy: a build is kept when it satisfies any
/// enabled bound — within `max_days` calendar days of now, or among the
/// `min_keep` most recent of its cycle. A bound ≤0 is disabled; with both
/// disabled everything is kept. Original order is preserved.
pub fn truncate_builds(
    builds: Vec<BuildToIndex>,
    max_days: i64,
    min_keep: i64,
    now: DateTime<Utc>,
) -> Vec<BuildToIndex> {
    let day_bound = max_days > 0;
    let count_bound = min_keep > 0;
    if !day_bound && !count_bound {
        return builds;
    }

    // Rank newest-first by build timestamp without reordering the input
    let mut order: Vec<usize> = (0..builds.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(builds[i].build.timestamp));
    let mut rank = vec![0usize; builds.len()];
    for (position, &index) in order.iter().enumerate() {
        rank[index] = position;
    }

    let today = now.date_naive();
    builds
        .into_iter()
        .enumerate()
        .filter(|(index, candidate)| {
            let age_days = (today - candidate.build.timestamp.date_naive()).num_days();
            let within_days = day_bound && age_days <= max_days;
            let within_count = count_bound && rank[*index] < min_keep as usize;
            within_days || within_count
        })
        .map(|(_, candidate)| candidate)
        .collect()
}
