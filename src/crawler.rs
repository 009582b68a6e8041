//! Per-build reconciliation state machine.
//!
//! One crawl is one independent unit of work: it resolves or creates the
//! Execution aggregate for a build, reconciles its Run/CountryDeployment
//! children against the cycle's platform rules and the freshly fetched CI
//! state, parses newly available reports (at most once per run), and
//! finalizes terminal statuses so the quality computer can judge the
//! result.

use log::{debug, info};

use crate::config::{Config, CycleConfig};
use crate::domain::{
    status_from_ci, Acceptance, CountryDeployment, Execution, ExecutionStatus, QualityStatus, Run,
    Technology,
};
use crate::error::Result;
use crate::fetcher::{Build, BuildFetcher, BuildToIndex, ExecutionTree};
use crate::quality;
use crate::report;
use crate::store::{AssetStore, CompletionRequestRepository, ExecutionRepository};

/// What one crawl did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The stored execution is already terminal; nothing was touched
    AlreadyDone,
    Indexed {
        status: ExecutionStatus,
        quality: QualityStatus,
    },
}

pub struct Crawler<'a> {
    pub config: &'a Config,
    pub fetcher: &'a dyn BuildFetcher,
    pub executions: &'a dyn ExecutionRepository,
    pub completion_requests: &'a dyn CompletionRequestRepository,
    pub assets: &'a dyn AssetStore,
}

impl Crawler<'_> {
    /// Crawls one candidate build to an up-to-date Execution.
    pub async fn crawl(&self, candidate: &BuildToIndex) -> Result<CrawlOutcome> {
        let build_url = candidate.build.url.as_str();

        let existing = self
            .executions
            .find_by_job(Some(build_url), candidate.build.link.as_deref())
            .await?;

        // Terminal executions are immutable history: re-crawling is a no-op
        if let Some(execution) = &existing {
            if execution.status == ExecutionStatus::Done {
                debug!("Execution already done, skipping: {build_url}");
                return Ok(CrawlOutcome::AlreadyDone);
            }
        }

        let mut build = candidate.build.clone();
        self.fetcher.complete_build_information(&mut build).await?;

        let mut execution = match existing {
            Some(execution) => refresh_execution(execution, &build),
            None => self.new_execution(candidate, &build),
        };

        let Some(cycle) = self.resolve_cycle_rule(candidate) else {
            // A build with no matching cycle definition cannot be indexed;
            // close it out instead of failing, with unknown blocking
            // eligibility
            info!("No cycle rule resolvable for {build_url}, closing as incomplete");
            execution.status = ExecutionStatus::Done;
            execution.quality_status = QualityStatus::Incomplete;
            execution.blocking_validation = false;
            self.executions.save(execution.clone()).await?;
            return Ok(CrawlOutcome::Indexed {
                status: execution.status,
                quality: execution.quality_status,
            });
        };

        if execution.runs.is_empty() && execution.country_deployments.is_empty() {
            self.initialize_execution_hierarchy(&mut execution, cycle)?;
        }

        let tree = self.fetcher.get_execution_tree(&build).await?;
        update_execution_hierarchy_job_urls(&mut execution, &tree);
        update_execution_hierarchy_statuses(&mut execution, &tree);

        self.crawl_new_available_runs(&mut execution).await?;

        execution.status = status_from_ci(Some(&build.url), build.building, build.result);
        execution.ci_result = build.result;

        // A completion request forces one more definitive crawl: the build
        // stays non-terminal for now and the marker is consumed
        if self.completion_requests.exists(build_url).await? {
            self.completion_requests.delete(build_url).await?;
            execution.status = ExecutionStatus::Running;
            execution.quality_status = QualityStatus::Incomplete;
            self.executions.save(execution).await?;
            return Ok(CrawlOutcome::Indexed {
                status: ExecutionStatus::Running,
                quality: QualityStatus::Incomplete,
            });
        }

        if execution.status == ExecutionStatus::Done {
            finalize_execution_hierarchy(&mut execution);
            quality::compute_quality(&mut execution, &self.config.severities())?;
        }

        let outcome = CrawlOutcome::Indexed {
            status: execution.status,
            quality: execution.quality_status,
        };
        self.executions.save(execution).await?;
        Ok(outcome)
    }

    fn new_execution(&self, candidate: &BuildToIndex, build: &Build) -> Execution {
        let thresholds = serde_json::to_string(&self.config.thresholds).unwrap_or_default();

        Execution {
            branch: candidate.cycle_branch.clone(),
            cycle_name: candidate.cycle_name.clone(),
            job_url: Some(build.url.clone()),
            job_link: build.link.clone(),
            release: build.release.clone().unwrap_or_default(),
            version: build.version.clone().unwrap_or_default(),
            build_date_time: Some(build.timestamp),
            version_date_time: build.version_timestamp,
            test_date_time: Some(build.timestamp),
            status: status_from_ci(Some(&build.url), build.building, build.result),
            ci_result: build.result,
            quality_status: QualityStatus::Incomplete,
            acceptance: Acceptance::New,
            blocking_validation: false,
            quality_thresholds: thresholds,
            quality_severities: String::new(),
            runs: vec![],
            country_deployments: vec![],
        }
    }

    fn resolve_cycle_rule(&self, candidate: &BuildToIndex) -> Option<&CycleConfig> {
        self.config
            .cycle(&candidate.cycle_branch, &candidate.cycle_name)
            .filter(|cycle| cycle.platform_rules.iter().any(|rule| rule.enabled))
    }

    /// Creates the Run/CountryDeployment children from the cycle's enabled
    /// platform rules, one deployment per (rule × country) and one run per
    /// (rule × country × test type).
    fn initialize_execution_hierarchy(
        &self,
        execution: &mut Execution,
        cycle: &CycleConfig,
    ) -> Result<()> {
        for rule in cycle.platform_rules.iter().filter(|rule| rule.enabled) {
            execution.blocking_validation |= rule.blocking_validation;

            for country in self.config.countries() {
                execution.country_deployments.push(CountryDeployment {
                    country: country.clone(),
                    platform: rule.platform.clone(),
                    status: ExecutionStatus::Pending,
                    ci_result: None,
                    job_url: None,
                    job_link: None,
                });

                for type_code in &rule.test_types {
                    // Unknown codes fail loudly: this is a setup mistake
                    let test_type = self.config.resolve_test_type(type_code)?;
                    execution.runs.push(Run {
                        country: country.clone(),
                        test_type,
                        platform: rule.platform.clone(),
                        country_tags: rule.country_tags.clone(),
                        severity_tags: rule.severity_tags.clone(),
                        include_in_thresholds: rule.include_in_thresholds,
                        status: ExecutionStatus::Pending,
                        ci_result: None,
                        job_url: None,
                        job_link: None,
                        executed_scenarios: vec![],
                    });
                }
            }
        }
        Ok(())
    }

    /// Fetches and parses reports for runs that have a job URL but no
    /// scenarios yet. Parsing happens at most once per run; runs within one
    /// execution share no mutable state, so their reports are read
    /// concurrently.
    async fn crawl_new_available_runs(&self, execution: &mut Execution) -> Result<()> {
        let jobs: Vec<(usize, ParseJob)> = execution
            .runs
            .iter()
            .enumerate()
            .filter(|(_, run)| !run.has_scenarios())
            .filter_map(|(index, run)| {
                let job_url = run.job_url.clone().filter(|url| !url.is_empty())?;
                Some((
                    index,
                    ParseJob {
                        job_url,
                        technology: run.test_type.technology,
                        country_code: run.country.code.clone(),
                        country_root_folders: self
                            .config
                            .test_type_config(&run.test_type.code)
                            .is_some_and(|t| t.country_root_folders),
                        log_prefix: sanitize(&format!(
                            "{}-{}-{}",
                            execution
                                .job_link
                                .as_deref()
                                .or(execution.job_url.as_deref())
                                .unwrap_or_default(),
                            run.country.code,
                            run.test_type.code
                        )),
                    },
                ))
            })
            .collect();

        let results = futures::future::join_all(
            jobs.into_iter()
                .map(|(index, job)| async move { (index, self.parse_run(job).await) }),
        )
        .await;

        for (index, result) in results {
            execution.runs[index].executed_scenarios = result?;
        }
        Ok(())
    }

    async fn parse_run(&self, job: ParseJob) -> Result<Vec<crate::domain::ExecutedScenario>> {
        match job.technology {
            Technology::Cucumber => match self.fetcher.get_cucumber_report(&job.job_url).await? {
                Some(json) => report::parse_cucumber_report(&json),
                None => Ok(vec![]),
            },
            Technology::Postman => match self.fetcher.get_postman_report(&job.job_url).await? {
                Some(bytes) => {
                    report::postman::index_newman_report(
                        bytes.as_slice(),
                        &job.country_code,
                        job.country_root_folders,
                        &job.log_prefix,
                        self.assets,
                    )
                    .await
                }
                None => Ok(vec![]),
            },
        }
    }
}

struct ParseJob {
    job_url: String,
    technology: Technology,
    country_code: String,
    country_root_folders: bool,
    log_prefix: String,
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Copies job URLs/links from the execution tree onto existing children,
/// matched by country (and test type for runs).
pub fn update_execution_hierarchy_job_urls(execution: &mut Execution, tree: &ExecutionTree) {
    for deployment in &mut execution.country_deployments {
        if let Some(job) = tree.country_job(&deployment.country.code) {
            deployment.job_url = job.url.clone();
            deployment.job_link = job.link.clone();
        }
    }
    for run in &mut execution.runs {
        if let Some(job) = tree.run_job(&run.country.code, &run.test_type.code) {
            run.job_url = job.url.clone();
            run.job_link = job.link.clone();
        }
    }
}

/// Derives child statuses from the CI results in the execution tree.
///
/// Terminal children are left alone: a run never moves out of DONE or
/// UNAVAILABLE, whatever the CI reports afterwards.
pub fn update_execution_hierarchy_statuses(execution: &mut Execution, tree: &ExecutionTree) {
    for deployment in &mut execution.country_deployments {
        if deployment.status.is_terminal() {
            continue;
        }
        if let Some(job) = tree.country_job(&deployment.country.code) {
            deployment.status = status_from_ci(job.url.as_deref(), job.building, job.result);
            deployment.ci_result = job.result;
        }
    }
    for run in &mut execution.runs {
        if run.status.is_terminal() {
            continue;
        }
        if let Some(job) = tree.run_job(&run.country.code, &run.test_type.code) {
            run.status = status_from_ci(job.url.as_deref(), job.building, job.result);
            run.ci_result = job.result;
        }
    }
}

/// Closes the hierarchy once the execution itself is DONE: children still
/// PENDING never ran, children still RUNNING finished without the terminal
/// tick being observed.
pub fn finalize_execution_hierarchy(execution: &mut Execution) {
    if execution.status != ExecutionStatus::Done {
        return;
    }

    let close = |status: &mut ExecutionStatus| match *status {
        ExecutionStatus::Pending => *status = ExecutionStatus::Unavailable,
        ExecutionStatus::Running => *status = ExecutionStatus::Done,
        ExecutionStatus::Done | ExecutionStatus::Unavailable => {}
    };

    for deployment in &mut execution.country_deployments {
        close(&mut deployment.status);
    }
    for run in &mut execution.runs {
        close(&mut run.status);
    }
}

fn refresh_execution(mut execution: Execution, build: &Build) -> Execution {
    if let Some(release) = &build.release {
        execution.release = release.clone();
    }
    if let Some(version) = &build.version {
        execution.version = version.clone();
    }
    execution.build_date_time = Some(build.timestamp);
    execution.test_date_time = Some(build.timestamp);
    if build.version_timestamp.is_some() {
        execution.version_date_time = build.version_timestamp;
    }
    execution
}
