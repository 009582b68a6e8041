use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifecycle of an indexed build and of every lane inside it.
///
/// `Done` and `Unavailable` are terminal: the crawler never moves a node
/// back out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Done,
    Unavailable,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Done | ExecutionStatus::Unavailable)
    }
}

/// Aggregate pass/fail classification of an execution or of one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityStatus {
    Incomplete,
    Passed,
    Warning,
    Failed,
}

impl QualityStatus {
    /// Returns the more severe of the two classifications.
    ///
    /// `Incomplete` dominates everything: an execution with a single
    /// unjudgeable severity cannot be called passed or failed.
    pub fn worst(self, other: QualityStatus) -> QualityStatus {
        use QualityStatus::{Failed, Incomplete, Passed, Warning};
        match (self, other) {
            (Incomplete, _) | (_, Incomplete) => Incomplete,
            (Failed, _) | (_, Failed) => Failed,
            (Warning, _) | (_, Warning) => Warning,
            (Passed, Passed) => Passed,
        }
    }
}

/// Raw result reported by the CI system for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CiResult {
    Aborted,
    Failure,
    NotBuilt,
    Success,
    Unstable,
}

/// Review state of an execution's quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Acceptance {
    New,
    Reviewed,
}

/// Report technology a test type runs on.
///
/// Closed set on purpose: report parsing is dispatched exactly once per Run
/// from this tag, and a new format means a new variant plus a new parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Cucumber,
    Postman,
}

/// A configured test technology lane (e.g. "api", "firefox-desktop").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestType {
    /// Short unique code referenced by platform rules
    pub code: String,
    pub name: String,
    pub technology: Technology,
    /// Whether scenarios run inside a browser (vs direct API calls)
    pub browser: bool,
}

/// A country the project ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Lowercase two-letter-ish code ("fr", "be", ...)
    pub code: String,
    pub name: String,
}

/// Project-scoped importance class used to threshold quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Severity {
    pub code: String,
    pub name: String,
    /// Display/evaluation order, lowest first
    pub position: u32,
    /// The severity absorbing scenarios that carry no severity tag
    #[serde(default)]
    pub default_on_missing: bool,
}

/// Failure/warning percentage pair for one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityThreshold {
    /// Below this passed-percentage the severity is FAILED
    pub failure: u8,
    /// Below this passed-percentage (but at or above failure) it is WARNING
    pub warning: u8,
}

/// Severity-code (or `"all"`) keyed threshold map, as serialized on an
/// execution. Insertion order is preserved so the stored snapshot is stable.
pub type QualityThresholds = IndexMap<String, QualityThreshold>;

/// Wildcard key matching every severity in threshold maps and tag filters.
pub const ALL_SEVERITIES: &str = "all";

/// One failing step inside an executed scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioError {
    /// Line of the failing step in the scenario's content records
    pub step_line: i64,
    /// Step text as displayed
    pub step: String,
    /// Matched step definition, when the report provides one
    #[serde(default)]
    pub step_definition: String,
    pub exception: String,
}

/// One test scenario result inside a Run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedScenario {
    /// Cucumber-style hierarchical id (folder path or feature;element)
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Space-separated scenario tags, e.g. "@severity-high @country-be"
    #[serde(default)]
    pub tags: String,
    /// Severity code decoded from the tags, empty when untagged
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub feature_file: String,
    #[serde(default)]
    pub feature_name: String,
    /// Ordinal line of the scenario inside its feature/collection
    pub line: u32,
    /// Newline-joined `<line>:<status>:<step>` records
    pub content: String,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    /// Uploaded HTTP log location, only set when the scenario failed
    #[serde(default)]
    pub http_requests_url: Option<String>,
    #[serde(default)]
    pub errors: Vec<ScenarioError>,
}

impl ExecutedScenario {
    pub fn has_failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// One (country × test-type) execution lane within an Execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub country: Country,
    pub test_type: TestType,
    pub platform: String,
    /// Comma-separated country codes this run covers, or "all"
    pub country_tags: String,
    /// Comma-separated severity codes this run restricts to, or "all"
    pub severity_tags: String,
    /// Whether scenarios of this run count toward quality thresholds
    pub include_in_thresholds: bool,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub ci_result: Option<CiResult>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub job_link: Option<String>,
    #[serde(default)]
    pub executed_scenarios: Vec<ExecutedScenario>,
}

impl Run {
    /// A run is parsed at most once: scenarios already present mean the
    /// report was consumed on an earlier crawl.
    pub fn has_scenarios(&self) -> bool {
        !self.executed_scenarios.is_empty()
    }
}

/// Deployment outcome of one country within an Execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDeployment {
    pub country: Country,
    pub platform: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub ci_result: Option<CiResult>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub job_link: Option<String>,
}

/// One indexed CI build and its full result hierarchy.
///
/// Created the first time a build is observed, mutated on every re-crawl
/// until `status` is `Done`, never deleted by the indexing subsystem.
/// `(job_url, job_link)` is the dedup key; at least one must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub branch: String,
    pub cycle_name: String,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub job_link: Option<String>,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_date_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub ci_result: Option<CiResult>,
    pub quality_status: QualityStatus,
    pub acceptance: Acceptance,
    #[serde(default)]
    pub blocking_validation: bool,
    /// Threshold snapshot taken at indexing time, serialized JSON
    #[serde(default)]
    pub quality_thresholds: String,
    /// Per-severity quality breakdown, serialized JSON
    #[serde(default)]
    pub quality_severities: String,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub country_deployments: Vec<CountryDeployment>,
}

impl Execution {
    /// Both key halves compared; a candidate matches when either non-empty
    /// half matches.
    pub fn matches_job(&self, job_url: Option<&str>, job_link: Option<&str>) -> bool {
        let url_match = match (self.job_url.as_deref(), job_url) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let link_match = match (self.job_link.as_deref(), job_link) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        url_match || link_match
    }

    /// Runs that participate in quality computation.
    pub fn threshold_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter().filter(|r| r.include_in_thresholds)
    }
}

/// Derives a lane status from what the CI system currently reports.
///
/// No URL means the job was never scheduled; a missing result on a known
/// job means it is still building; `NOT_BUILT` means the CI skipped it for
/// good; every other result is CI-level completion regardless of scenario
/// pass/fail.
pub fn status_from_ci(
    job_url: Option<&str>,
    building: bool,
    result: Option<CiResult>,
) -> ExecutionStatus {
    match job_url {
        None | Some("") => ExecutionStatus::Pending,
        Some(_) => match result {
            None => ExecutionStatus::Running,
            Some(_) if building => ExecutionStatus::Running,
            Some(CiResult::NotBuilt) => ExecutionStatus::Unavailable,
            Some(
                CiResult::Aborted | CiResult::Failure | CiResult::Success | CiResult::Unstable,
            ) => ExecutionStatus::Done,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_status_worst_incomplete_dominates() {
        assert_eq!(
            QualityStatus::Incomplete.worst(QualityStatus::Failed),
            QualityStatus::Incomplete
        );
        assert_eq!(
            QualityStatus::Passed.worst(QualityStatus::Incomplete),
            QualityStatus::Incomplete
        );
    }

    #[test]
    fn test_quality_status_worst_ordering() {
        assert_eq!(
            QualityStatus::Passed.worst(QualityStatus::Warning),
            QualityStatus::Warning
        );
        assert_eq!(
            QualityStatus::Warning.worst(QualityStatus::Failed),
            QualityStatus::Failed
        );
        assert_eq!(
            QualityStatus::Passed.worst(QualityStatus::Passed),
            QualityStatus::Passed
        );
    }

    #[test]
    fn test_status_from_ci_no_url_is_pending() {
        assert_eq!(
            status_from_ci(None, false, Some(CiResult::Success)),
            ExecutionStatus::Pending
        );
        assert_eq!(
            status_from_ci(Some(""), false, None),
            ExecutionStatus::Pending
        );
    }

    #[test]
    fn test_status_from_ci_building_or_absent_result_is_running() {
        assert_eq!(
            status_from_ci(Some("http://ci/job/1"), true, Some(CiResult::Success)),
            ExecutionStatus::Running
        );
        assert_eq!(
            status_from_ci(Some("http://ci/job/1"), false, None),
            ExecutionStatus::Running
        );
    }

    #[test]
    fn test_status_from_ci_terminal_results() {
        assert_eq!(
            status_from_ci(Some("http://ci/job/1"), false, Some(CiResult::NotBuilt)),
            ExecutionStatus::Unavailable
        );
        for result in [
            CiResult::Aborted,
            CiResult::Failure,
            CiResult::Success,
            CiResult::Unstable,
        ] {
            assert_eq!(
                status_from_ci(Some("http://ci/job/1"), false, Some(result)),
                ExecutionStatus::Done
            );
        }
    }

    #[test]
    fn test_execution_matches_job_by_either_key_half() {
        let execution = Execution {
            branch: "develop".to_string(),
            cycle_name: "day".to_string(),
            job_url: Some("http://ci/job/42/".to_string()),
            job_link: Some("ci/job/42".to_string()),
            release: String::new(),
            version: String::new(),
            build_date_time: None,
            version_date_time: None,
            test_date_time: None,
            status: ExecutionStatus::Running,
            ci_result: None,
            quality_status: QualityStatus::Incomplete,
            acceptance: Acceptance::New,
            blocking_validation: false,
            quality_thresholds: String::new(),
            quality_severities: String::new(),
            runs: vec![],
            country_deployments: vec![],
        };

        assert!(execution.matches_job(Some("http://ci/job/42/"), None));
        assert!(execution.matches_job(None, Some("ci/job/42")));
        assert!(execution.matches_job(Some("http://other/"), Some("ci/job/42")));
        assert!(!execution.matches_job(Some("http://other/"), None));
        assert!(!execution.matches_job(None, None));
    }
}
