//! Quality classification of a completed execution.
//!
//! Aggregates scenario outcomes per severity across the threshold-included
//! runs and classifies each severity against its configured failure/warning
//! percentages. The overall verdict is the worst per-severity verdict, with
//! INCOMPLETE dominating everything.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Execution, ExecutionStatus, QualityStatus, QualityThreshold, QualityThresholds, Run, Severity,
    ALL_SEVERITIES,
};
use crate::error::{QualensError, Result};

/// One severity's slice of the quality breakdown, serialized onto the
/// execution next to the scalar verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityQuality {
    pub severity_code: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub percent: u8,
    pub status: QualityStatus,
}

/// Parses a serialized threshold map; `None` when the blob is malformed.
///
/// A bad blob is a degraded state, not an error: the execution classifies
/// as INCOMPLETE instead of raising.
pub fn parse_thresholds(blob: &str) -> Option<QualityThresholds> {
    if blob.is_empty() {
        return None;
    }
    match serde_json::from_str(blob) {
        Ok(thresholds) => Some(thresholds),
        Err(e) => {
            warn!("Unparseable quality thresholds, degrading to INCOMPLETE: {e}");
            None
        }
    }
}

/// The severities an execution is judged on.
///
/// All known severities, unless every threshold-included run carries an
/// explicit non-"all" severity filter; then only the union of the tagged
/// severities is active, ordered by configured position. An unrecognized
/// code in a tag is a configuration error.
pub fn active_severities<'a>(
    execution: &Execution,
    known: &'a [Severity],
) -> Result<Vec<&'a Severity>> {
    let runs: Vec<&Run> = execution.threshold_runs().collect();

    let all_tagged = !runs.is_empty()
        && runs.iter().all(|run| {
            !run.severity_tags.is_empty()
                && run
                    .severity_tags
                    .split(',')
                    .all(|tag| tag != ALL_SEVERITIES)
        });

    let mut active: Vec<&Severity> = if all_tagged {
        let mut codes: Vec<&str> = runs
            .iter()
            .flat_map(|run| run.severity_tags.split(','))
            .filter(|code| !code.is_empty())
            .collect();
        codes.sort_unstable();
        codes.dedup();

        codes
            .into_iter()
            .map(|code| {
                known.iter().find(|s| s.code == code).ok_or_else(|| {
                    QualensError::Config(format!("Unknown severity code in run tags: {code}"))
                })
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        known.iter().collect()
    };

    active.sort_by_key(|s| s.position);
    Ok(active)
}

/// Every threshold-included run is DONE and produced at least one scenario.
pub fn is_complete(execution: &Execution) -> bool {
    execution
        .threshold_runs()
        .all(|run| run.status == ExecutionStatus::Done && run.has_scenarios())
}

/// Whether a scenario counts toward the given severity.
///
/// A scenario's severity is its own tag, or the evaluated severity when
/// that one absorbs untagged scenarios.
fn counts_for(scenario_severity: &str, severity: &Severity) -> bool {
    scenario_severity == severity.code
        || (severity.default_on_missing && scenario_severity.is_empty())
}

/// Quality percentage: floor(100 × passed / total), with 100 requiring
/// every scenario passed. An empty slice is vacuously at 100.
fn percentage(passed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    // Integer division floors, so 199/200 yields 99, never 100
    (passed * 100 / total) as u8
}

fn classify(percent: u8, threshold: Option<&QualityThreshold>, complete: bool) -> QualityStatus {
    let Some(threshold) = threshold else {
        return QualityStatus::Incomplete;
    };
    if !complete {
        return QualityStatus::Incomplete;
    }
    if percent < threshold.failure {
        QualityStatus::Failed
    } else if percent < threshold.warning {
        QualityStatus::Warning
    } else {
        QualityStatus::Passed
    }
}

/// Computes one severity's quality slice. `severity` is `None` for the
/// "all" wildcard entry counting every scenario.
pub fn compute_quality_of_severity(
    execution: &Execution,
    severity: Option<&Severity>,
    thresholds: &QualityThresholds,
) -> SeverityQuality {
    let mut total = 0usize;
    let mut passed = 0usize;

    for run in execution.threshold_runs() {
        if run.status != ExecutionStatus::Done {
            continue;
        }
        for scenario in &run.executed_scenarios {
            let counted = match severity {
                Some(severity) => counts_for(&scenario.severity, severity),
                None => true,
            };
            if counted {
                total += 1;
                if !scenario.has_failed() {
                    passed += 1;
                }
            }
        }
    }

    let code = severity.map_or(ALL_SEVERITIES, |s| s.code.as_str());
    let percent = percentage(passed, total);

    SeverityQuality {
        severity_code: code.to_string(),
        total,
        passed,
        failed: total - passed,
        percent,
        status: classify(percent, thresholds.get(code), is_complete(execution)),
    }
}

/// Computes and stores the execution's quality breakdown and scalar
/// verdict.
pub fn compute_quality(execution: &mut Execution, known_severities: &[Severity]) -> Result<()> {
    let Some(thresholds) = parse_thresholds(&execution.quality_thresholds) else {
        execution.quality_status = QualityStatus::Incomplete;
        execution.quality_severities = String::new();
        return Ok(());
    };

    let active = active_severities(execution, known_severities)?;

    let mut breakdown = vec![compute_quality_of_severity(execution, None, &thresholds)];
    for severity in active {
        breakdown.push(compute_quality_of_severity(
            execution,
            Some(severity),
            &thresholds,
        ));
    }

    execution.quality_status = breakdown
        .iter()
        .fold(QualityStatus::Passed, |acc, s| acc.worst(s.status));
    execution.quality_severities = serde_json::to_string(&breakdown)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Acceptance, Country, ExecutedScenario, ScenarioError, Technology, TestType,
    };

    fn severity(code: &str, position: u32, default_on_missing: bool) -> Severity {
        Severity {
            code: code.to_string(),
            name: code.to_string(),
            position,
            default_on_missing,
        }
    }

    fn scenario(severity: &str, failed: bool) -> ExecutedScenario {
        ExecutedScenario {
            id: None,
            name: "s".to_string(),
            tags: String::new(),
            severity: severity.to_string(),
            feature_file: String::new(),
            feature_name: String::new(),
            line: 1,
            content: String::new(),
            start_date_time: None,
            http_requests_url: None,
            errors: if failed {
                vec![ScenarioError {
                    step_line: 0,
                    step: "step".to_string(),
                    step_definition: String::new(),
                    exception: "boom".to_string(),
                }]
            } else {
                vec![]
            },
        }
    }

    fn run(severity_tags: &str, scenarios: Vec<ExecutedScenario>) -> Run {
        Run {
            country: Country {
                code: "fr".to_string(),
                name: "France".to_string(),
            },
            test_type: TestType {
                code: "api".to_string(),
                name: "API".to_string(),
                technology: Technology::Postman,
                browser: false,
            },
            platform: "integration".to_string(),
            country_tags: "all".to_string(),
            severity_tags: severity_tags.to_string(),
            include_in_thresholds: true,
            status: ExecutionStatus::Done,
            ci_result: None,
            job_url: Some("http://ci/run/1/".to_string()),
            job_link: None,
            executed_scenarios: scenarios,
        }
    }

    fn execution(runs: Vec<Run>, thresholds: &str) -> Execution {
        Execution {
            branch: "develop".to_string(),
            cycle_name: "day".to_string(),
            job_url: Some("http://ci/job/1/".to_string()),
            job_link: None,
            release: String::new(),
            version: String::new(),
            build_date_time: None,
            version_date_time: None,
            test_date_time: None,
            status: ExecutionStatus::Done,
            ci_result: None,
            quality_status: QualityStatus::Incomplete,
            acceptance: Acceptance::New,
            blocking_validation: false,
            quality_thresholds: thresholds.to_string(),
            quality_severities: String::new(),
            runs,
            country_deployments: vec![],
        }
    }

    const THRESHOLDS: &str = r#"{"all": {"failure": 90, "warning": 95}, "high": {"failure": 100, "warning": 100}}"#;

    #[test]
    fn test_percentage_truncates_never_rounds_up() {
        assert_eq!(percentage(199, 200), 99);
        assert_eq!(percentage(200, 200), 100);
        assert_eq!(percentage(0, 3), 0);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn test_active_severities_all_known_when_a_run_is_untagged() {
        let known = vec![severity("high", 1, false), severity("medium", 2, true)];
        let execution = execution(vec![run("all", vec![]), run("high", vec![])], THRESHOLDS);

        let active = active_severities(&execution, &known).unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_active_severities_union_ordered_by_position() {
        // "2" is configured before "1": activation order follows position,
        // not lexical code order
        let known = vec![severity("2", 1, false), severity("1", 2, false)];
        let execution = execution(vec![run("1", vec![]), run("2", vec![])], THRESHOLDS);

        let active = active_severities(&execution, &known).unwrap();
        let codes: Vec<&str> = active.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["2", "1"]);
    }

    #[test]
    fn test_active_severities_unknown_code_is_config_error() {
        let known = vec![severity("high", 1, false)];
        let execution = execution(vec![run("nope", vec![])], THRESHOLDS);

        let result = active_severities(&execution, &known);
        assert!(matches!(result, Err(QualensError::Config(_))));
    }

    #[test]
    fn test_default_on_missing_absorbs_untagged_scenarios() {
        let medium = severity("medium", 2, true);
        let execution = execution(
            vec![run("all", vec![scenario("", false), scenario("high", false)])],
            THRESHOLDS,
        );

        let thresholds = parse_thresholds(THRESHOLDS).unwrap();
        let slice = compute_quality_of_severity(&execution, Some(&medium), &thresholds);

        assert_eq!(slice.total, 1);
    }

    #[test]
    fn test_compute_quality_passed_when_all_pass() {
        let known = vec![severity("high", 1, false)];
        let mut execution = execution(
            vec![run("all", vec![scenario("high", false), scenario("high", false)])],
            THRESHOLDS,
        );

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Passed);
        let breakdown: Vec<SeverityQuality> =
            serde_json::from_str(&execution.quality_severities).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].severity_code, "all");
        assert_eq!(breakdown[1].severity_code, "high");
        assert_eq!(breakdown[1].percent, 100);
    }

    #[test]
    fn test_compute_quality_worst_severity_wins() {
        let known = vec![severity("high", 1, false)];
        // 1 of 2 high scenarios failed: 50% < failure threshold of 100
        let mut execution = execution(
            vec![run("all", vec![scenario("high", true), scenario("high", false)])],
            THRESHOLDS,
        );

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Failed);
    }

    #[test]
    fn test_missing_threshold_for_severity_is_incomplete() {
        let known = vec![severity("untracked", 1, false)];
        let mut execution = execution(
            vec![run("all", vec![scenario("untracked", false)])],
            r#"{"all": {"failure": 90, "warning": 95}}"#,
        );

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Incomplete);
    }

    #[test]
    fn test_unparseable_thresholds_blob_is_incomplete() {
        let known = vec![severity("high", 1, false)];
        let mut execution = execution(vec![run("all", vec![scenario("high", false)])], "{broken");

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Incomplete);
    }

    #[test]
    fn test_incomplete_when_a_threshold_run_is_not_done() {
        let known = vec![severity("high", 1, false)];
        let mut runs = vec![run("all", vec![scenario("high", false)])];
        runs.push({
            let mut r = run("all", vec![scenario("high", false)]);
            r.status = ExecutionStatus::Running;
            r
        });
        let mut execution = execution(runs, THRESHOLDS);

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Incomplete);
    }

    #[test]
    fn test_incomplete_when_a_threshold_run_has_no_scenarios() {
        let known = vec![severity("high", 1, false)];
        let mut execution = execution(vec![run("all", vec![])], THRESHOLDS);

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Incomplete);
    }

    #[test]
    fn test_warning_band() {
        let known = vec![severity("medium", 1, false)];
        // 92% sits between failure (90) and warning (95) on the "all" entry
        let scenarios: Vec<ExecutedScenario> = (0..25)
            .map(|i| scenario("medium", i < 2))
            .collect();
        let mut execution = execution(
            vec![run("all", scenarios)],
            r#"{"all": {"failure": 90, "warning": 95}, "medium": {"failure": 50, "warning": 60}}"#,
        );

        compute_quality(&mut execution, &known).unwrap();

        assert_eq!(execution.quality_status, QualityStatus::Warning);
    }
}
