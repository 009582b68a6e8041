//! Scenario content records for the Postman path.
//!
//! Line number conventions inside one scenario's content blob:
//! -100000 is the pre-request script, -1 the HTTP request itself, 0..N the
//! Nth assertion in source order, 100000 the test script.

use super::flatten::FlatScenario;
use super::parse::{NewmanExecution, NewmanFailure};
use crate::domain::ScenarioError;
use crate::report::{ContentRecord, StepStatus};

pub const PRE_REQUEST_LINE: i64 = -100_000;
pub const REQUEST_LINE: i64 = -1;
pub const TEST_SCRIPT_LINE: i64 = 100_000;

pub const PRE_REQUEST_STEP: &str = "Pre-request script";
pub const TEST_SCRIPT_STEP: &str = "Test script";

/// Resolves the content line a failure points at.
///
/// Assertion failures carry an index; script-level failures only say where
/// they happened.
pub fn resolve_failure_line(failure: &NewmanFailure) -> i64 {
    if let Some(index) = failure.error.index {
        return index;
    }
    match failure.at.as_deref() {
        Some(at) if at.contains("prerequest") => PRE_REQUEST_LINE,
        Some(at) if at.contains("test") => TEST_SCRIPT_LINE,
        _ => REQUEST_LINE,
    }
}

/// Builds the ordered content records of one flattened scenario.
///
/// `force_skipped` marks every record skipped regardless of failures; it is
/// applied to scenarios the run never reached.
pub fn build_content_records(
    scenario: &FlatScenario,
    execution: Option<&NewmanExecution>,
    failures: &[&NewmanFailure],
    force_skipped: bool,
) -> Vec<ContentRecord> {
    let failed_lines: Vec<i64> = failures.iter().map(|f| resolve_failure_line(f)).collect();

    let status_of = |line: i64| {
        if force_skipped {
            StepStatus::Skipped
        } else if failed_lines.contains(&line) {
            StepStatus::Failed
        } else {
            StepStatus::Passed
        }
    };

    let mut records = Vec::new();

    if scenario.has_pre_request {
        records.push(ContentRecord {
            line: PRE_REQUEST_LINE,
            status: status_of(PRE_REQUEST_LINE),
            text: PRE_REQUEST_STEP.to_string(),
        });
    }

    records.push(ContentRecord {
        line: REQUEST_LINE,
        status: status_of(REQUEST_LINE),
        text: request_text(scenario, execution),
    });

    for (index, assertion) in scenario.assertions.iter().enumerate() {
        let line = index as i64;
        records.push(ContentRecord {
            line,
            status: status_of(line),
            text: assertion.clone(),
        });
    }

    if scenario.has_test_script {
        records.push(ContentRecord {
            line: TEST_SCRIPT_LINE,
            status: status_of(TEST_SCRIPT_LINE),
            text: TEST_SCRIPT_STEP.to_string(),
        });
    }

    records
}

/// The request record text: method and URL (preferring what actually ran
/// over the collection declaration), response time annotated on the first
/// physical line only, description lines following.
fn request_text(scenario: &FlatScenario, execution: Option<&NewmanExecution>) -> String {
    let (method, url) = match execution.and_then(|e| e.request.as_ref()) {
        Some(request) => (
            request.method.clone(),
            request
                .url
                .as_ref()
                .map(|u| u.display())
                .unwrap_or_else(|| scenario.request_url.clone()),
        ),
        None => (scenario.request_method.clone(), scenario.request_url.clone()),
    };

    let mut first_line = format!("{method} {url}").trim().to_string();
    if let Some(time) = execution
        .and_then(|e| e.response.as_ref())
        .and_then(|r| r.response_time)
    {
        first_line.push_str(&format!(" (in {time} ms)"));
    }

    match scenario.request_description.as_deref() {
        Some(description) if !description.is_empty() => format!("{first_line}\n{description}"),
        _ => first_line,
    }
}

/// Turns matched failures into scenario errors anchored at their content
/// lines.
pub fn build_errors(records: &[ContentRecord], failures: &[&NewmanFailure]) -> Vec<ScenarioError> {
    failures
        .iter()
        .map(|failure| {
            let line = resolve_failure_line(failure);
            let step = records
                .iter()
                .find(|r| r.line == line)
                .map(|r| first_physical_line(&r.text))
                .unwrap_or_else(|| failure.at.clone().unwrap_or_default());

            ScenarioError {
                step_line: line,
                step,
                step_definition: failure.error.name.clone(),
                exception: failure
                    .error
                    .stack
                    .clone()
                    .unwrap_or_else(|| failure.error.message.clone()),
            }
        })
        .collect()
}

fn first_physical_line(text: &str) -> String {
    text.split('\n').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> FlatScenario {
        FlatScenario {
            item_id: Some("req-1".to_string()),
            name: "BE \u{25b6} Create order".to_string(),
            severity: "high".to_string(),
            line: 1,
            country_scope: "be".to_string(),
            assertions: vec!["Status is 201".to_string()],
            has_pre_request: true,
            has_test_script: true,
            request_method: "POST".to_string(),
            request_url: "https://api.example.com/orders".to_string(),
            request_description: None,
        }
    }

    fn assertion_failure(index: i64) -> NewmanFailure {
        let json = format!(
            r#"{{"error": {{"name": "AssertionError", "index": {index}, "message": "boom"}}, "at": "assertion:{index} in test-script", "source": {{"id": "req-1"}}}}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_records_in_line_order_with_conventional_lines() {
        let records = build_content_records(&scenario(), None, &[], false);

        assert_eq!(
            records.iter().map(|r| r.line).collect::<Vec<_>>(),
            vec![PRE_REQUEST_LINE, REQUEST_LINE, 0, TEST_SCRIPT_LINE]
        );
        assert_eq!(records[0].text, PRE_REQUEST_STEP);
        assert_eq!(records[3].text, TEST_SCRIPT_STEP);
    }

    #[test]
    fn test_failed_assertion_marks_only_its_record() {
        let failure = assertion_failure(0);
        let records = build_content_records(&scenario(), None, &[&failure], false);

        assert_eq!(records[2].line, 0);
        assert_eq!(records[2].status, StepStatus::Failed);
        assert!(records
            .iter()
            .filter(|r| r.line != 0)
            .all(|r| r.status == StepStatus::Passed));
    }

    #[test]
    fn test_force_skipped_overrides_everything() {
        let failure = assertion_failure(0);
        let records = build_content_records(&scenario(), None, &[&failure], true);

        assert!(records.iter().all(|r| r.status == StepStatus::Skipped));
    }

    #[test]
    fn test_resolve_failure_line_without_index() {
        let script_failure: NewmanFailure = serde_json::from_str(
            r#"{"error": {"name": "TypeError", "message": "x"}, "at": "test-script"}"#,
        )
        .unwrap();
        assert_eq!(resolve_failure_line(&script_failure), TEST_SCRIPT_LINE);

        let prerequest_failure: NewmanFailure = serde_json::from_str(
            r#"{"error": {"name": "TypeError", "message": "x"}, "at": "prerequest-script"}"#,
        )
        .unwrap();
        assert_eq!(resolve_failure_line(&prerequest_failure), PRE_REQUEST_LINE);

        let request_failure: NewmanFailure =
            serde_json::from_str(r#"{"error": {"name": "Error", "message": "x"}}"#).unwrap();
        assert_eq!(resolve_failure_line(&request_failure), REQUEST_LINE);
    }

    #[test]
    fn test_build_errors_anchor_step_text() {
        let failure = assertion_failure(0);
        let records = build_content_records(&scenario(), None, &[&failure], false);
        let errors = build_errors(&records, &[&failure]);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].step_line, 0);
        assert_eq!(errors[0].step, "Status is 201");
        assert_eq!(errors[0].step_definition, "AssertionError");
        assert_eq!(errors[0].exception, "boom");
    }

    #[test]
    fn test_request_text_with_description_and_response_time() {
        let mut s = scenario();
        s.request_description = Some("Creates one order".to_string());

        let execution: NewmanExecution = serde_json::from_str(
            r#"{"item": {"id": "req-1"},
                "request": {"method": "POST", "url": {"raw": "https://api.example.com/orders"}},
                "response": {"code": 500, "responseTime": 321}}"#,
        )
        .unwrap();

        let records = build_content_records(&s, Some(&execution), &[], false);
        let request = &records[1];

        // Annotation only on the first physical line
        assert_eq!(
            request.text,
            "POST https://api.example.com/orders (in 321 ms)\nCreates one order"
        );
    }
}
