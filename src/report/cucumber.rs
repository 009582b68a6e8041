//! Cucumber JSON report parsing.
//!
//! Reports are small enough to deserialize whole, so this path is plain
//! serde DTOs: features own elements, elements own steps and hooks. The
//! produced content blob uses the same `<line>:<status>:<step>` mini-format
//! as the Postman path, with real feature-file step lines and hooks at the
//! -100000/100000 sentinels.

use serde::Deserialize;

use crate::domain::{ExecutedScenario, ScenarioError};
use crate::error::{QualensError, Result};
use crate::report::{render_content, severity_of_tags, ContentRecord, StepStatus};

const BEFORE_HOOK_LINE: i64 = -100_000;
const AFTER_HOOK_LINE: i64 = 100_000;

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    line: u32,
    #[serde(default, rename = "type")]
    element_type: String,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    before: Vec<Hook>,
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    after: Vec<Hook>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Hook {
    #[serde(default)]
    result: Option<StepResult>,
    #[serde(default)]
    r#match: Option<Match>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    result: Option<StepResult>,
    #[serde(default)]
    r#match: Option<Match>,
}

#[derive(Debug, Deserialize)]
struct StepResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Match {
    #[serde(default)]
    location: Option<String>,
}

fn status_of(result: Option<&StepResult>) -> StepStatus {
    match result.map(|r| r.status.as_str()) {
        Some("passed") => StepStatus::Passed,
        Some("failed") => StepStatus::Failed,
        // skipped, pending, undefined: the step did not really run
        _ => StepStatus::Skipped,
    }
}

/// Parses a Cucumber JSON report into executed scenarios.
pub fn parse_cucumber_report(json: &str) -> Result<Vec<ExecutedScenario>> {
    let features: Vec<Feature> = serde_json::from_str(json).map_err(QualensError::Json)?;

    let mut scenarios = Vec::new();
    for feature in &features {
        for element in &feature.elements {
            // Backgrounds are folded into their scenario by the reporter
            if element.element_type == "background" {
                continue;
            }
            scenarios.push(build_scenario(feature, element));
        }
    }
    Ok(scenarios)
}

fn build_scenario(feature: &Feature, element: &Element) -> ExecutedScenario {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for hook in &element.before {
        records.push(hook_record(hook, BEFORE_HOOK_LINE, "Before hook"));
        collect_hook_error(hook, BEFORE_HOOK_LINE, "Before hook", &mut errors);
    }

    for step in &element.steps {
        let text = format!("{}{}", step.keyword, step.name);
        records.push(ContentRecord {
            line: i64::from(step.line),
            status: status_of(step.result.as_ref()),
            text: text.clone(),
        });

        if let Some(result) = &step.result {
            if result.status == "failed" {
                errors.push(ScenarioError {
                    step_line: i64::from(step.line),
                    step: text,
                    step_definition: step
                        .r#match
                        .as_ref()
                        .and_then(|m| m.location.clone())
                        .unwrap_or_default(),
                    exception: result.error_message.clone().unwrap_or_default(),
                });
            }
        }
    }

    for hook in &element.after {
        records.push(hook_record(hook, AFTER_HOOK_LINE, "After hook"));
        collect_hook_error(hook, AFTER_HOOK_LINE, "After hook", &mut errors);
    }

    let tag_names: Vec<&str> = element.tags.iter().map(|t| t.name.as_str()).collect();

    ExecutedScenario {
        id: element.id.clone(),
        name: element.name.clone(),
        tags: tag_names.join(" "),
        severity: severity_of_tags(tag_names.iter().copied()),
        feature_file: feature.uri.clone(),
        feature_name: feature.name.clone(),
        line: element.line,
        content: render_content(&records),
        start_date_time: None,
        http_requests_url: None,
        errors,
    }
}

fn hook_record(hook: &Hook, line: i64, label: &str) -> ContentRecord {
    let text = hook
        .r#match
        .as_ref()
        .and_then(|m| m.location.clone())
        .unwrap_or_else(|| label.to_string());
    ContentRecord {
        line,
        status: status_of(hook.result.as_ref()),
        text,
    }
}

fn collect_hook_error(hook: &Hook, line: i64, label: &str, errors: &mut Vec<ScenarioError>) {
    if let Some(result) = &hook.result {
        if result.status == "failed" {
            errors.push(ScenarioError {
                step_line: line,
                step: label.to_string(),
                step_definition: hook
                    .r#match
                    .as_ref()
                    .and_then(|m| m.location.clone())
                    .unwrap_or_default(),
                exception: result.error_message.clone().unwrap_or_default(),
            });
        }
    }
}
