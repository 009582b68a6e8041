//! Postman/Newman report indexing.
//!
//! Pipeline: streaming parse, collection-tree flattening, assertion
//! recovery, execution/failure correlation by item id, content rendering
//! and HTTP-log upload for failed scenarios.

mod content;
mod flatten;
mod http_log;
mod parse;
mod scanner;

pub use flatten::{extract_country_codes, scope_covers, FlatScenario};
pub use parse::{parse_newman, NewmanReport};

use std::collections::HashMap;
use std::io::Read;

use log::warn;

use crate::domain::ExecutedScenario;
use crate::error::Result;
use crate::report::{render_content, SEVERITY_TAG_PREFIX};
use crate::store::AssetStore;
use content::{build_content_records, build_errors};
use http_log::render_http_log;
use parse::{NewmanExecution, NewmanFailure};

/// Parses a Newman report into the scenarios visible to one run.
///
/// Scenarios outside `run_country`'s scope are dropped. HTTP logs are
/// generated and uploaded only for failing scenarios; every spilled
/// response body is released before returning, whatever happened.
pub async fn index_newman_report(
    reader: impl Read,
    run_country: &str,
    country_root_folders: bool,
    log_prefix: &str,
    assets: &dyn AssetStore,
) -> Result<Vec<ExecutedScenario>> {
    let report = parse_newman(reader)?;
    let flats = flatten::flatten_collection(&report.collection, country_root_folders);

    let executions_by_id: HashMap<&str, &NewmanExecution> = report
        .executions
        .iter()
        .filter_map(|e| e.item_id.as_deref().map(|id| (id, e)))
        .collect();

    let mut failures_by_id: HashMap<&str, Vec<&NewmanFailure>> = HashMap::new();
    for failure in &report.failures {
        if let Some(id) = failure.source_id() {
            failures_by_id.entry(id).or_default().push(failure);
        }
    }

    let feature_name = report.collection.info.name.clone();
    let feature_file = if feature_name.is_empty() {
        String::new()
    } else {
        format!("{feature_name}.postman_collection.json")
    };

    let mut scenarios = Vec::new();
    for flat in flats
        .iter()
        .filter(|f| scope_covers(&f.country_scope, run_country))
    {
        // Exact-id matches only; a scenario the run never reached keeps
        // empty execution/failure data and is rendered skipped
        let execution = flat
            .item_id
            .as_deref()
            .and_then(|id| executions_by_id.get(id).copied());
        let failures: Vec<&NewmanFailure> = flat
            .item_id
            .as_deref()
            .and_then(|id| failures_by_id.get(id))
            .cloned()
            .unwrap_or_default();

        let records = build_content_records(flat, execution, &failures, execution.is_none());
        let errors = build_errors(&records, &failures);

        let mut http_requests_url = None;
        if !errors.is_empty() {
            if let Some(execution) = execution {
                let html = render_http_log(execution);
                let name = format!("{log_prefix}-{}.html", flat.line);
                match assets.upload_http_log(&name, &html).await {
                    Ok(url) => http_requests_url = Some(url),
                    Err(e) => warn!("HTTP log upload failed for {}: {e}", flat.name),
                }
            }
        }

        let tags = if flat.severity.is_empty() {
            String::new()
        } else {
            format!("{SEVERITY_TAG_PREFIX}{}", flat.severity)
        };

        scenarios.push(ExecutedScenario {
            id: flat.item_id.clone(),
            name: flat.name.clone(),
            tags,
            severity: flat.severity.clone(),
            feature_file: feature_file.clone(),
            feature_name: feature_name.clone(),
            line: flat.line,
            content: render_content(&records),
            start_date_time: None,
            http_requests_url,
            errors,
        });
    }

    // Spill files are released eagerly now that logs are uploaded; drop
    // would get them too, but not before the caller moves on
    for execution in report.executions {
        if let Some(body) = execution.response.and_then(|r| r.body) {
            let _ = body.discard();
        }
    }

    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeAssets {
        uploads: Mutex<Vec<String>>,
    }

    impl FakeAssets {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl AssetStore for FakeAssets {
        async fn upload_http_log(&self, name: &str, _html: &str) -> Result<String> {
            self.uploads.lock().unwrap().push(name.to_string());
            Ok(format!("assets/{name}"))
        }
    }

    const REPORT: &str = r#"{
        "collection": {
            "info": {"name": "Orders"},
            "item": [
                {
                    "name": "BE",
                    "item": [
                        {
                            "id": "req-1",
                            "name": "Create order @severity-high",
                            "request": {
                                "method": "POST",
                                "url": {"raw": "https://api.example.com/orders"},
                                "description": "Creates one order"
                            },
                            "event": [
                                {"listen": "prerequest", "script": {"exec": ["pm.environment.set(\"a\", 1);"]}},
                                {"listen": "test", "script": {"exec": ["pm.test(\"Status is 201\", function () {});"]}}
                            ]
                        }
                    ]
                }
            ]
        },
        "run": {
            "executions": [
                {
                    "item": {"id": "req-1"},
                    "request": {"method": "POST", "url": {"raw": "https://api.example.com/orders"}},
                    "response": {"code": 500, "status": "Internal Server Error", "responseTime": 321,
                                 "stream": {"type": "Buffer", "data": [123, 125]}}
                }
            ],
            "failures": [
                {
                    "error": {"name": "AssertionError", "index": 0, "message": "expected 201 but got 500"},
                    "at": "assertion:0 in test-script",
                    "source": {"id": "req-1"}
                }
            ]
        }
    }"#;

    #[tokio::test]
    async fn test_end_to_end_newman_report() {
        let assets = FakeAssets::new();

        let scenarios = index_newman_report(REPORT.as_bytes(), "be", true, "be-api", &assets)
            .await
            .unwrap();

        assert_eq!(scenarios.len(), 1);
        let scenario = &scenarios[0];

        assert_eq!(scenario.name, "BE \u{25b6} Create order");
        assert_eq!(scenario.severity, "high");
        assert_eq!(scenario.tags, "@severity-high");
        assert_eq!(scenario.line, 1);
        assert_eq!(scenario.feature_name, "Orders");

        let lines: Vec<&str> = scenario.content.split('\n').collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "-100000:passed:Pre-request script");
        assert_eq!(
            lines[1],
            "-1:passed:POST https://api.example.com/orders (in 321 ms)"
        );
        assert_eq!(lines[2], "-1:passed:Creates one order");
        assert_eq!(lines[3], "0:failed:Status is 201");
        assert_eq!(lines[4], "100000:passed:Test script");

        assert_eq!(scenario.errors.len(), 1);
        assert_eq!(scenario.errors[0].exception, "expected 201 but got 500");
        assert_eq!(
            scenario.http_requests_url.as_deref(),
            Some("assets/be-api-1.html")
        );
        assert_eq!(*assets.uploads.lock().unwrap(), vec!["be-api-1.html"]);
    }

    #[tokio::test]
    async fn test_scenarios_outside_country_scope_are_dropped() {
        let assets = FakeAssets::new();

        let scenarios = index_newman_report(REPORT.as_bytes(), "us", true, "us-api", &assets)
            .await
            .unwrap();

        assert!(scenarios.is_empty());
    }

    #[tokio::test]
    async fn test_unreached_scenario_is_rendered_skipped() {
        let report = r#"{
            "collection": {
                "info": {"name": "Orders"},
                "item": [
                    {"id": "req-9", "name": "Never ran", "request": {"method": "GET", "url": {"raw": "https://x"}}}
                ]
            },
            "run": {"executions": [], "failures": []}
        }"#;
        let assets = FakeAssets::new();

        let scenarios = index_newman_report(report.as_bytes(), "be", false, "p", &assets)
            .await
            .unwrap();

        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].content, "-1:skipped:GET https://x");
        assert!(scenarios[0].errors.is_empty());
    }
}
