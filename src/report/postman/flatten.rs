//! Collection-tree flattening.
//!
//! Walks the nested folder/request tree depth-first with an explicit
//! accumulator (line counter, inherited severity, path so far) and returns
//! a flat scenario list, so no mutable state is shared across branches.

use super::parse::{Collection, CollectionItem};
use super::scanner::extract_assertion_names;
use crate::report::SEVERITY_TAG_PREFIX;

/// Sentinel country scope matching every run.
pub const ALL_COUNTRIES: &str = "all";

/// One request leaf flattened out of the collection tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatScenario {
    pub item_id: Option<String>,
    /// `▶`-joined ancestor folder names plus the request name, severity
    /// tags stripped
    pub name: String,
    /// Deepest severity tag on the path, empty when untagged
    pub severity: String,
    /// Running counter, incremented once per leaf in visit order
    pub line: u32,
    /// "all" or a normalized comma-separated country code list
    pub country_scope: String,
    /// Assertion names recovered from the test script, in source order
    pub assertions: Vec<String>,
    pub has_pre_request: bool,
    pub has_test_script: bool,
    pub request_method: String,
    pub request_url: String,
    pub request_description: Option<String>,
}

/// Flattens a collection into scenarios.
///
/// `country_root_folders` enables deriving each scenario's country scope
/// from its top-level folder name; otherwise every scope is "all".
pub fn flatten_collection(collection: &Collection, country_root_folders: bool) -> Vec<FlatScenario> {
    let mut scenarios = Vec::new();
    let mut counter = 0u32;

    walk(
        &collection.item,
        &Context {
            path: String::new(),
            severity: String::new(),
            country_scope: ALL_COUNTRIES.to_string(),
            root: true,
            country_root_folders,
        },
        &mut counter,
        &mut scenarios,
    );

    scenarios
}

struct Context {
    path: String,
    severity: String,
    country_scope: String,
    root: bool,
    country_root_folders: bool,
}

fn walk(items: &[CollectionItem], ctx: &Context, counter: &mut u32, out: &mut Vec<FlatScenario>) {
    for item in items {
        let (clean_name, own_severity) = split_severity(&item.name);
        // A closer tag overrides whatever a parent folder declared
        let severity = own_severity.unwrap_or_else(|| ctx.severity.clone());

        if item.is_folder() {
            let country_scope = if ctx.root && ctx.country_root_folders {
                extract_country_codes(&clean_name)
            } else {
                ctx.country_scope.clone()
            };

            walk(
                &item.item,
                &Context {
                    path: join_path(&ctx.path, &clean_name),
                    severity,
                    country_scope,
                    root: false,
                    country_root_folders: ctx.country_root_folders,
                },
                counter,
                out,
            );
            continue;
        }

        *counter += 1;

        let request = item.request.as_ref();
        out.push(FlatScenario {
            item_id: item.id.clone(),
            name: join_path(&ctx.path, &clean_name),
            severity,
            line: *counter,
            country_scope: ctx.country_scope.clone(),
            assertions: item
                .script_for("test")
                .map(|script| extract_assertion_names(&script))
                .unwrap_or_default(),
            has_pre_request: item.script_for("prerequest").is_some(),
            has_test_script: item.script_for("test").is_some(),
            request_method: request.map(|r| r.method.clone()).unwrap_or_default(),
            request_url: request
                .and_then(|r| r.url.as_ref())
                .map(|u| u.display())
                .unwrap_or_default(),
            request_description: request
                .and_then(|r| r.description.as_ref())
                .map(|d| d.text().to_string()),
        });
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path} \u{25b6} {name}")
    }
}

/// Splits a `@severity-<code>` marker out of an item name.
fn split_severity(name: &str) -> (String, Option<String>) {
    let mut severity = None;
    let clean: Vec<&str> = name
        .split_whitespace()
        .filter(|word| match word.strip_prefix(SEVERITY_TAG_PREFIX) {
            Some(code) => {
                severity = Some(code.to_string());
                false
            }
            None => true,
        })
        .collect();
    (clean.join(" "), severity)
}

/// Normalizes a `+`-delimited country code list from a root folder name.
///
/// Codes are trimmed, lowercased, de-duplicated and sorted; empties are
/// dropped. An empty list or the "all" sentinel means every country.
pub fn extract_country_codes(name: &str) -> String {
    let mut codes: Vec<String> = name
        .split('+')
        .map(|code| code.trim().to_lowercase())
        .filter(|code| !code.is_empty())
        .collect();

    if codes.is_empty() || codes.iter().any(|code| code == ALL_COUNTRIES) {
        return ALL_COUNTRIES.to_string();
    }

    codes.sort();
    codes.dedup();
    codes.join(",")
}

/// True when a scenario's country scope covers the given country code.
pub fn scope_covers(scope: &str, country_code: &str) -> bool {
    scope == ALL_COUNTRIES || scope.split(',').any(|code| code == country_code)
}
