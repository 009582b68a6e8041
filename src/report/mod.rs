mod cucumber;
pub mod postman;

pub use cucumber::parse_cucumber_report;

use std::fmt;

/// Outcome of one rendered step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// One `<line>:<status>:<step>` record of a scenario's content blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub line: i64,
    pub status: StepStatus,
    pub text: String,
}

/// Renders content records into the stored mini-format.
///
/// The blob is diffed by external consumers and must stay byte-stable:
/// newline-joined `<line>:<status>:<step>` records, multi-line step text
/// exploded into one record per physical line sharing the parent's line
/// number and status.
pub fn render_content(records: &[ContentRecord]) -> String {
    let mut out = Vec::new();
    for record in records {
        for physical_line in record.text.split('\n') {
            out.push(format!("{}:{}:{}", record.line, record.status, physical_line));
        }
    }
    out.join("\n")
}

/// Severity tag marker carried in scenario/folder names and tags.
pub const SEVERITY_TAG_PREFIX: &str = "@severity-";

/// Extracts the severity code of a `@severity-<code>` tag list entry; the
/// last tag wins when several are present.
pub fn severity_of_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> String {
    let mut last = None;
    for tag in tags {
        if let Some(code) = tag.strip_prefix(SEVERITY_TAG_PREFIX) {
            last = Some(code);
        }
    }
    last.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_content_single_records() {
        let records = vec![
            ContentRecord {
                line: -1,
                status: StepStatus::Passed,
                text: "GET https://example.com".to_string(),
            },
            ContentRecord {
                line: 0,
                status: StepStatus::Failed,
                text: "Status code is 200".to_string(),
            },
        ];

        assert_eq!(
            render_content(&records),
            "-1:passed:GET https://example.com\n0:failed:Status code is 200"
        );
    }

    #[test]
    fn test_render_content_explodes_multiline_text() {
        let records = vec![ContentRecord {
            line: -1,
            status: StepStatus::Passed,
            text: "POST https://example.com (in 12 ms)\nCreates one item".to_string(),
        }];

        assert_eq!(
            render_content(&records),
            "-1:passed:POST https://example.com (in 12 ms)\n-1:passed:Creates one item"
        );
    }

    #[test]
    fn test_severity_of_tags_last_wins() {
        assert_eq!(
            severity_of_tags(["@severity-medium", "@severity-high"]),
            "high"
        );
        assert_eq!(severity_of_tags(["@country-be"]), "");
        assert_eq!(severity_of_tags([]), "");
    }
}
