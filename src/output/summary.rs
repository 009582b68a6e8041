use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright, cyan, dim};
use super::tables::{color_coded_percent_cell, create_table, quality_status_cell};
use crate::discovery::DiscoveryReport;
use crate::domain::{Execution, QualityThreshold};
use crate::quality::{parse_thresholds, SeverityQuality};

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Prints the outcome counts of one discovery round.
pub fn print_discovery_summary(report: &DiscoveryReport) {
    println!(
        "{} {} indexed, {} already done, {} failed (will retry)",
        bright("Discovery:"),
        report.indexed,
        report.already_done,
        report.failed
    );
}

/// Prints a color-coded per-severity quality table for one execution.
///
/// Rows come from the breakdown stored on the execution; an execution
/// crawled before completion simply has none yet.
pub fn print_quality_summary(execution: &Execution) {
    let job = execution
        .job_url
        .as_deref()
        .or(execution.job_link.as_deref())
        .unwrap_or("<unknown job>");

    println!(
        "{} {} ({}/{})",
        bright("Execution:"),
        cyan(job),
        execution.branch,
        execution.cycle_name
    );

    let breakdown: Vec<SeverityQuality> =
        serde_json::from_str(&execution.quality_severities).unwrap_or_default();
    if breakdown.is_empty() {
        println!("{}", dim("No quality breakdown computed yet."));
        return;
    }

    let thresholds = parse_thresholds(&execution.quality_thresholds).unwrap_or_default();

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Severity",
        "Scenarios",
        "Passed",
        "Failed",
        "Quality",
        "Status",
    ]));

    for slice in &breakdown {
        let threshold = thresholds
            .get(&slice.severity_code)
            .copied()
            .unwrap_or(QualityThreshold {
                failure: 0,
                warning: 0,
            });

        table.add_row(vec![
            Cell::new(&slice.severity_code),
            Cell::new(slice.total),
            Cell::new(slice.passed),
            Cell::new(slice.failed),
            color_coded_percent_cell(slice.percent, threshold.warning, threshold.failure),
            quality_status_cell(slice.status),
        ]);
    }

    println!("{table}");
}
