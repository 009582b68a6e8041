use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::domain::QualityStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn quality_status_cell(status: QualityStatus) -> Cell {
    match status {
        QualityStatus::Passed => Cell::new("PASSED").fg(TableColor::Green),
        QualityStatus::Warning => Cell::new("WARNING").fg(TableColor::Yellow),
        QualityStatus::Failed => Cell::new("FAILED").fg(TableColor::Red),
        QualityStatus::Incomplete => Cell::new("INCOMPLETE").fg(TableColor::Grey),
    }
}

pub fn color_coded_percent_cell(percent: u8, warning: u8, failure: u8) -> Cell {
    let text = format!("{percent}%");
    if percent >= warning {
        Cell::new(text).fg(TableColor::Green)
    } else if percent >= failure {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}
