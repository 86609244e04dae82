use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, Table};

use oxcrypt_sanitizer::reconstruct::ExportSummary;
use oxcrypt_sanitizer::{ProblemSet, Severity};

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Problem counts per severity, most severe first.
pub fn severity_table(problems: &ProblemSet) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Severity", "Count"]);
    for severity in Severity::ALL {
        table.add_row(vec![severity.as_str().to_string(), problems.count(severity).to_string()]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

/// What a reconstruction wrote.
pub fn export_table(summary: &ExportSummary) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Exported", "Count"]);
    table.add_row(vec!["Directories".to_string(), summary.directories.to_string()]);
    table.add_row(vec!["Files".to_string(), summary.files.to_string()]);
    table.add_row(vec!["Lost and found".to_string(), summary.lost_and_found.to_string()]);
    table.add_row(vec!["Failed files".to_string(), summary.failed_files.len().to_string()]);
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

/// Format a byte size into a human-readable string
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1}G", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}M", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1}K", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}
