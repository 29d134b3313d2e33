//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use reportline_core::{Metric, MetricSet};
use rust_decimal::Decimal;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Right-aligned numeric cell, "-" when absent
pub fn number_cell(value: Option<Decimal>) -> Cell {
    Cell::new(format_decimal(value)).set_alignment(CellAlignment::Right)
}

pub fn format_decimal(value: Option<Decimal>) -> String {
    match value {
        Some(v) => v.normalize().to_string(),
        None => "-".to_string(),
    }
}

/// Two-column metric table in canonical metric order
pub fn metric_table(metrics: &MetricSet) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Metric", "Value"]);
    for metric in Metric::ALL {
        let label = if metric.is_derived() {
            format!("{} *", metric)
        } else {
            metric.to_string()
        };
        table.add_row(vec![Cell::new(label), number_cell(metrics.get(metric))]);
    }
    table
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
