//! Doctor command - report store health checks

use std::collections::BTreeSet;

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use reportline_core::services::CheckResult;
use serde_json::Value;

use super::get_context;
use crate::output;

/// Details shown per check before eliding the rest
const MAX_DETAILS: usize = 10;

/// What to run when a check does not pass
fn remedy(check: &str) -> Option<&'static str> {
    match check {
        "rollup_drift" => Some("run `rl refresh <tenant>` for the tenants listed"),
        "unknown_departments" => Some("load the codes with `rl departments import <csv>`"),
        "orphaned_product_lines" | "orphaned_daily_records" => {
            Some("re-ingest the affected days or restore from a backup of the data directory")
        }
        "date_sanity" => Some("check the extractor's date parsing for the listed days"),
        _ => None,
    }
}

/// One finding as `key=value` pairs in a stable order
fn format_detail(value: &Value) -> String {
    let Value::Object(map) = value else {
        return value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(key, v)| match v {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn status_cell(check: &CheckResult) -> Cell {
    match check.status.as_str() {
        "pass" => Cell::new("PASS").fg(Color::Green),
        "warning" => Cell::new("WARN").fg(Color::Yellow),
        "error" => Cell::new("ERROR").fg(Color::Red),
        other => Cell::new(other),
    }
}

pub fn run(verbose: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.doctor_service.run_checks()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        if result.summary.errors > 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("{}", "Report Store Health Check".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);
    for (name, check) in &result.checks {
        table.add_row(vec![Cell::new(name), status_cell(check), Cell::new(&check.message)]);

        if !verbose {
            continue;
        }
        let Some(details) = &check.details else {
            continue;
        };
        for detail in details.iter().take(MAX_DETAILS) {
            table.add_row(vec![
                Cell::new(""),
                Cell::new(""),
                Cell::new(format!("  {}", format_detail(detail))).fg(Color::DarkGrey),
            ]);
        }
        if details.len() > MAX_DETAILS {
            table.add_row(vec![
                Cell::new(""),
                Cell::new(""),
                Cell::new(format!("  ... and {} more", details.len() - MAX_DETAILS)),
            ]);
        }
    }
    println!("{}", table);
    println!();

    let failing: BTreeSet<&str> = result
        .checks
        .iter()
        .filter(|(_, c)| c.status != "pass")
        .map(|(name, _)| name.as_str())
        .collect();
    for name in &failing {
        if let Some(hint) = remedy(name) {
            println!("  {} {}: {}", "->".cyan(), name, hint);
        }
    }
    if !failing.is_empty() {
        if !verbose {
            println!("{}", "  Re-run with --verbose for the affected rows.".dimmed());
        }
        println!();
    }

    println!(
        "Summary: {} passed, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );

    if result.summary.errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
