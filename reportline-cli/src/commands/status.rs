//! Status command - store summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Report Store Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        "Tenants".to_string(),
        format!("{} ({} active)", status.total_tenants, status.active_tenants),
    ]);
    table.add_row(vec!["Daily Records".to_string(), status.total_daily_records.to_string()]);
    table.add_row(vec!["Product Lines".to_string(), status.total_product_lines.to_string()]);
    table.add_row(vec![
        "Rollups".to_string(),
        format!(
            "{} monthly, {} yearly",
            status.total_monthly_rollups, status.total_yearly_rollups
        ),
    ]);
    table.add_row(vec!["Departments".to_string(), status.total_departments.to_string()]);
    table.add_row(vec!["Database Size".to_string(), output::format_size(status.db_size_bytes)]);

    println!("{}", table);
    println!();

    if let (Some(earliest), Some(latest)) = (&status.date_range.earliest, &status.date_range.latest) {
        println!("Date range: {} to {}", earliest, latest);
        println!();
    }

    if !status.tenants.is_empty() {
        println!("{}", "Tenants".bold());
        for tenant in &status.tenants {
            let marker = if tenant.active { String::new() } else { " (inactive)".dimmed().to_string() };
            println!("  - {} {}{}", tenant.code, tenant.name.dimmed(), marker);
        }
    }

    Ok(())
}
