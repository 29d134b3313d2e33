//! Report commands - daily records, rollups, KPIs and series

use anyhow::{anyhow, Result};
use colored::Colorize;
use comfy_table::Cell;
use reportline_core::services::LogEvent;
use reportline_core::{Metric, MetricSet, Rollup};
use serde_json::json;

use super::{get_context, get_logger, log_event, parse_date, parse_month, parse_year, resolve};
use crate::output;

fn print_metrics(title: &str, metrics: &MetricSet) {
    println!("{}", title.bold());
    println!("{}", output::metric_table(metrics));
    println!("{}", "* derived from the report with the largest turnover".dimmed());
}

pub fn daily(tenant: &str, date: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let record = ctx.report_service.get_daily(&scope, parse_date(date)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    print_metrics(&format!("{} on {}", tenant.code, record.date), &record.metrics);
    println!(
        "Last updated {}",
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

pub fn lines(tenant: &str, date: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let date = parse_date(date)?;
    let lines = ctx.report_service.get_product_lines(&scope, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }
    if lines.is_empty() {
        println!("No product lines for {} on {}", tenant.code, date);
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Code", "Description", "Dept", "Qty", "Value", "GP %", "SOH"]);
    for line in &lines {
        let dept = match (&line.department_code, &line.department_name) {
            (Some(code), Some(name)) => format!("{} {}", code, name.dimmed()),
            (Some(code), None) => code.clone(),
            _ => String::new(),
        };
        table.add_row(vec![
            Cell::new(&line.product_code),
            Cell::new(line.description.as_deref().unwrap_or("")),
            Cell::new(dept),
            output::number_cell(line.quantity),
            output::number_cell(line.sales_value),
            output::number_cell(line.gross_profit_percent),
            output::number_cell(line.stock_on_hand),
        ]);
    }
    println!("{}", table);
    println!("{} line(s)", lines.len());
    Ok(())
}

fn print_rollup(code: &str, rollup: &Rollup) {
    let label = match rollup.granularity {
        reportline_core::Granularity::Month => rollup.period_start.format("%Y-%m").to_string(),
        reportline_core::Granularity::Year => rollup.period_start.format("%Y").to_string(),
    };
    println!(
        "{} {} {} ({} day(s) reported)",
        code.bold(),
        rollup.granularity,
        label.bold(),
        rollup.day_count
    );
    println!("{}", output::metric_table(&rollup.metrics));
}

pub fn month(tenant: &str, month: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let rollup = ctx.rollup_service.get_month(&scope, parse_month(month)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rollup)?);
    } else {
        print_rollup(&tenant.code, &rollup);
    }
    Ok(())
}

pub fn year(tenant: &str, year: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let rollup = ctx.rollup_service.get_year(&scope, parse_year(year)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rollup)?);
    } else {
        print_rollup(&tenant.code, &rollup);
    }
    Ok(())
}

pub fn refresh(tenant: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let summary = ctx.rollup_service.refresh_tenant(&scope)?;

    log_event(
        &logger,
        LogEvent::new("rollups_refreshed")
            .with_command("refresh")
            .with_tenant(&tenant.code)
            .with_count(summary.months + summary.years),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::success(&format!(
            "Recomputed {} month(s) and {} year(s) for {}",
            summary.months, summary.years, tenant.code
        ));
    }
    Ok(())
}

pub fn kpis(tenant: &str, as_of: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let as_of = as_of.map(parse_date).transpose()?;
    let kpis = ctx.report_service.kpi_summary(&scope, as_of)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&kpis)?);
        return Ok(());
    }

    println!("{} KPIs as of {}", tenant.code.bold(), kpis.as_of.to_string().bold());
    let mut table = output::create_table();
    table.set_header(vec!["Metric", "Day", "Month to date", "Year to date"]);
    for metric in Metric::ALL {
        table.add_row(vec![
            Cell::new(metric.to_string()),
            output::number_cell(kpis.daily.get(metric)),
            output::number_cell(kpis.month_to_date.get(metric)),
            output::number_cell(kpis.year_to_date.get(metric)),
        ]);
    }
    println!("{}", table);
    println!(
        "{} day(s) this month, {} day(s) this year",
        kpis.month_to_date.day_count, kpis.year_to_date.day_count
    );
    Ok(())
}

pub fn range(tenant: &str, from: &str, to: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let summary = ctx
        .report_service
        .summarize_range(&scope, parse_date(from)?, parse_date(to)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} {} to {} ({} day(s) reported)",
        tenant.code.bold(),
        summary.from,
        summary.to,
        summary.day_count
    );
    println!("{}", output::metric_table(&summary.metrics));
    Ok(())
}

pub fn series(tenant: &str, metric: &str, from: &str, to: &str, json: bool) -> Result<()> {
    let metric: Metric = metric.parse().map_err(|e: String| anyhow!(e))?;
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let points = ctx
        .report_service
        .daily_series(&scope, metric, parse_date(from)?, parse_date(to)?)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "tenant": tenant.code,
                "metric": metric.to_string(),
                "points": points,
            }))?
        );
        return Ok(());
    }

    if points.is_empty() {
        println!("No reports for {} in that range", tenant.code);
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date".to_string(), metric.to_string()]);
    for point in &points {
        table.add_row(vec![Cell::new(point.date), output::number_cell(point.value)]);
    }
    println!("{}", table);
    Ok(())
}
