//! Range query commands - best sellers, departments and low-margin products

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::Cell;
use reportline_core::domain::ProductAggregate;
use reportline_core::Threshold;

use super::{get_context, parse_date, resolve};
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RankBy {
    /// Products by quantity sold
    Quantity,
    /// Products by sales value
    Value,
    /// Departments by sales value
    Department,
}

fn product_table(rows: &[ProductAggregate]) -> comfy_table::Table {
    let mut table = output::create_table();
    table.set_header(vec!["#", "Code", "Description", "Dept", "Qty", "Value", "Avg GP %"]);
    for (i, p) in rows.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&p.product_code),
            Cell::new(p.description.as_deref().unwrap_or("")),
            Cell::new(p.department_code.as_deref().unwrap_or("")),
            output::number_cell(Some(p.total_quantity)),
            output::number_cell(Some(p.total_sales_value)),
            output::number_cell(p.avg_gp_percent),
        ]);
    }
    table
}

pub fn best_sellers(
    tenant: &str,
    from: &str,
    to: &str,
    limit: Option<usize>,
    by: RankBy,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let (from, to) = (parse_date(from)?, parse_date(to)?);
    let limit = limit.unwrap_or(ctx.config.queries.default_limit);

    if by == RankBy::Department {
        let departments = ctx.query_service.top_departments(&scope, from, to, limit)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&departments)?);
            return Ok(());
        }
        if departments.is_empty() {
            println!("No department sales for {} between {} and {}", tenant.code, from, to);
            return Ok(());
        }

        let mut table = output::create_table();
        table.set_header(vec!["#", "Dept", "Name", "Products", "Qty", "Value", "GP", "GP %"]);
        for (i, d) in departments.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&d.department_code),
                Cell::new(d.department_name.as_deref().unwrap_or("")),
                Cell::new(d.product_count),
                output::number_cell(Some(d.total_quantity)),
                output::number_cell(Some(d.total_sales_value)),
                output::number_cell(Some(d.total_gross_profit)),
                output::number_cell(d.gp_percent),
            ]);
        }
        println!("{}", table);
        return Ok(());
    }

    let products = match by {
        RankBy::Value => ctx.query_service.best_sellers_by_value(&scope, from, to, limit)?,
        _ => ctx.query_service.best_sellers_by_quantity(&scope, from, to, limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }
    if products.is_empty() {
        println!("No product sales for {} between {} and {}", tenant.code, from, to);
        return Ok(());
    }

    println!(
        "{} best sellers by {}, {} to {}",
        tenant.code.bold(),
        if by == RankBy::Value { "value" } else { "quantity" },
        from,
        to
    );
    println!("{}", product_table(&products));
    Ok(())
}

pub fn low_margin(
    tenant: &str,
    from: &str,
    to: &str,
    threshold: Option<&str>,
    limit: Option<usize>,
    exclude: Vec<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let (tenant, scope) = resolve(&ctx, tenant)?;
    let (from, to) = (parse_date(from)?, parse_date(to)?);

    let threshold: Threshold = match threshold {
        Some(t) => t.parse()?,
        None => ctx.config.queries.threshold()?,
    };
    let limit = limit.unwrap_or(ctx.config.queries.default_limit);
    let exclude = if exclude.is_empty() {
        ctx.config.queries.exclude_departments.clone()
    } else {
        exclude
    };

    let products = ctx
        .query_service
        .low_margin_products(&scope, from, to, threshold, limit, &exclude)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }
    if products.is_empty() {
        output::success(&format!(
            "No products at or under {} GP for {} between {} and {}",
            threshold, tenant.code, from, to
        ));
        return Ok(());
    }

    println!(
        "{} products at or under {} GP, {} to {}",
        tenant.code.bold(),
        threshold,
        from,
        to
    );
    if !exclude.is_empty() {
        output::info(&format!("Excluding departments: {}", exclude.join(", ")));
    }
    println!("{}", product_table(&products));
    Ok(())
}
