//! Departments command - load and list the department code table

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Table;
use dialoguer::Confirm;
use reportline_core::services::LogEvent;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum DepartmentCommands {
    /// Import a CSV with "Department Code" and "Department Name" columns
    Import {
        file: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// List known department codes
    List {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: DepartmentCommands) -> Result<()> {
    match command {
        DepartmentCommands::Import { file, force, json } => import(file, force, json),
        DepartmentCommands::List { json } => list(json),
    }
}

fn import(file: PathBuf, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    let preview = ctx.department_service.preview(&file)?;

    if !force && !json {
        println!("{}", "PREVIEW - nothing written yet".yellow());
        let mut table = Table::new();
        table.set_header(vec!["Code", "Name"]);
        for dept in preview.departments.iter().take(10) {
            table.add_row(vec![&dept.code, &dept.name]);
        }
        println!("{}", table);
        if preview.departments.len() > 10 {
            println!("... and {} more", preview.departments.len() - 10);
        }
        if preview.skipped > 0 {
            output::warning(&format!("{} row(s) with an invalid code will be skipped", preview.skipped));
        }

        if !Confirm::new()
            .with_prompt(format!("Import {} department(s)?", preview.departments.len()))
            .default(true)
            .interact()?
        {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let result = ctx.department_service.apply(&preview)?;
    log_event(
        &logger,
        LogEvent::new("departments_imported")
            .with_command("departments import")
            .with_count(result.imported),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    output::success("Import complete");
    println!("  Imported: {}", result.imported);
    println!("  Skipped: {}", result.skipped);
    Ok(())
}

fn list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let departments = ctx.department_service.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&departments)?);
        return Ok(());
    }
    if departments.is_empty() {
        println!("No departments loaded. Import them with `rl departments import <file.csv>`.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Code", "Name"]);
    for dept in &departments {
        table.add_row(vec![&dept.code, &dept.name]);
    }
    println!("{}", table);
    Ok(())
}
