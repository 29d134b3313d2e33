//! Tenant command - manage the tenant registry

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use reportline_core::services::LogEvent;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum TenantCommands {
    /// Register a tenant (no-op if the code exists)
    Add {
        /// External tenant code used by extractors, e.g. REITZ
        code: String,
        /// Display name (defaults to the code)
        #[arg(default_value = "")]
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// List registered tenants
    List {
        #[arg(long)]
        json: bool,
    },
    /// Stop accepting new reports for a tenant; its data stays readable
    Deactivate {
        code: String,
        #[arg(long)]
        json: bool,
    },
    /// Accept reports for a deactivated tenant again
    Activate {
        code: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: TenantCommands) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    match command {
        TenantCommands::Add { code, name, json } => {
            let tenant = ctx.tenant_service.register(&code, &name)?;
            log_event(
                &logger,
                LogEvent::new("tenant_registered")
                    .with_command("tenant add")
                    .with_tenant(&tenant.code),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&tenant)?);
            } else {
                output::success(&format!("Tenant {} ({}) is registered", tenant.code, tenant.name));
            }
        }
        TenantCommands::List { json } => {
            let tenants = ctx.tenant_service.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tenants)?);
                return Ok(());
            }
            if tenants.is_empty() {
                println!("No tenants registered. Add one with `rl tenant add <CODE>`.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Code", "Name", "Active", "Registered"]);
            for t in &tenants {
                table.add_row(vec![
                    t.code.clone(),
                    t.name.clone(),
                    if t.active { "yes".green().to_string() } else { "no".red().to_string() },
                    t.created_at.format("%Y-%m-%d").to_string(),
                ]);
            }
            println!("{}", table);
        }
        TenantCommands::Deactivate { code, json } => {
            let tenant = ctx.tenant_service.deactivate(&code)?;
            log_event(
                &logger,
                LogEvent::new("tenant_deactivated")
                    .with_command("tenant deactivate")
                    .with_tenant(&tenant.code),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&tenant)?);
            } else {
                output::warning(&format!("Tenant {} is inactive", tenant.code));
            }
        }
        TenantCommands::Activate { code, json } => {
            let tenant = ctx.tenant_service.activate(&code)?;
            log_event(
                &logger,
                LogEvent::new("tenant_activated")
                    .with_command("tenant activate")
                    .with_tenant(&tenant.code),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&tenant)?);
            } else {
                output::success(&format!("Tenant {} is active", tenant.code));
            }
        }
    }

    Ok(())
}
