//! CLI command implementations

pub mod departments;
pub mod doctor;
pub mod ingest;
pub mod logs;
pub mod query;
pub mod report;
pub mod status;
pub mod tenant;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reportline_core::domain::parse_report_date;
use reportline_core::services::{EntryPoint, LogEvent, LoggingService};
use reportline_core::{ReportlineContext, Tenant, TenantScope};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    // Ensure directory exists
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the data directory from `REPORTLINE_DIR` or default to ~/.reportline
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("REPORTLINE_DIR") {
        Ok(PathBuf::from(dir))
    } else {
        dirs::home_dir()
            .map(|home| home.join(".reportline"))
            .ok_or_else(|| anyhow!("Could not find home directory; set REPORTLINE_DIR"))
    }
}

/// Get or create the reportline context
pub fn get_context() -> Result<ReportlineContext> {
    let data_dir = get_data_dir()?;

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    ReportlineContext::new(&data_dir).context("Failed to initialize reportline context")
}

/// Resolve a tenant code for a read command
pub fn resolve(ctx: &ReportlineContext, code: &str) -> Result<(Tenant, TenantScope)> {
    Ok(ctx.tenant_service.resolve(code)?)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(parse_report_date(s)?)
}

/// Accepts `YYYY-MM` or a full date
pub fn parse_month(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.len() == 7 {
        return parse_date(&format!("{}-01", trimmed));
    }
    parse_date(trimmed)
}

/// Accepts `YYYY` or a full date
pub fn parse_year(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.len() == 4 {
        return parse_date(&format!("{}-01-01", trimmed));
    }
    parse_date(trimmed)
}
