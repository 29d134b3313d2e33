//! Status service - store-wide counts and coverage

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::duckdb::{DuckDbRepository, StatusTable};
use crate::domain::result::Result;

/// Status service for store summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let tenants = self.repository.list_tenants()?;
        let (earliest, latest) = self.repository.get_report_date_range()?;

        Ok(StatusSummary {
            total_tenants: tenants.len() as i64,
            active_tenants: tenants.iter().filter(|t| t.active).count() as i64,
            total_daily_records: self.repository.count_rows(StatusTable::DailyRecords)?,
            total_product_lines: self.repository.count_rows(StatusTable::ProductLines)?,
            total_monthly_rollups: self.repository.count_rows(StatusTable::MonthlyRollups)?,
            total_yearly_rollups: self.repository.count_rows(StatusTable::YearlyRollups)?,
            total_departments: self.repository.count_rows(StatusTable::Departments)?,
            tenants: tenants
                .into_iter()
                .map(|t| TenantSummary {
                    code: t.code,
                    name: t.name,
                    active: t.active,
                })
                .collect(),
            date_range: DateRange {
                earliest: earliest.map(|d| d.to_string()),
                latest: latest.map(|d| d.to_string()),
            },
            db_size_bytes: self.repository.get_db_size()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_tenants: i64,
    pub active_tenants: i64,
    pub total_daily_records: i64,
    pub total_product_lines: i64,
    pub total_monthly_rollups: i64,
    pub total_yearly_rollups: i64,
    pub total_departments: i64,
    pub tenants: Vec<TenantSummary>,
    pub date_range: DateRange,
    pub db_size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub code: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}
