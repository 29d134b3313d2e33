//! Doctor service - database health checks

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::domain::{Granularity, TenantKey};
use crate::services::rollup::RollupService;
use crate::services::tenant::TenantService;

/// Doctor service for health checks
pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
    tenants: Arc<TenantService>,
    rollups: Arc<RollupService>,
}

impl DoctorService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        tenants: Arc<TenantService>,
        rollups: Arc<RollupService>,
    ) -> Self {
        Self {
            repository,
            tenants,
            rollups,
        }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();

        // Product lines without a daily record
        let orphaned_lines = self.repository.check_orphaned_product_lines()?;
        let line_details: Vec<serde_json::Value> = orphaned_lines
            .iter()
            .map(|s| {
                let parts: Vec<&str> = s.split('|').collect();
                if parts.len() >= 3 {
                    json!({
                        "tenant_key": parts[0],
                        "date": parts[1],
                        "lines": parts[2].parse::<i64>().ok()
                    })
                } else {
                    json!({"info": s})
                }
            })
            .collect();
        checks.insert(
            "orphaned_product_lines".to_string(),
            CheckResult::from_findings(
                "error",
                "No orphaned product lines found",
                format!("{} day(s) have product lines but no daily record", orphaned_lines.len()),
                line_details,
            ),
        );

        // Daily records whose tenant is not registered
        let orphaned_records = self.repository.check_orphaned_daily_records()?;
        let record_details = pair_details(&orphaned_records, "tenant_key", "date");
        checks.insert(
            "orphaned_daily_records".to_string(),
            CheckResult::from_findings(
                "error",
                "Every daily record belongs to a registered tenant",
                format!("{} daily record(s) reference unknown tenants", orphaned_records.len()),
                record_details,
            ),
        );

        // Date sanity - before 2000 or more than a year ahead
        let insane_dates = self.repository.check_date_sanity()?;
        let date_details = pair_details(&insane_dates, "tenant_key", "date");
        checks.insert(
            "date_sanity".to_string(),
            CheckResult::from_findings(
                "error",
                "All report dates are valid",
                format!("{} daily record(s) have unreasonable dates", insane_dates.len()),
                date_details,
            ),
        );

        let drift = self.rollup_drift()?;
        let drift_details: Vec<serde_json::Value> = drift
            .iter()
            .map(|d| {
                json!({
                    "tenant": d.tenant,
                    "granularity": d.granularity,
                    "period_start": d.period_start.to_string(),
                    "problem": d.problem
                })
            })
            .collect();
        checks.insert(
            "rollup_drift".to_string(),
            CheckResult::from_findings(
                "warning",
                "All rollups match their daily records",
                format!("{} rollup(s) are stale or missing; run `rl refresh`", drift.len()),
                drift_details,
            ),
        );

        let unknown = self.repository.check_unknown_departments()?;
        let unknown_details: Vec<serde_json::Value> = unknown
            .iter()
            .map(|s| {
                let parts: Vec<&str> = s.split('|').collect();
                if parts.len() >= 2 {
                    json!({"department_code": parts[0], "lines": parts[1].parse::<i64>().ok()})
                } else {
                    json!({"info": s})
                }
            })
            .collect();
        checks.insert(
            "unknown_departments".to_string(),
            CheckResult::from_findings(
                "warning",
                "All department codes are in the reference table",
                format!("{} department code(s) are not in the reference table", unknown.len()),
                unknown_details,
            ),
        );

        // Informational only
        let inactive = self.repository.check_inactive_tenants_with_data()?;
        let inactive_details: Vec<serde_json::Value> = inactive
            .iter()
            .map(|s| {
                let parts: Vec<&str> = s.split('|').collect();
                if parts.len() >= 2 {
                    json!({"tenant": parts[0], "daily_records": parts[1].parse::<i64>().ok()})
                } else {
                    json!({"info": s})
                }
            })
            .collect();
        checks.insert(
            "inactive_tenants_with_data".to_string(),
            CheckResult {
                status: "pass".to_string(),
                message: if inactive.is_empty() {
                    "No inactive tenants hold data".to_string()
                } else {
                    format!("{} inactive tenant(s) still hold data", inactive.len())
                },
                details: if inactive.is_empty() { None } else { Some(inactive_details) },
            },
        );

        // Calculate summary
        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }

    /// Stored rollups that differ from a fresh recomputation, plus periods
    /// holding daily data with no stored rollup
    pub fn rollup_drift(&self) -> Result<Vec<RollupDrift>> {
        let mut drift = Vec::new();

        for tenant in self.tenants.list()? {
            let (tenant, scope) = self.tenants.resolve_key(tenant.key)?;
            let dates = self.repository.get_report_dates(&scope)?;

            for granularity in [Granularity::Month, Granularity::Year] {
                let mut expected: BTreeSet<NaiveDate> =
                    dates.iter().map(|d| granularity.period_start(*d)).collect();

                for stored in self.repository.get_rollups(&scope, granularity)? {
                    expected.remove(&stored.period_start);
                    let fresh = self.rollups.compute(&scope, granularity, stored.period_start)?;
                    if fresh != stored {
                        drift.push(RollupDrift::new(
                            &tenant.code,
                            tenant.key,
                            granularity,
                            stored.period_start,
                            "stale",
                        ));
                    }
                }
                for start in expected {
                    drift.push(RollupDrift::new(
                        &tenant.code,
                        tenant.key,
                        granularity,
                        start,
                        "missing",
                    ));
                }
            }
        }
        Ok(drift)
    }
}

fn pair_details(rows: &[String], first: &str, second: &str) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|s| match s.split_once('|') {
            Some((a, b)) => {
                let mut detail = serde_json::Map::new();
                detail.insert(first.to_string(), json!(a));
                detail.insert(second.to_string(), json!(b));
                serde_json::Value::Object(detail)
            }
            None => json!({"info": s}),
        })
        .collect()
}

/// One rollup that no longer matches its daily records
#[derive(Debug, Clone, Serialize)]
pub struct RollupDrift {
    pub tenant: String,
    #[serde(skip)]
    pub tenant_key: TenantKey,
    pub granularity: Granularity,
    pub period_start: NaiveDate,
    pub problem: &'static str,
}

impl RollupDrift {
    fn new(
        tenant: &str,
        tenant_key: TenantKey,
        granularity: Granularity,
        period_start: NaiveDate,
        problem: &'static str,
    ) -> Self {
        Self {
            tenant: tenant.to_string(),
            tenant_key,
            granularity,
            period_start,
            problem,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    /// Pass when nothing was found, otherwise `severity` with the details
    fn from_findings(
        severity: &str,
        ok_message: &str,
        problem_message: String,
        details: Vec<serde_json::Value>,
    ) -> Self {
        if details.is_empty() {
            Self {
                status: "pass".to_string(),
                message: ok_message.to_string(),
                details: None,
            }
        } else {
            Self {
                status: severity.to_string(),
                message: problem_message,
                details: Some(details),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
