//! Daily records and the upstream extraction hand-off

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::metric::{parse_metric_value, Metric, MetricSet};
use super::product::ProductLineCandidate;
use super::result::{Error, Result};
use super::tenant::TenantKey;

/// Reconciled best-known metrics for one tenant on one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub tenant_key: TenantKey,
    pub date: NaiveDate,
    pub metrics: MetricSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyRecord {
    pub fn new(tenant_key: TenantKey, date: NaiveDate, metrics: MetricSet) -> Self {
        let now = Utc::now();
        Self {
            tenant_key,
            date,
            metrics,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get(&self, metric: Metric) -> Option<rust_decimal::Decimal> {
        self.metrics.get(metric)
    }
}

/// A daily record as handed over by an extractor: sparse and unvalidated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialDailyRecord {
    /// External tenant identifier (tenant code)
    #[serde(default, alias = "pharmacy", alias = "pharmacy_code")]
    pub tenant: String,
    #[serde(default, alias = "report_date")]
    pub date: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, JsonValue>,
}

/// A field that was discarded during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedField {
    pub field: String,
    pub reason: String,
}

/// Metrics that survived validation, plus what was dropped on the way
#[derive(Debug, Clone, Default)]
pub struct ParsedMetrics {
    pub metrics: MetricSet,
    pub dropped: Vec<DroppedField>,
}

impl PartialDailyRecord {
    pub fn new(tenant: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            date: Some(date.into()),
            metrics: BTreeMap::new(),
        }
    }

    /// Builder-style metric insert, mostly for tests and fixtures
    pub fn with_metric(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }

    /// The report date, or `InvalidDate` when absent or malformed
    pub fn report_date(&self) -> Result<NaiveDate> {
        match self.date.as_deref() {
            Some(s) => parse_report_date(s),
            None => Err(Error::invalid_date("report date is missing")),
        }
    }

    /// Validate the sparse metric map. Malformed fields are dropped, never fatal.
    pub fn parse_metrics(&self) -> ParsedMetrics {
        let mut parsed = ParsedMetrics::default();

        for (name, raw) in &self.metrics {
            let Some(metric) = Metric::from_name(name) else {
                parsed.dropped.push(DroppedField {
                    field: name.clone(),
                    reason: "unknown metric".to_string(),
                });
                continue;
            };

            match parse_metric_value(metric, raw) {
                Ok(Some(value)) => {
                    // Two aliases for the same metric: keep the larger reading
                    let merged = match parsed.metrics.get(metric) {
                        Some(existing) => existing.max(value),
                        None => value,
                    };
                    parsed.metrics.set(metric, Some(merged));
                }
                Ok(None) => {}
                Err(reason) => parsed.dropped.push(DroppedField {
                    field: name.clone(),
                    reason,
                }),
            }
        }

        parsed
    }
}

/// One upstream hand-off: a partial daily record plus its product-line candidates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionBatch {
    #[serde(flatten)]
    pub record: PartialDailyRecord,
    #[serde(default, alias = "sales_details", alias = "products")]
    pub lines: Vec<ProductLineCandidate>,
}

/// Parse a calendar date in `YYYY-MM-DD` or `YYYY/MM/DD` form
pub fn parse_report_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    let formats = ["%Y-%m-%d", "%Y/%m/%d"];

    for fmt in &formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date);
        }
    }
    Err(Error::invalid_date(format!("'{}' is not a YYYY-MM-DD date", s)))
}
