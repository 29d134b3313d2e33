//! Report service - daily lookups and KPI views

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::rollup::aggregate;
use crate::domain::{DailyRecord, DateWindow, Granularity, Metric, MetricSet, ProductLine, TenantScope};

/// Aggregate over an arbitrary window, using the rollup rules
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub day_count: usize,
    pub metrics: MetricSet,
}

impl RangeSummary {
    pub fn get(&self, metric: Metric) -> Option<Decimal> {
        self.metrics.get(metric)
    }
}

/// A day's figures with month- and year-to-date context
#[derive(Debug, Clone, Serialize)]
pub struct KpiSummary {
    pub as_of: NaiveDate,
    pub daily: DailyRecord,
    pub month_to_date: RangeSummary,
    pub year_to_date: RangeSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

pub struct ReportService {
    repository: Arc<DuckDbRepository>,
}

impl ReportService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Point lookup for one day
    pub fn get_daily(&self, scope: &TenantScope, date: NaiveDate) -> Result<DailyRecord> {
        self.repository
            .get_daily_record(scope, date)?
            .ok_or_else(|| Error::not_found(format!("no daily record for {}", date)))
    }

    /// Product lines for one day, ordered by product code
    pub fn get_product_lines(&self, scope: &TenantScope, date: NaiveDate) -> Result<Vec<ProductLine>> {
        self.repository.get_product_lines(scope, date)
    }

    /// Daily figures plus MTD and YTD up to `as_of`, or the latest day on file
    pub fn kpi_summary(&self, scope: &TenantScope, as_of: Option<NaiveDate>) -> Result<KpiSummary> {
        let as_of = match as_of {
            Some(date) => date,
            None => self
                .repository
                .get_latest_report_date(scope)?
                .ok_or_else(|| Error::not_found("no report data for tenant"))?,
        };

        let daily = self.get_daily(scope, as_of)?;
        let month_to_date = self.summarize_range(scope, Granularity::Month.period_start(as_of), as_of)?;
        let year_to_date = self.summarize_range(scope, Granularity::Year.period_start(as_of), as_of)?;

        Ok(KpiSummary {
            as_of,
            daily,
            month_to_date,
            year_to_date,
        })
    }

    pub fn summarize_range(
        &self,
        scope: &TenantScope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RangeSummary> {
        let window = DateWindow::new(from, to)?;
        let records = self.repository.get_daily_records(scope, &window)?;
        Ok(RangeSummary {
            from,
            to,
            day_count: records.len(),
            metrics: aggregate(&records),
        })
    }

    /// One point per stored day in the window, oldest first
    pub fn daily_series(
        &self,
        scope: &TenantScope,
        metric: Metric,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SeriesPoint>> {
        let window = DateWindow::new(from, to)?;
        Ok(self
            .repository
            .get_daily_records(scope, &window)?
            .iter()
            .map(|r| SeriesPoint {
                date: r.date,
                value: r.get(metric),
            })
            .collect())
    }

    /// Stored report dates, newest first
    pub fn available_dates(&self, scope: &TenantScope) -> Result<Vec<NaiveDate>> {
        self.repository.get_report_dates(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tenant;

    fn setup() -> (ReportService, Arc<DuckDbRepository>, TenantScope) {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        let repo = Arc::new(repo);
        let tenant = Tenant::new("REITZ", "Reitz").unwrap();
        repo.insert_tenant(&tenant).unwrap();
        (ReportService::new(Arc::clone(&repo)), repo, TenantScope::new(tenant.key))
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn store(repo: &DuckDbRepository, scope: &TenantScope, on: NaiveDate, turnover: i64, tx: i64) {
        let metrics = MetricSet::new()
            .with(Metric::Turnover, Decimal::from(turnover))
            .with(Metric::TransactionCount, Decimal::from(tx));
        repo.commit_merge(scope, &DailyRecord::new(scope.key(), on, metrics), None)
            .unwrap();
    }

    #[test]
    fn test_get_daily_missing_is_not_found() {
        let (service, _repo, scope) = setup();
        assert!(matches!(
            service.get_daily(&scope, date(8, 4)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_kpi_summary_defaults_to_latest_day() {
        let (service, repo, scope) = setup();
        store(&repo, &scope, date(7, 30), 500, 10);
        store(&repo, &scope, date(8, 1), 1000, 50);
        store(&repo, &scope, date(8, 4), 3000, 100);

        let kpis = service.kpi_summary(&scope, None).unwrap();
        assert_eq!(kpis.as_of, date(8, 4));
        assert_eq!(kpis.month_to_date.day_count, 2);
        assert_eq!(kpis.month_to_date.get(Metric::Turnover), Some(Decimal::from(4000)));
        assert_eq!(kpis.year_to_date.get(Metric::Turnover), Some(Decimal::from(4500)));
        // 4000 / 150
        assert_eq!(
            kpis.month_to_date.get(Metric::AvgBasketValue),
            Some(Decimal::new(2667, 2))
        );
    }

    #[test]
    fn test_kpi_summary_without_data_is_not_found() {
        let (service, _repo, scope) = setup();
        assert!(matches!(service.kpi_summary(&scope, None), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_series_and_range_validation() {
        let (service, repo, scope) = setup();
        store(&repo, &scope, date(8, 1), 100, 1);
        store(&repo, &scope, date(8, 3), 300, 3);

        let series = service
            .daily_series(&scope, Metric::Turnover, date(8, 1), date(8, 7))
            .unwrap();
        let values: Vec<_> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(Decimal::from(100)), Some(Decimal::from(300))]);

        assert!(matches!(
            service.summarize_range(&scope, date(8, 7), date(8, 1)),
            Err(Error::InvalidRange(_))
        ));
        assert_eq!(service.available_dates(&scope).unwrap(), vec![date(8, 3), date(8, 1)]);
    }
}
