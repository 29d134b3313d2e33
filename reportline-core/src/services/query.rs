//! Range query service - product and department rankings over a window
//!
//! Pure reads. Each call loads the window's lines on its own connection,
//! so it sees one committed snapshot and never waits on a merge lock.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::ranking::{self, DepartmentAggregate, ProductAggregate};
use crate::domain::result::Result;
use crate::domain::{DateWindow, Threshold, TenantScope};

pub struct RangeQueryService {
    repository: Arc<DuckDbRepository>,
}

impl RangeQueryService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Products ranked by quantity sold
    pub fn best_sellers_by_quantity(
        &self,
        scope: &TenantScope,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ProductAggregate>> {
        let window = DateWindow::new(from, to)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let lines = self.repository.get_product_lines_in(scope, &window)?;
        Ok(ranking::best_sellers(&lines, limit))
    }

    /// Products ranked by sales value
    pub fn best_sellers_by_value(
        &self,
        scope: &TenantScope,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ProductAggregate>> {
        let window = DateWindow::new(from, to)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let lines = self.repository.get_product_lines_in(scope, &window)?;
        Ok(ranking::best_sellers_by_value(&lines, limit))
    }

    /// Products at or under the gross-profit threshold, worst margin first
    pub fn low_margin_products(
        &self,
        scope: &TenantScope,
        from: NaiveDate,
        to: NaiveDate,
        threshold: Threshold,
        limit: usize,
        exclude_departments: &[String],
    ) -> Result<Vec<ProductAggregate>> {
        let window = DateWindow::new(from, to)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let lines = self.repository.get_product_lines_in(scope, &window)?;
        Ok(ranking::low_margin(&lines, threshold, limit, exclude_departments))
    }

    /// Departments ranked by sales value
    pub fn top_departments(
        &self,
        scope: &TenantScope,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<DepartmentAggregate>> {
        let window = DateWindow::new(from, to)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let lines = self.repository.get_product_lines_in(scope, &window)?;
        Ok(ranking::top_departments(&lines, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::Error;
    use crate::domain::{DailyRecord, MetricSet, ProductLine, Tenant};
    use rust_decimal::Decimal;

    fn setup() -> (RangeQueryService, Arc<DuckDbRepository>, TenantScope) {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        let repo = Arc::new(repo);
        let tenant = Tenant::new("T1", "Tenant one").unwrap();
        repo.insert_tenant(&tenant).unwrap();
        (
            RangeQueryService::new(Arc::clone(&repo)),
            repo,
            TenantScope::new(tenant.key),
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn line(scope: &TenantScope, d: u32, code: &str, qty: i64, value: i64, gp: i64) -> ProductLine {
        ProductLine {
            tenant_key: scope.key(),
            date: day(d),
            product_code: code.to_string(),
            description: Some(format!("{} desc", code)),
            department_code: Some("PDST".to_string()),
            department_name: None,
            quantity: Some(Decimal::from(qty)),
            sales_value: Some(Decimal::from(value)),
            sales_cost: None,
            gross_profit: None,
            gross_profit_percent: Some(Decimal::from(gp)),
            stock_on_hand: None,
        }
    }

    fn store_day(repo: &DuckDbRepository, scope: &TenantScope, d: u32, lines: Vec<ProductLine>) {
        let record = DailyRecord::new(scope.key(), day(d), MetricSet::new());
        repo.commit_merge(scope, &record, Some(&lines)).unwrap();
    }

    #[test]
    fn test_best_sellers_across_days() {
        let (service, repo, scope) = setup();
        store_day(&repo, &scope, 1, vec![line(&scope, 1, "P1", 10, 100, 30)]);
        store_day(&repo, &scope, 2, vec![line(&scope, 2, "P2", 20, 50, 30)]);
        store_day(&repo, &scope, 3, vec![line(&scope, 3, "P1", 5, 50, 30)]);

        let top = service
            .best_sellers_by_quantity(&scope, day(1), day(7), 5)
            .unwrap();
        let got: Vec<(&str, Decimal)> = top
            .iter()
            .map(|p| (p.product_code.as_str(), p.total_quantity))
            .collect();
        assert_eq!(got, vec![("P2", Decimal::from(20)), ("P1", Decimal::from(15))]);

        let by_value = service.best_sellers_by_value(&scope, day(1), day(7), 1).unwrap();
        assert_eq!(by_value[0].product_code, "P1");
    }

    #[test]
    fn test_low_margin_respects_threshold() {
        let (service, repo, scope) = setup();
        store_day(
            &repo,
            &scope,
            4,
            vec![
                line(&scope, 4, "CHEAP", 1, 100, 5),
                line(&scope, 4, "OK", 1, 100, 40),
                line(&scope, 4, "FREE", 1, 0, 0),
            ],
        );

        let low = service
            .low_margin_products(&scope, day(1), day(7), Threshold::new(Decimal::from(15)), 10, &[])
            .unwrap();
        let codes: Vec<&str> = low.iter().map(|p| p.product_code.as_str()).collect();
        assert_eq!(codes, vec!["CHEAP"]);

        let excluded = service
            .low_margin_products(
                &scope,
                day(1),
                day(7),
                Threshold::new(Decimal::from(15)),
                10,
                &["pd".to_string()],
            )
            .unwrap();
        assert!(excluded.is_empty());
    }

    #[test]
    fn test_range_errors_and_zero_limit() {
        let (service, repo, scope) = setup();
        store_day(&repo, &scope, 1, vec![line(&scope, 1, "P1", 10, 100, 30)]);

        assert!(matches!(
            service.best_sellers_by_quantity(&scope, day(7), day(1), 5),
            Err(Error::InvalidRange(_))
        ));
        assert!(service
            .best_sellers_by_quantity(&scope, day(1), day(7), 0)
            .unwrap()
            .is_empty());
        assert_eq!(service.top_departments(&scope, day(1), day(7), 5).unwrap().len(), 1);
    }
}
