//! Rollup service - monthly and yearly aggregates
//!
//! Rollups are always recomputed in full from the daily records of their
//! period. A refresh that fails after a committed merge is parked in the
//! pending set and retried on the tenant's next successful write.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use dashmap::DashSet;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::domain::{DateWindow, Granularity, Rollup, TenantKey, TenantScope};

/// Periods whose refresh failed and still need recomputing
#[derive(Debug, Default)]
pub struct PendingRollups {
    periods: DashSet<(TenantKey, Granularity, NaiveDate)>,
}

impl PendingRollups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    fn push(&self, tenant: TenantKey, granularity: Granularity, start: NaiveDate) {
        self.periods.insert((tenant, granularity, start));
    }

    /// Remove and return the tenant's pending periods
    fn take_for(&self, tenant: TenantKey) -> Vec<(Granularity, NaiveDate)> {
        let mine: Vec<_> = self
            .periods
            .iter()
            .filter(|entry| entry.key().0 == tenant)
            .map(|entry| *entry.key())
            .collect();
        mine.into_iter()
            .filter_map(|key| self.periods.remove(&key))
            .map(|(_, granularity, start)| (granularity, start))
            .collect()
    }
}

/// Periods recomputed by a full tenant refresh
#[derive(Debug, Default, Serialize)]
pub struct RefreshSummary {
    pub months: usize,
    pub years: usize,
}

pub struct RollupService {
    repository: Arc<DuckDbRepository>,
    pending: Arc<PendingRollups>,
}

impl RollupService {
    pub fn new(repository: Arc<DuckDbRepository>, pending: Arc<PendingRollups>) -> Self {
        Self {
            repository,
            pending,
        }
    }

    pub fn refresh_month(&self, scope: &TenantScope, month_start: NaiveDate) -> Result<Rollup> {
        self.refresh(scope, Granularity::Month, month_start)
    }

    pub fn refresh_year(&self, scope: &TenantScope, year_start: NaiveDate) -> Result<Rollup> {
        self.refresh(scope, Granularity::Year, year_start)
    }

    /// Recompute and store the rollup for the period containing `start`
    pub fn refresh(
        &self,
        scope: &TenantScope,
        granularity: Granularity,
        start: NaiveDate,
    ) -> Result<Rollup> {
        let rollup = self.compute(scope, granularity, start)?;
        self.repository.upsert_rollup(scope, &rollup)?;
        tracing::debug!(
            tenant = %scope.key(),
            %granularity,
            period = %rollup.period_start,
            days = rollup.day_count,
            "refreshed rollup"
        );
        Ok(rollup)
    }

    /// Aggregate a period without storing it
    pub fn compute(
        &self,
        scope: &TenantScope,
        granularity: Granularity,
        start: NaiveDate,
    ) -> Result<Rollup> {
        let start = granularity.period_start(start);
        let end = granularity.period_end(start)?;
        let window = DateWindow::new(start, end - Duration::days(1))?;
        let records = self.repository.get_daily_records(scope, &window)?;
        Ok(Rollup::from_records(scope.key(), granularity, start, &records))
    }

    /// Refresh the month and year enclosing `date`
    pub fn refresh_for_date(&self, scope: &TenantScope, date: NaiveDate) -> Result<()> {
        self.refresh_month(scope, date)?;
        self.refresh_year(scope, date)?;
        Ok(())
    }

    /// Rollup upkeep after a committed merge.
    ///
    /// Retries the tenant's parked periods, then refreshes the periods
    /// around `date`. Failures are logged and parked, never returned.
    /// Returns how many periods remain parked for the tenant.
    pub fn after_commit(&self, scope: &TenantScope, date: NaiveDate) -> usize {
        let mut periods: BTreeSet<(Granularity, NaiveDate)> =
            self.pending.take_for(scope.key()).into_iter().collect();
        for granularity in [Granularity::Month, Granularity::Year] {
            periods.insert((granularity, granularity.period_start(date)));
        }

        let mut parked = 0;
        for (granularity, start) in periods {
            if let Err(e) = self.refresh(scope, granularity, start) {
                tracing::warn!(
                    tenant = %scope.key(),
                    %granularity,
                    period = %start,
                    error = %e,
                    "rollup refresh failed, queued for retry"
                );
                self.pending.push(scope.key(), granularity, start);
                parked += 1;
            }
        }
        parked
    }

    /// Recompute every month and year that holds data for the tenant
    pub fn refresh_tenant(&self, scope: &TenantScope) -> Result<RefreshSummary> {
        let dates = self.repository.get_report_dates(scope)?;
        let months: BTreeSet<NaiveDate> = dates
            .iter()
            .map(|d| Granularity::Month.period_start(*d))
            .collect();
        let years: BTreeSet<NaiveDate> = dates
            .iter()
            .map(|d| Granularity::Year.period_start(*d))
            .collect();

        for start in &months {
            self.refresh_month(scope, *start)?;
        }
        for start in &years {
            self.refresh_year(scope, *start)?;
        }
        // Anything parked for this tenant is now current
        self.pending.take_for(scope.key());

        Ok(RefreshSummary {
            months: months.len(),
            years: years.len(),
        })
    }

    // === Reads ===

    /// Stored monthly rollup, or an empty one when none exists
    pub fn get_month(&self, scope: &TenantScope, month_start: NaiveDate) -> Result<Rollup> {
        self.get(scope, Granularity::Month, month_start)
    }

    /// Stored yearly rollup, or an empty one when none exists
    pub fn get_year(&self, scope: &TenantScope, year_start: NaiveDate) -> Result<Rollup> {
        self.get(scope, Granularity::Year, year_start)
    }

    fn get(&self, scope: &TenantScope, granularity: Granularity, start: NaiveDate) -> Result<Rollup> {
        let start = granularity.period_start(start);
        Ok(self
            .repository
            .get_rollup(scope, granularity, start)?
            .unwrap_or_else(|| Rollup::empty(scope.key(), granularity, start)))
    }

    pub fn pending(&self) -> &PendingRollups {
        &self.pending
    }
}
