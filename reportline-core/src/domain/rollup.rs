//! Monthly and yearly rollups

use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::daily::DailyRecord;
use super::metric::{Metric, MetricKind, MetricSet};
use super::reconcile::ratio;
use super::result::{Error, Result};
use super::tenant::TenantKey;

/// Rollup period length
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Month,
    Year,
}

impl Granularity {
    /// First day of the period containing `date`
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        let (year, month) = match self {
            Granularity::Month => (date.year(), date.month()),
            Granularity::Year => (date.year(), 1),
        };
        // Day 1 of a valid year/month always exists
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
    }

    /// First day after the period starting at `start`
    pub fn period_end(&self, start: NaiveDate) -> Result<NaiveDate> {
        let start = self.period_start(start);
        let next = match self {
            Granularity::Month if start.month() == 12 => {
                NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
            }
            Granularity::Month => NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1),
            Granularity::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
        };
        next.ok_or_else(|| Error::invalid_date(format!("no period after {}", start)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate over the daily records of one tenant and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    pub tenant_key: TenantKey,
    pub granularity: Granularity,
    pub period_start: NaiveDate,
    /// Number of daily records in the period
    pub day_count: i64,
    pub metrics: MetricSet,
}

pub type MonthlyRollup = Rollup;
pub type YearlyRollup = Rollup;

impl Rollup {
    /// Zero/absent rollup for a period with no data
    pub fn empty(tenant_key: TenantKey, granularity: Granularity, period_start: NaiveDate) -> Self {
        Self::from_records(tenant_key, granularity, period_start, &[])
    }

    /// Recompute a rollup from every daily record in the period
    pub fn from_records(
        tenant_key: TenantKey,
        granularity: Granularity,
        period_start: NaiveDate,
        records: &[DailyRecord],
    ) -> Self {
        Self {
            tenant_key,
            granularity,
            period_start: granularity.period_start(period_start),
            day_count: records.len() as i64,
            metrics: aggregate(records),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<Decimal> {
        self.metrics.get(metric)
    }
}

/// Numerator/denominator pairs behind each ratio metric
fn ratio_terms(metric: Metric, day: &MetricSet) -> Option<(Decimal, Decimal)> {
    let pair = |n: Metric, d: Metric| Some((day.get(n)?, day.get(d)?));
    match metric {
        Metric::GpPercent => {
            pair(Metric::GpValue, Metric::Turnover).map(|(n, d)| (n * Decimal::ONE_HUNDRED, d))
        }
        Metric::AvgBasketValue => pair(Metric::Turnover, Metric::TransactionCount),
        // Items sold per day are reconstructed from the stored average
        Metric::AvgBasketSize => pair(Metric::AvgBasketSize, Metric::TransactionCount)
            .map(|(avg, tx)| (avg * tx, tx)),
        Metric::AvgScriptValue => pair(Metric::DispensaryTurnover, Metric::ScriptCount),
        _ => None,
    }
}

/// Aggregate daily records by metric kind.
///
/// Additive metrics are summed (zero when nothing contributes), ratios are
/// recomputed from summed numerator/denominator pairs over days that have
/// both, opening stock is the first non-null value and closing stock the
/// last, in date order.
pub fn aggregate(records: &[DailyRecord]) -> MetricSet {
    let mut ordered: Vec<&DailyRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.date);

    let mut result = MetricSet::new();
    for metric in Metric::ALL {
        let value = match metric.kind() {
            MetricKind::Additive => Some(
                ordered
                    .iter()
                    .filter_map(|r| r.metrics.get(metric))
                    .sum::<Decimal>()
                    .normalize(),
            ),
            MetricKind::Ratio => {
                let (numerator, denominator, seen) = ordered
                    .iter()
                    .filter_map(|r| ratio_terms(metric, &r.metrics))
                    .fold((Decimal::ZERO, Decimal::ZERO, false), |(n, d, _), (dn, dd)| {
                        (n + dn, d + dd, true)
                    });
                if seen {
                    ratio(Some(numerator), Some(denominator))
                } else {
                    None
                }
            }
            MetricKind::Opening => ordered.iter().find_map(|r| r.metrics.get(metric)),
            MetricKind::Closing => ordered.iter().rev().find_map(|r| r.metrics.get(metric)),
        };
        result.set(metric, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn day(tenant: TenantKey, d: u32, metrics: MetricSet) -> DailyRecord {
        DailyRecord::new(tenant, NaiveDate::from_ymd_opt(2025, 8, d).unwrap(), metrics)
    }

    #[test]
    fn test_period_bounds() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();
        let month = Granularity::Month.period_start(date);
        assert_eq!(month, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(
            Granularity::Month.period_end(month).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );

        let year = Granularity::Year.period_start(date);
        assert_eq!(year, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(
            Granularity::Year.period_end(year).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_additive_metrics_sum() {
        let t = TenantKey::generate();
        let records = vec![
            day(t, 1, MetricSet::new().with(Metric::Turnover, dec("1000.50"))),
            day(t, 2, MetricSet::new().with(Metric::Turnover, dec("2000.25"))),
            day(t, 3, MetricSet::new()),
        ];
        let metrics = aggregate(&records);
        assert_eq!(metrics.get(Metric::Turnover), Some(dec("3000.75")));
        assert_eq!(metrics.get(Metric::Purchases), Some(Decimal::ZERO));
    }

    #[test]
    fn test_ratios_use_summed_pairs_not_average_of_averages() {
        let t = TenantKey::generate();
        let records = vec![
            // 10% on a tiny day
            day(
                t,
                1,
                MetricSet::new()
                    .with(Metric::Turnover, dec("100"))
                    .with(Metric::GpValue, dec("10"))
                    .with(Metric::GpPercent, dec("10")),
            ),
            // 30% on a big day
            day(
                t,
                2,
                MetricSet::new()
                    .with(Metric::Turnover, dec("9900"))
                    .with(Metric::GpValue, dec("2970"))
                    .with(Metric::GpPercent, dec("30")),
            ),
        ];
        let metrics = aggregate(&records);
        // 2980 / 10000, not (10 + 30) / 2
        assert_eq!(metrics.get(Metric::GpPercent), Some(dec("29.8")));
    }

    #[test]
    fn test_basket_size_weighted_by_transactions() {
        let t = TenantKey::generate();
        let records = vec![
            day(
                t,
                1,
                MetricSet::new()
                    .with(Metric::TransactionCount, dec("10"))
                    .with(Metric::AvgBasketSize, dec("2")),
            ),
            day(
                t,
                2,
                MetricSet::new()
                    .with(Metric::TransactionCount, dec("30"))
                    .with(Metric::AvgBasketSize, dec("4")),
            ),
        ];
        let metrics = aggregate(&records);
        // (20 + 120) / 40
        assert_eq!(metrics.get(Metric::AvgBasketSize), Some(dec("3.5")));
    }

    #[test]
    fn test_closing_stock_is_last_non_null() {
        let t = TenantKey::generate();
        let records = vec![
            day(t, 3, MetricSet::new()),
            day(t, 2, MetricSet::new().with(Metric::StockClosing, dec("800"))),
            day(
                t,
                1,
                MetricSet::new()
                    .with(Metric::StockOpening, dec("1000"))
                    .with(Metric::StockClosing, dec("900")),
            ),
        ];
        let metrics = aggregate(&records);
        assert_eq!(metrics.get(Metric::StockClosing), Some(dec("800")));
        assert_eq!(metrics.get(Metric::StockOpening), Some(dec("1000")));
    }

    #[test]
    fn test_empty_period_is_zero_and_absent() {
        let rollup = Rollup::empty(
            TenantKey::generate(),
            Granularity::Month,
            NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
        );
        assert_eq!(rollup.period_start, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
        assert_eq!(rollup.day_count, 0);
        assert_eq!(rollup.get(Metric::Turnover), Some(Decimal::ZERO));
        assert_eq!(rollup.get(Metric::GpPercent), None);
        assert_eq!(rollup.get(Metric::StockClosing), None);
    }

    #[test]
    fn test_aggregate_is_deterministic_under_input_order() {
        let t = TenantKey::generate();
        let a = day(t, 1, MetricSet::new().with(Metric::StockClosing, dec("1")));
        let b = day(t, 2, MetricSet::new().with(Metric::StockClosing, dec("2")));
        assert_eq!(
            aggregate(&[a.clone(), b.clone()]),
            aggregate(&[b, a])
        );
    }
}
