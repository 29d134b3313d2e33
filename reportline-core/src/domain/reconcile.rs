//! Field-level "keep the better value" merge.
//!
//! Plain metrics move only upward: absent never erases a stored value and the
//! larger of two readings wins. Derived ratios are not merged field by field.
//! The merge picks the source that contributed the larger turnover and takes
//! every derived field from that one source, so a percentage is never built
//! from one report's numerator and another report's denominator.
//!
//! Nothing here touches storage; the ingest service wraps it with locking
//! and a transaction.

use rust_decimal::Decimal;
use serde::Serialize;

use super::metric::{normalize, round_ratio, Metric, MetricSet};

/// Which side of a merge supplied the turnover-governing figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Stored,
    Incoming,
}

/// The result of merging one extraction into the stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub metrics: MetricSet,
    pub winner: Source,
    /// Incoming product lines replace the stored set
    pub replace_lines: bool,
    /// Anything differs from the stored state
    pub changed: bool,
}

/// One side of a merge: its metrics and the items sold on its product lines
#[derive(Debug, Clone, Copy)]
pub struct ReportSide<'a> {
    pub metrics: &'a MetricSet,
    pub items_sold: Option<Decimal>,
    pub has_lines: bool,
}

/// Merge an incoming extraction into the stored state (if any).
pub fn reconcile(stored: Option<&MetricSet>, incoming: ReportSide<'_>) -> Reconciliation {
    let Some(stored) = stored else {
        let mut metrics = plain_fields(incoming.metrics);
        apply_derived(&mut metrics, &derive_fields(incoming.metrics, incoming.items_sold));
        return Reconciliation {
            metrics,
            winner: Source::Incoming,
            replace_lines: incoming.has_lines,
            changed: true,
        };
    };

    let mut metrics = MetricSet::new();
    for metric in Metric::ALL.iter().filter(|m| !m.is_derived()) {
        metrics.set(*metric, keep_larger(stored.get(*metric), incoming.metrics.get(*metric)));
    }

    let winner = choose_winner(stored, incoming.metrics);
    let derived: MetricSet = match winner {
        // Stored derived values were computed from the earlier winning report
        Source::Stored => Metric::DERIVED
            .iter()
            .filter_map(|m| stored.get(*m).map(|v| (*m, v)))
            .collect(),
        Source::Incoming => derive_fields(incoming.metrics, incoming.items_sold),
    };
    apply_derived(&mut metrics, &derived);

    let replace_lines = winner == Source::Incoming && incoming.has_lines;
    let changed = metrics != *stored || replace_lines;

    Reconciliation {
        metrics,
        winner,
        replace_lines,
        changed,
    }
}

/// Per-field merge: absent loses, otherwise the larger value; ties keep stored
pub fn keep_larger(stored: Option<Decimal>, incoming: Option<Decimal>) -> Option<Decimal> {
    match (stored, incoming) {
        (Some(s), Some(i)) if i > s => Some(i),
        (Some(s), _) => Some(s),
        (None, i) => i,
    }
}

/// Decide which side governs the derived fields.
///
/// Only turnover counts, with absent below any value. Equal turnover keeps
/// the stored side, so a re-sent or same-sized report never displaces the
/// derived fields and lines already in place.
pub fn choose_winner(stored: &MetricSet, incoming: &MetricSet) -> Source {
    if incoming.get(Metric::Turnover) > stored.get(Metric::Turnover) {
        Source::Incoming
    } else {
        Source::Stored
    }
}

/// Compute every derived field from a single source.
///
/// Where a denominator is zero or an input is missing, the source's own
/// reported value for that field is used (if it reported one).
pub fn derive_fields(source: &MetricSet, items_sold: Option<Decimal>) -> MetricSet {
    let turnover = source.get(Metric::Turnover);
    let gp_value = source.get(Metric::GpValue);
    let transactions = source.get(Metric::TransactionCount);
    let scripts = source.get(Metric::ScriptCount);

    let mut derived = MetricSet::new();

    let gp_percent = ratio(gp_value.map(|gp| gp * Decimal::ONE_HUNDRED), turnover);
    derived.set(Metric::GpPercent, gp_percent.or(source.get(Metric::GpPercent)));

    let basket_value = ratio(turnover, transactions);
    derived.set(Metric::AvgBasketValue, basket_value.or(source.get(Metric::AvgBasketValue)));

    let basket_size = ratio(items_sold, transactions);
    derived.set(Metric::AvgBasketSize, basket_size.or(source.get(Metric::AvgBasketSize)));

    let script_value = ratio(source.get(Metric::DispensaryTurnover), scripts);
    derived.set(Metric::AvgScriptValue, script_value.or(source.get(Metric::AvgScriptValue)));

    // closing = opening + purchases - cost of sales + adjustment
    let adjustment = match (
        source.get(Metric::StockClosing),
        source.get(Metric::StockOpening),
        source.get(Metric::Purchases),
        source.get(Metric::CostOfSales),
    ) {
        (Some(closing), Some(opening), Some(purchases), Some(cost)) => {
            Some(normalize(closing - opening - purchases + cost))
        }
        _ => None,
    };
    derived.set(Metric::StockAdjustment, adjustment.or(source.get(Metric::StockAdjustment)));

    derived
}

/// numerator / denominator rounded for storage; `None` on a zero denominator
pub fn ratio(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if !d.is_zero() => n.checked_div(d).map(round_ratio),
        _ => None,
    }
}

fn plain_fields(metrics: &MetricSet) -> MetricSet {
    metrics.iter().filter(|(m, _)| !m.is_derived()).collect()
}

fn apply_derived(target: &mut MetricSet, derived: &MetricSet) {
    for metric in Metric::DERIVED {
        target.set(metric, derived.get(metric));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn side(metrics: &MetricSet) -> ReportSide<'_> {
        ReportSide {
            metrics,
            items_sold: None,
            has_lines: false,
        }
    }

    fn report_a() -> MetricSet {
        MetricSet::new()
            .with(Metric::Turnover, dec("1000"))
            .with(Metric::TransactionCount, dec("50"))
            .with(Metric::ScriptCount, dec("20"))
    }

    fn report_b() -> MetricSet {
        MetricSet::new()
            .with(Metric::Turnover, dec("30000"))
            .with(Metric::TransactionCount, dec("150"))
            .with(Metric::ScriptCount, dec("45"))
    }

    fn apply(stored: Option<&MetricSet>, incoming: &MetricSet) -> MetricSet {
        reconcile(stored, side(incoming)).metrics
    }

    #[test]
    fn test_first_extraction_is_stored_with_derived_fields() {
        let result = reconcile(None, side(&report_a()));
        assert!(result.changed);
        assert_eq!(result.winner, Source::Incoming);
        assert_eq!(result.metrics.get(Metric::Turnover), Some(dec("1000")));
        assert_eq!(result.metrics.get(Metric::AvgBasketValue), Some(dec("20")));
        assert_eq!(result.metrics.get(Metric::GpValue), None);
    }

    #[test]
    fn test_larger_report_wins_in_either_order() {
        let a_then_b = apply(Some(&apply(None, &report_a())), &report_b());
        let b_then_a = apply(Some(&apply(None, &report_b())), &report_a());

        assert_eq!(a_then_b, b_then_a);
        assert_eq!(a_then_b.get(Metric::Turnover), Some(dec("30000")));
        assert_eq!(a_then_b.get(Metric::TransactionCount), Some(dec("150")));
        assert_eq!(a_then_b.get(Metric::ScriptCount), Some(dec("45")));
        // 30000 / 150, never 30000 / 50 or 1000 / 150
        assert_eq!(a_then_b.get(Metric::AvgBasketValue), Some(dec("200")));
    }

    #[test]
    fn test_absent_never_erases() {
        let stored = apply(None, &report_b());
        let partial = MetricSet::new().with(Metric::Purchases, dec("12.50"));
        let merged = apply(Some(&stored), &partial);

        assert_eq!(merged.get(Metric::Turnover), Some(dec("30000")));
        assert_eq!(merged.get(Metric::Purchases), Some(dec("12.5")));
    }

    #[test]
    fn test_plain_fields_take_the_max_independently() {
        let stored = apply(
            None,
            &MetricSet::new()
                .with(Metric::Turnover, dec("500"))
                .with(Metric::SalesCash, dec("300")),
        );
        let incoming = MetricSet::new()
            .with(Metric::Turnover, dec("400"))
            .with(Metric::SalesCash, dec("350"));
        let merged = apply(Some(&stored), &incoming);

        assert_eq!(merged.get(Metric::Turnover), Some(dec("500")));
        assert_eq!(merged.get(Metric::SalesCash), Some(dec("350")));
    }

    #[test]
    fn test_derived_fields_follow_winner_not_max() {
        // Stored: low turnover but a tiny basket count gives a big basket value
        let stored = apply(
            None,
            &MetricSet::new()
                .with(Metric::Turnover, dec("1000"))
                .with(Metric::TransactionCount, dec("2"))
                .with(Metric::GpValue, dec("900")),
        );
        assert_eq!(stored.get(Metric::AvgBasketValue), Some(dec("500")));

        let incoming = MetricSet::new()
            .with(Metric::Turnover, dec("3000"))
            .with(Metric::TransactionCount, dec("30"))
            .with(Metric::GpValue, dec("600"));
        let merged = apply(Some(&stored), &incoming);

        assert_eq!(merged.get(Metric::AvgBasketValue), Some(dec("100")));
        // gp% comes from incoming's 600/3000, even though merged gp value is 900
        assert_eq!(merged.get(Metric::GpValue), Some(dec("900")));
        assert_eq!(merged.get(Metric::GpPercent), Some(dec("20")));
    }

    #[test]
    fn test_identical_reapply_is_unchanged() {
        let stored = apply(None, &report_b());
        let again = reconcile(Some(&stored), side(&report_b()));

        assert!(!again.changed);
        assert_eq!(again.winner, Source::Stored);
        assert_eq!(again.metrics, stored);
    }

    #[test]
    fn test_lines_replaced_only_when_incoming_wins() {
        let stored = apply(None, &report_b());

        let losing = reconcile(
            Some(&stored),
            ReportSide {
                metrics: &report_a(),
                items_sold: Some(dec("10")),
                has_lines: true,
            },
        );
        assert!(!losing.replace_lines);

        let bigger = MetricSet::new().with(Metric::Turnover, dec("40000"));
        let winning = reconcile(
            Some(&stored),
            ReportSide {
                metrics: &bigger,
                items_sold: Some(dec("10")),
                has_lines: true,
            },
        );
        assert!(winning.replace_lines);
        assert!(winning.changed);

        let winning_without_lines = reconcile(Some(&stored), side(&bigger));
        assert!(!winning_without_lines.replace_lines);
    }

    #[test]
    fn test_turnover_tie_keeps_stored() {
        let stored = MetricSet::new()
            .with(Metric::Turnover, dec("100"))
            .with(Metric::TransactionCount, dec("5"));
        let incoming = MetricSet::new()
            .with(Metric::Turnover, dec("100"))
            .with(Metric::TransactionCount, dec("8"));

        assert_eq!(choose_winner(&stored, &incoming), Source::Stored);
        assert_eq!(choose_winner(&incoming, &stored), Source::Stored);

        let stored = apply(None, &stored);
        let result = reconcile(
            Some(&stored),
            ReportSide {
                metrics: &incoming,
                items_sold: Some(dec("16")),
                has_lines: true,
            },
        );
        assert_eq!(result.winner, Source::Stored);
        assert!(!result.replace_lines);
        // the larger count is still kept as a plain field
        assert_eq!(result.metrics.get(Metric::TransactionCount), Some(dec("8")));
        // 100 / 5 from the stored report, not 100 / 8
        assert_eq!(result.metrics.get(Metric::AvgBasketValue), Some(dec("20")));
    }

    /// Every ordering of the same reports lands on the same record
    #[test]
    fn test_merge_converges_in_every_order() {
        let reports = [
            MetricSet::new()
                .with(Metric::Turnover, dec("100"))
                .with(Metric::TransactionCount, dec("5")),
            MetricSet::new()
                .with(Metric::Turnover, dec("50"))
                .with(Metric::TransactionCount, dec("20"))
                .with(Metric::GpValue, dec("40")),
            MetricSet::new()
                .with(Metric::Turnover, dec("120"))
                .with(Metric::TransactionCount, dec("10"))
                .with(Metric::ScriptCount, dec("4")),
            MetricSet::new()
                .with(Metric::Turnover, dec("80"))
                .with(Metric::GpValue, dec("30"))
                .with(Metric::DispensaryTurnover, dec("60")),
        ];

        let mut orders: Vec<Vec<usize>> = vec![vec![]];
        for _ in 0..reports.len() {
            orders = orders
                .into_iter()
                .flat_map(|order| {
                    (0..reports.len())
                        .filter(|i| !order.contains(i))
                        .map(|i| {
                            let mut next = order.clone();
                            next.push(i);
                            next
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
        }
        assert_eq!(orders.len(), 24);

        let results: Vec<MetricSet> = orders
            .iter()
            .map(|order| {
                order.iter().fold(None, |stored: Option<MetricSet>, &i| {
                    Some(apply(stored.as_ref(), &reports[i]))
                })
                .unwrap()
            })
            .collect();

        for (order, result) in orders.iter().zip(&results) {
            assert_eq!(result, &results[0], "order {:?} diverged", order);
        }
        let merged = &results[0];
        assert_eq!(merged.get(Metric::Turnover), Some(dec("120")));
        assert_eq!(merged.get(Metric::TransactionCount), Some(dec("20")));
        // derived from the 120 report alone: 120 / 10, no gp value of its own
        assert_eq!(merged.get(Metric::AvgBasketValue), Some(dec("12")));
        assert_eq!(merged.get(Metric::GpPercent), None);
        assert_eq!(merged.get(Metric::AvgScriptValue), None);
        assert_eq!(merged.get(Metric::GpValue), Some(dec("40")));
    }

    #[test]
    fn test_present_turnover_beats_absent() {
        let stored = MetricSet::new().with(Metric::TransactionCount, dec("99"));
        let incoming = MetricSet::new().with(Metric::Turnover, dec("1"));
        assert_eq!(choose_winner(&stored, &incoming), Source::Incoming);
    }

    #[test]
    fn test_derive_fields_formulas() {
        let source = MetricSet::new()
            .with(Metric::Turnover, dec("30000"))
            .with(Metric::GpValue, dec("7500"))
            .with(Metric::TransactionCount, dec("150"))
            .with(Metric::ScriptCount, dec("45"))
            .with(Metric::DispensaryTurnover, dec("9000"))
            .with(Metric::StockOpening, dec("100000"))
            .with(Metric::StockClosing, dec("98000"))
            .with(Metric::Purchases, dec("20000"))
            .with(Metric::CostOfSales, dec("22500"));

        let derived = derive_fields(&source, Some(dec("450")));
        assert_eq!(derived.get(Metric::GpPercent), Some(dec("25")));
        assert_eq!(derived.get(Metric::AvgBasketValue), Some(dec("200")));
        assert_eq!(derived.get(Metric::AvgBasketSize), Some(dec("3")));
        assert_eq!(derived.get(Metric::AvgScriptValue), Some(dec("200")));
        // 98000 - 100000 - 20000 + 22500
        assert_eq!(derived.get(Metric::StockAdjustment), Some(dec("500")));
    }

    #[test]
    fn test_derive_falls_back_to_reported_values() {
        let source = MetricSet::new()
            .with(Metric::Turnover, dec("0"))
            .with(Metric::GpValue, dec("0"))
            .with(Metric::GpPercent, dec("31.5"))
            .with(Metric::AvgBasketSize, dec("2.4"));

        let derived = derive_fields(&source, None);
        assert_eq!(derived.get(Metric::GpPercent), Some(dec("31.5")));
        assert_eq!(derived.get(Metric::AvgBasketSize), Some(dec("2.4")));
        assert_eq!(derived.get(Metric::AvgBasketValue), None);
    }

    #[test]
    fn test_ratio_rounds_half_away_from_zero() {
        assert_eq!(ratio(Some(dec("1")), Some(dec("8"))), Some(dec("0.13")));
        assert_eq!(ratio(Some(dec("1")), Some(dec("0"))), None);
        assert_eq!(ratio(None, Some(dec("3"))), None);
    }
}
