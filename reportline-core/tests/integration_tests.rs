//! Integration tests for reportline-core services
//!
//! These tests exercise the full ingest, rollup and query path against a
//! real DuckDB file in a temporary directory.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

use reportline_core::adapters::json_source::JsonFileSource;
use reportline_core::domain::{ranking, Source};
use reportline_core::services::MergeStatus;
use reportline_core::{
    ExtractionBatch, Granularity, Metric, PartialDailyRecord, ProductLineCandidate,
    ReportlineContext, Threshold,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Open a context over a fresh data directory with tenant T1 registered
fn create_test_context(temp_dir: &TempDir) -> ReportlineContext {
    let ctx = ReportlineContext::new(temp_dir.path()).expect("Failed to open context");
    ctx.tenant_service.register("T1", "Tenant one").unwrap();
    ctx
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn report(tenant: &str, day: &str, turnover: i64, tx: i64, scripts: i64) -> ExtractionBatch {
    ExtractionBatch {
        record: PartialDailyRecord::new(tenant, day)
            .with_metric("turnover", turnover)
            .with_metric("transactions", tx)
            .with_metric("scripts", scripts),
        lines: vec![],
    }
}

fn with_lines(mut batch: ExtractionBatch, lines: Vec<ProductLineCandidate>) -> ExtractionBatch {
    batch.lines = lines;
    batch
}

fn line(code: &str, qty: i64, value: i64, gp: &str) -> ProductLineCandidate {
    ProductLineCandidate::new(code)
        .with_description(&format!("Product {}", code))
        .with_department("OTCM")
        .with_quantity(qty)
        .with_sales(value, gp)
}

// ============================================================================
// Keep-larger reconciliation
// ============================================================================

/// A then B and B then A store the same record
#[test]
fn test_merge_order_does_not_matter() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    ctx.tenant_service.register("T2", "Tenant two").unwrap();

    let a = |t: &str| report(t, "2025-08-04", 1000, 50, 20);
    let b = |t: &str| report(t, "2025-08-04", 30000, 150, 45);

    ctx.ingest(&a("T1")).unwrap();
    ctx.ingest(&b("T1")).unwrap();
    ctx.ingest(&b("T2")).unwrap();
    let second = ctx.ingest(&a("T2")).unwrap();
    assert_eq!(second.status, MergeStatus::Unchanged);
    assert_eq!(second.winner, Source::Stored);

    let (_, s1) = ctx.tenant_service.resolve("T1").unwrap();
    let (_, s2) = ctx.tenant_service.resolve("T2").unwrap();
    let r1 = ctx.report_service.get_daily(&s1, date(2025, 8, 4)).unwrap();
    let r2 = ctx.report_service.get_daily(&s2, date(2025, 8, 4)).unwrap();

    assert_eq!(r1.metrics, r2.metrics);
    assert_eq!(r1.get(Metric::Turnover), Some(Decimal::from(30000)));
    assert_eq!(r1.get(Metric::TransactionCount), Some(Decimal::from(150)));
    assert_eq!(r1.get(Metric::ScriptCount), Some(Decimal::from(45)));
    assert_eq!(r1.get(Metric::AvgBasketValue), Some(Decimal::from(200)));
}

/// Each plain field ends at the larger reading, whichever report carried it
#[test]
fn test_plain_fields_keep_the_larger_reading() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    let mut first = report("T1", "2025-08-04", 1000, 50, 20);
    first.record = first.record.with_metric("purchases", 900);
    let mut second = report("T1", "2025-08-04", 800, 60, 10);
    second.record = second.record.with_metric("purchases", 400);

    ctx.ingest(&first).unwrap();
    let outcome = ctx.ingest(&second).unwrap();
    assert_eq!(outcome.status, MergeStatus::Updated);
    assert_eq!(outcome.winner, Source::Stored);

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let record = ctx.report_service.get_daily(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(record.get(Metric::Turnover), Some(Decimal::from(1000)));
    assert_eq!(record.get(Metric::TransactionCount), Some(Decimal::from(60)));
    assert_eq!(record.get(Metric::ScriptCount), Some(Decimal::from(20)));
    assert_eq!(record.get(Metric::Purchases), Some(Decimal::from(900)));
    // Derived from the stored winner: 1000 / 50
    assert_eq!(record.get(Metric::AvgBasketValue), Some(Decimal::from(20)));
}

/// Applying the same extraction twice changes nothing
#[test]
fn test_reapplying_an_extraction_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let batch = with_lines(
        report("T1", "2025-08-04", 1000, 50, 20),
        vec![line("P1", 3, 30, "25"), line("P2", 1, 12, "40")],
    );

    ctx.ingest(&batch).unwrap();
    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let before = ctx.report_service.get_daily(&scope, date(2025, 8, 4)).unwrap();
    let lines_before = ctx.report_service.get_product_lines(&scope, date(2025, 8, 4)).unwrap();

    let again = ctx.ingest(&batch).unwrap();
    assert_eq!(again.status, MergeStatus::Unchanged);
    assert!(!again.lines_replaced);

    let after = ctx.report_service.get_daily(&scope, date(2025, 8, 4)).unwrap();
    let lines_after = ctx.report_service.get_product_lines(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(before, after);
    assert_eq!(lines_before.len(), lines_after.len());
    assert_eq!(
        lines_before.iter().map(|l| &l.product_code).collect::<Vec<_>>(),
        lines_after.iter().map(|l| &l.product_code).collect::<Vec<_>>()
    );
}

/// A winning report with no product lines keeps the stored lines
#[test]
fn test_empty_line_set_keeps_stored_lines() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    ctx.ingest(&with_lines(
        report("T1", "2025-08-04", 1000, 50, 20),
        vec![line("P1", 3, 30, "25")],
    ))
    .unwrap();
    let outcome = ctx.ingest(&report("T1", "2025-08-04", 5000, 90, 30)).unwrap();
    assert_eq!(outcome.winner, Source::Incoming);
    assert!(!outcome.lines_replaced);

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let lines = ctx.report_service.get_product_lines(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_code, "P1");
}

/// A winning report with lines replaces the stored set wholesale
#[test]
fn test_winning_lines_replace_stored_lines() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    ctx.ingest(&with_lines(
        report("T1", "2025-08-04", 1000, 50, 20),
        vec![line("P1", 3, 30, "25"), line("P2", 1, 10, "30")],
    ))
    .unwrap();
    let outcome = ctx
        .ingest(&with_lines(
            report("T1", "2025-08-04", 5000, 90, 30),
            vec![line("P3", 7, 70, "35")],
        ))
        .unwrap();
    assert!(outcome.lines_replaced);

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let lines = ctx.report_service.get_product_lines(&scope, date(2025, 8, 4)).unwrap();
    let codes: Vec<&str> = lines.iter().map(|l| l.product_code.as_str()).collect();
    assert_eq!(codes, vec!["P3"]);
}

// ============================================================================
// Rollups
// ============================================================================

/// Monthly and yearly additive fields equal the sum of the daily records
#[test]
fn test_rollups_sum_daily_records() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    ctx.ingest(&report("T1", "2025-08-01", 1000, 10, 4)).unwrap();
    ctx.ingest(&report("T1", "2025-08-02", 2000, 20, 6)).unwrap();
    ctx.ingest(&report("T1", "2025-08-31", 500, 5, 1)).unwrap();
    ctx.ingest(&report("T1", "2025-09-01", 9999, 99, 9)).unwrap();

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let august = ctx.rollup_service.get_month(&scope, date(2025, 8, 1)).unwrap();
    assert_eq!(august.day_count, 3);
    assert_eq!(august.get(Metric::Turnover), Some(Decimal::from(3500)));
    assert_eq!(august.get(Metric::TransactionCount), Some(Decimal::from(35)));
    // Ratio of sums: 3500 / 35
    assert_eq!(august.get(Metric::AvgBasketValue), Some(Decimal::from(100)));

    let year = ctx.rollup_service.get_year(&scope, date(2025, 1, 1)).unwrap();
    assert_eq!(year.day_count, 4);
    assert_eq!(year.get(Metric::Turnover), Some(Decimal::from(13499)));
}

/// Recomputing without new data yields an identical rollup
#[test]
fn test_rollup_refresh_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    ctx.ingest(&report("T1", "2025-08-01", 1000, 10, 4)).unwrap();
    ctx.ingest(&report("T1", "2025-08-05", 1500, 12, 5)).unwrap();

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let first = ctx.rollup_service.refresh_month(&scope, date(2025, 8, 1)).unwrap();
    let second = ctx.rollup_service.refresh_month(&scope, date(2025, 8, 1)).unwrap();
    assert_eq!(first, second);

    let stored = ctx.rollup_service.get_month(&scope, date(2025, 8, 1)).unwrap();
    assert_eq!(stored.metrics, first.metrics);
    assert!(ctx.doctor_service.rollup_drift().unwrap().is_empty());
}

// ============================================================================
// Range queries
// ============================================================================

#[test]
fn test_best_sellers_by_quantity_over_a_week() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    ctx.ingest(&with_lines(
        report("T1", "2025-08-01", 100, 1, 1),
        vec![line("P1", 10, 100, "30")],
    ))
    .unwrap();
    ctx.ingest(&with_lines(
        report("T1", "2025-08-02", 100, 1, 1),
        vec![line("P2", 20, 80, "20")],
    ))
    .unwrap();
    ctx.ingest(&with_lines(
        report("T1", "2025-08-03", 100, 1, 1),
        vec![line("P1", 5, 50, "30")],
    ))
    .unwrap();

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let top = ctx
        .query_service
        .best_sellers_by_quantity(&scope, date(2025, 8, 1), date(2025, 8, 7), 5)
        .unwrap();
    let ranked: Vec<(&str, Decimal)> = top
        .iter()
        .map(|p| (p.product_code.as_str(), p.total_quantity))
        .collect();
    assert_eq!(
        ranked,
        vec![("P2", Decimal::from(20)), ("P1", Decimal::from(15))]
    );
}

/// Nothing above the threshold, nothing with zero sales
#[test]
fn test_low_margin_respects_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    ctx.ingest(&with_lines(
        report("T1", "2025-08-01", 100, 1, 1),
        vec![
            line("CHEAP", 5, 50, "8"),
            line("FINE", 5, 50, "35"),
            line("FREE", 5, 0, "2"),
            line("EDGE", 1, 10, "12"),
        ],
    ))
    .unwrap();

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let threshold: Threshold = "12".parse().unwrap();
    let low = ctx
        .query_service
        .low_margin_products(&scope, date(2025, 8, 1), date(2025, 8, 1), threshold, 10, &[])
        .unwrap();

    let codes: Vec<&str> = low.iter().map(|p| p.product_code.as_str()).collect();
    assert!(codes.contains(&"CHEAP"));
    assert!(codes.contains(&"EDGE"));
    assert!(!codes.contains(&"FINE"));
    assert!(!codes.contains(&"FREE"));
    for product in &low {
        assert!(product.avg_gp_percent.unwrap() <= threshold.value());
        assert!(product.total_sales_value > Decimal::ZERO);
    }
}

#[test]
fn test_ranking_matches_pure_function() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    ctx.ingest(&with_lines(
        report("T1", "2025-08-01", 100, 1, 1),
        vec![line("A", 2, 40, "30"), line("B", 4, 20, "30")],
    ))
    .unwrap();

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let lines = ctx.report_service.get_product_lines(&scope, date(2025, 8, 1)).unwrap();
    let by_value = ctx
        .query_service
        .best_sellers_by_value(&scope, date(2025, 8, 1), date(2025, 8, 1), 10)
        .unwrap();
    assert_eq!(by_value, ranking::best_sellers_by_value(&lines, 10));
    assert_eq!(by_value[0].product_code, "A");
}

// ============================================================================
// Persistence
// ============================================================================

/// Data survives closing and reopening the store
#[test]
fn test_reopen_keeps_records_and_rollups() {
    let temp_dir = TempDir::new().unwrap();
    {
        let ctx = create_test_context(&temp_dir);
        ctx.ingest(&report("T1", "2025-08-04", 1000, 50, 20)).unwrap();
    }

    let ctx = ReportlineContext::new(temp_dir.path()).unwrap();
    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let record = ctx.report_service.get_daily(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(record.get(Metric::Turnover), Some(Decimal::from(1000)));

    let month = ctx.rollup_service.get_month(&scope, date(2025, 8, 1)).unwrap();
    assert_eq!(month.granularity, Granularity::Month);
    assert_eq!(month.get(Metric::Turnover), Some(Decimal::from(1000)));

    let status = ctx.status_service.get_status().unwrap();
    assert_eq!(status.total_tenants, 1);
    assert_eq!(status.total_daily_records, 1);
    assert!(status.db_size_bytes > 0);
}

// ============================================================================
// Hand-off files
// ============================================================================

/// A directory of JSON hand-off files ingests in path order
#[test]
fn test_ingest_from_json_directory() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);

    let inbox = temp_dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(
        inbox.join("01-small.json"),
        r#"{"tenant": "t1", "date": "2025-08-04",
            "metrics": {"turnover": 1000, "transactions": 50, "scripts": 20}}"#,
    )
    .unwrap();
    std::fs::write(
        inbox.join("02-full.json"),
        r#"[{"tenant": "T1", "date": "2025-08-04",
             "metrics": {"turnover": "R30,000.00", "transactions": 150, "scripts": 45},
             "lines": [{"product_code": "LINZ001", "description": "LINZA 10MG",
                        "department_code": "PDST", "quantity": 3, "sales_value": 120.5,
                        "gross_profit_percent": 33.61}]},
            {"tenant": "GHOST", "date": "2025-08-04", "metrics": {"turnover": 1}}]"#,
    )
    .unwrap();

    let report = ctx.ingest_from(&JsonFileSource::new(&inbox)).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].status, MergeStatus::Inserted);
    assert_eq!(report.outcomes[1].status, MergeStatus::Updated);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "unknown_tenant");

    let (_, scope) = ctx.tenant_service.resolve("T1").unwrap();
    let record = ctx.report_service.get_daily(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(record.get(Metric::Turnover), Some(Decimal::from(30000)));
    let lines = ctx.report_service.get_product_lines(&scope, date(2025, 8, 4)).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].department_code.as_deref(), Some("PDST"));

    let counts = ctx.stats.snapshot();
    assert_eq!(counts.received, 3);
    assert_eq!(counts.failed, 1);
}
