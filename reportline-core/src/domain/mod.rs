//! Core domain entities
//!
//! Pure data structures and the merge, aggregation and ranking rules
//! that operate on them. No I/O.

mod daily;
mod department;
pub mod metric;
mod product;
pub mod ranking;
pub mod reconcile;
pub mod result;
pub mod rollup;
mod tenant;

pub use daily::{
    parse_report_date, DailyRecord, DroppedField, ExtractionBatch, ParsedMetrics,
    PartialDailyRecord,
};
pub use department::DepartmentCode;
pub use metric::{Metric, MetricKind, MetricSet};
pub use product::{items_sold, validate_lines, ProductLine, ProductLineCandidate, ValidatedLines};
pub use ranking::{DateWindow, DepartmentAggregate, ProductAggregate, Threshold};
pub use reconcile::{reconcile, Reconciliation, ReportSide, Source};
pub use rollup::{Granularity, MonthlyRollup, Rollup, YearlyRollup};
pub use tenant::{normalize_code, Tenant, TenantKey, TenantScope};
