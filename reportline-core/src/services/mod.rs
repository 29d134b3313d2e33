//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and the repository. Each service
//! focuses on a specific use case or feature area. Tenant-scoped services
//! take a `TenantScope` obtained from `TenantService`.

mod department;
mod doctor;
pub mod ingest;
pub mod locks;
pub mod logging;
pub mod migration;
mod query;
mod report;
pub mod rollup;
mod status;
mod tenant;

pub use department::{DepartmentImport, DepartmentImportResult, DepartmentService};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary, RollupDrift};
pub use ingest::{
    IngestCounts, IngestFailure, IngestOutcome, IngestReport, IngestService, IngestStats,
    MergeStatus,
};
pub use locks::{KeyGuard, KeyLocks};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use query::RangeQueryService;
pub use report::{KpiSummary, RangeSummary, ReportService, SeriesPoint};
pub use rollup::{PendingRollups, RefreshSummary, RollupService};
pub use status::{DateRange, StatusService, StatusSummary, TenantSummary};
pub use tenant::TenantService;
