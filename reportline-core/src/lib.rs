//! Reportline Core - reconciliation, rollups and range queries for
//! multi-tenant pharmacy daily reports
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities and pure logic (metrics, reconcile, rollup aggregation, rankings)
//! - **ports**: Trait definitions for external dependencies (ExtractionSource)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, JSON hand-off files)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use config::Config;
use ports::ExtractionSource;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    DailyRecord, DateWindow, DepartmentCode, ExtractionBatch, Granularity, Metric, MetricSet,
    PartialDailyRecord, ProductLine, ProductLineCandidate, Rollup, Tenant, TenantKey, TenantScope,
    Threshold,
};

/// Database file inside the data directory
pub const DB_FILENAME: &str = "reportline.duckdb";

/// Main context for Reportline operations
///
/// This is the primary entry point for all business logic. It holds the
/// database handle, configuration, all services, and the process-lifetime
/// state they share (ingest counters, pending rollups, key locks).
pub struct ReportlineContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub tenant_service: Arc<TenantService>,
    pub ingest_service: IngestService,
    pub rollup_service: Arc<RollupService>,
    pub report_service: ReportService,
    pub query_service: RangeQueryService,
    pub department_service: DepartmentService,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
    pub stats: Arc<IngestStats>,
    pub pending: Arc<PendingRollups>,
    pub locks: Arc<KeyLocks>,
}

impl ReportlineContext {
    /// Open (or create) the store in `data_dir`
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let db_path = data_dir.join(DB_FILENAME);
        let repository = DuckDbRepository::new(&db_path)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Self::with_repository(config, repository)
    }

    /// A throwaway in-memory store, used by tests and dry runs
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_repository(config, DuckDbRepository::in_memory()?)
    }

    fn with_repository(config: Config, repository: DuckDbRepository) -> Result<Self> {
        let policy = config.ingest.retry_policy();
        let repository = Arc::new(repository.with_write_retry(policy));

        // Initialize schema
        repository
            .ensure_schema()
            .context("Failed to apply migrations")?;

        let stats = Arc::new(IngestStats::new());
        let pending = Arc::new(PendingRollups::new());
        let locks = Arc::new(KeyLocks::new(policy));

        // Create services
        let tenant_service = Arc::new(TenantService::new(Arc::clone(&repository)));
        let rollup_service = Arc::new(RollupService::new(
            Arc::clone(&repository),
            Arc::clone(&pending),
        ));
        let ingest_service = IngestService::new(
            Arc::clone(&repository),
            Arc::clone(&tenant_service),
            Arc::clone(&rollup_service),
            Arc::clone(&locks),
            config.ingest.clone(),
        );
        let report_service = ReportService::new(Arc::clone(&repository));
        let query_service = RangeQueryService::new(Arc::clone(&repository));
        let department_service = DepartmentService::new(Arc::clone(&repository));
        let status_service = StatusService::new(Arc::clone(&repository));
        let doctor_service = DoctorService::new(
            Arc::clone(&repository),
            Arc::clone(&tenant_service),
            Arc::clone(&rollup_service),
        );

        Ok(Self {
            config,
            repository,
            tenant_service,
            ingest_service,
            rollup_service,
            report_service,
            query_service,
            department_service,
            status_service,
            doctor_service,
            stats,
            pending,
            locks,
        })
    }

    /// Fetch every batch from `source` and ingest it, counting into `self.stats`
    pub fn ingest_from(&self, source: &dyn ExtractionSource) -> domain::result::Result<IngestReport> {
        let batches = source.fetch()?;
        tracing::info!(source = source.name(), batches = batches.len(), "ingesting");
        Ok(self.ingest_service.ingest_all(&batches, &self.stats))
    }

    /// Ingest a single batch, counting into `self.stats`
    pub fn ingest(&self, batch: &ExtractionBatch) -> domain::result::Result<IngestOutcome> {
        self.ingest_service.ingest(batch, &self.stats)
    }
}
