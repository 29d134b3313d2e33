//! Ingest service - reconciles extraction batches into daily records
//!
//! One batch is one upstream report for one (tenant, date). It is
//! validated, merged under the (tenant, date) lock, committed in one
//! transaction, and then the enclosing rollups are refreshed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::IngestSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{
    reconcile, validate_lines, DailyRecord, DroppedField, ExtractionBatch, MetricSet,
    ProductLineCandidate, ReportSide, Source, TenantScope,
};
use crate::services::locks::KeyLocks;
use crate::services::rollup::RollupService;
use crate::services::tenant::TenantService;

/// Running ingestion counters, shared by whoever owns the process
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicUsize,
    inserted: AtomicUsize,
    updated: AtomicUsize,
    unchanged: AtomicUsize,
    failed: AtomicUsize,
    dropped_fields: AtomicUsize,
    dropped_lines: AtomicUsize,
}

/// Point-in-time copy of `IngestStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub dropped_fields: usize,
    pub dropped_lines: usize,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            received: self.received.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_fields: self.dropped_fields.load(Ordering::Relaxed),
            dropped_lines: self.dropped_lines.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &IngestOutcome) {
        let counter = match outcome.status {
            MergeStatus::Inserted => &self.inserted,
            MergeStatus::Updated => &self.updated,
            MergeStatus::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.dropped_fields
            .fetch_add(outcome.dropped_fields.len(), Ordering::Relaxed);
        self.dropped_lines
            .fetch_add(outcome.dropped_lines, Ordering::Relaxed);
    }
}

/// What a merge did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    Inserted,
    Updated,
    Unchanged,
}

/// Result of ingesting one batch
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub tenant: String,
    pub date: NaiveDate,
    pub status: MergeStatus,
    pub winner: Source,
    pub lines_replaced: bool,
    pub line_count: usize,
    pub dropped_fields: Vec<DroppedField>,
    pub dropped_lines: usize,
    /// Rollup periods left queued after this merge
    pub rollups_pending: usize,
}

/// A batch that could not be ingested
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub index: usize,
    pub tenant: String,
    pub date: Option<String>,
    pub kind: &'static str,
    pub transient: bool,
    pub message: String,
}

/// Per-batch results of `ingest_all`
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
    pub failures: Vec<IngestFailure>,
}

pub struct IngestService {
    repository: Arc<DuckDbRepository>,
    tenants: Arc<TenantService>,
    rollups: Arc<RollupService>,
    locks: Arc<KeyLocks>,
    settings: IngestSettings,
}

impl IngestService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        tenants: Arc<TenantService>,
        rollups: Arc<RollupService>,
        locks: Arc<KeyLocks>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            repository,
            tenants,
            rollups,
            locks,
            settings,
        }
    }

    /// Ingest one batch
    pub fn ingest(&self, batch: &ExtractionBatch, stats: &IngestStats) -> Result<IngestOutcome> {
        stats.received.fetch_add(1, Ordering::Relaxed);
        match self.ingest_batch(batch) {
            Ok(outcome) => {
                stats.record(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    tenant = %batch.record.tenant,
                    date = ?batch.record.date,
                    kind = e.kind(),
                    error = %e,
                    "batch rejected"
                );
                Err(e)
            }
        }
    }

    /// Ingest batches independently; one failure never stops the rest
    pub fn ingest_all(&self, batches: &[ExtractionBatch], stats: &IngestStats) -> IngestReport {
        let mut report = IngestReport::default();
        for (index, batch) in batches.iter().enumerate() {
            match self.ingest(batch, stats) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => report
                    .failures
                    .push(IngestFailure::from_error(index, batch, &e)),
            }
        }
        report
    }

    fn ingest_batch(&self, batch: &ExtractionBatch) -> Result<IngestOutcome> {
        let (tenant, scope) = self.tenants.resolve_for_write(&batch.record.tenant)?;
        let date = batch.record.report_date()?;

        let parsed = batch.record.parse_metrics();
        for dropped in &parsed.dropped {
            tracing::warn!(
                tenant = %tenant.code,
                %date,
                field = %dropped.field,
                reason = %dropped.reason,
                "dropped metric field"
            );
        }

        let mut outcome = self.merge(&scope, date, &parsed.metrics, &batch.lines)?;
        outcome.tenant = tenant.code;
        let mut dropped = parsed.dropped;
        dropped.append(&mut outcome.dropped_fields);
        outcome.dropped_fields = dropped;
        Ok(outcome)
    }

    /// Merge validated metrics and raw line candidates for (scope, date).
    ///
    /// Holds the (tenant, date) lock for the read-merge-commit sequence.
    pub fn merge(
        &self,
        scope: &TenantScope,
        date: NaiveDate,
        metrics: &MetricSet,
        candidates: &[ProductLineCandidate],
    ) -> Result<IngestOutcome> {
        let validated = validate_lines(scope.key(), date, candidates);
        for dropped in &validated.dropped_fields {
            tracing::warn!(
                tenant = %scope.key(),
                %date,
                field = %dropped.field,
                reason = %dropped.reason,
                "dropped product line data"
            );
        }

        let guard = self.locks.acquire(scope.key(), date)?;

        let stored = self.repository.get_daily_record(scope, date)?;
        let merged = reconcile(
            stored.as_ref().map(|r| &r.metrics),
            ReportSide {
                metrics,
                items_sold: validated.items_sold(),
                has_lines: !validated.lines.is_empty(),
            },
        );

        let status = match (&stored, merged.changed) {
            (None, _) => MergeStatus::Inserted,
            (Some(_), true) => MergeStatus::Updated,
            (Some(_), false) => MergeStatus::Unchanged,
        };

        if status != MergeStatus::Unchanged {
            let now = Utc::now();
            let record = DailyRecord {
                tenant_key: scope.key(),
                date,
                metrics: merged.metrics.clone(),
                created_at: stored.as_ref().map_or(now, |r| r.created_at),
                updated_at: now,
            };
            let lines = merged.replace_lines.then_some(validated.lines.as_slice());
            self.repository.commit_merge(scope, &record, lines)?;
        }
        drop(guard);

        tracing::debug!(
            tenant = %scope.key(),
            %date,
            ?status,
            winner = ?merged.winner,
            lines_replaced = merged.replace_lines,
            "merged daily record"
        );

        let rollups_pending = if status != MergeStatus::Unchanged && self.settings.refresh_rollups {
            self.rollups.after_commit(scope, date)
        } else {
            0
        };

        Ok(IngestOutcome {
            tenant: scope.key().to_string(),
            date,
            status,
            winner: merged.winner,
            lines_replaced: merged.replace_lines,
            line_count: validated.lines.len(),
            dropped_fields: validated.dropped_fields,
            dropped_lines: validated.dropped_lines,
            rollups_pending,
        })
    }
}

impl IngestFailure {
    pub fn from_error(index: usize, batch: &ExtractionBatch, err: &Error) -> Self {
        Self {
            index,
            tenant: batch.record.tenant.clone(),
            date: batch.record.date.clone(),
            kind: err.kind(),
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}
