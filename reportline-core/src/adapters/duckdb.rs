//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection, Row, Transaction};
use rust_decimal::Decimal;

use crate::config::RetryPolicy;
use crate::domain::result::{Error, Result};
use crate::domain::{
    DailyRecord, DateWindow, DepartmentCode, Granularity, Metric, MetricSet, ProductLine, Rollup,
    Tenant, TenantKey, TenantScope,
};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Whether an error message indicates a file locking issue worth retrying
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Whether a failed write lost an optimistic-concurrency race and can be re-run
fn is_write_conflict(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("conflict") || lower.contains("duplicate key") || is_retryable_error(err_msg)
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Database(err.to_string())
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// `turnover::VARCHAR, gp_value::VARCHAR, ...` in `Metric::ALL` order
fn metric_select_list(alias: &str) -> String {
    Metric::ALL
        .iter()
        .map(|m| format!("{}.{}::VARCHAR", alias, m.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn metric_column_list() -> String {
    Metric::ALL
        .iter()
        .map(|m| m.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn metric_placeholders() -> String {
    vec!["CAST(? AS DECIMAL(18,4))"; Metric::ALL.len()].join(", ")
}

fn metric_update_list() -> String {
    Metric::ALL
        .iter()
        .map(|m| format!("{c} = EXCLUDED.{c}", c = m.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn metric_params(metrics: &MetricSet) -> impl Iterator<Item = Option<String>> + '_ {
    Metric::ALL
        .into_iter()
        .map(move |m| metrics.get(m).map(|d| d.to_string()))
}

fn rollup_table(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Month => "monthly_rollups",
        Granularity::Year => "yearly_rollups",
    }
}

/// DuckDB repository implementation.
///
/// Every operation runs on its own connection cloned from the root, so
/// reads see a committed snapshot and never wait on a writer's lock.
pub struct DuckDbRepository {
    root: Mutex<Connection>,
    db_path: Option<PathBuf>,
    write_retry: RetryPolicy,
}

impl DuckDbRepository {
    /// Open (or create) a database file.
    ///
    /// Retries with exponential backoff on file locking errors, which
    /// happen when another process holds the file briefly.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        root: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        write_retry: RetryPolicy::default(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            error = %err_msg,
                            "database busy, retrying open"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// In-memory database, mainly for tests and one-off runs
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            root: Mutex::new(conn),
            db_path: None,
            write_retry: RetryPolicy::default(),
        })
    }

    /// Replace the backoff used when a write transaction conflicts
    pub fn with_write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; JSON is linked in statically
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Fresh connection to the same database
    fn connection(&self) -> Result<Connection> {
        let root = self
            .root
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
        Ok(root.try_clone()?)
    }

    /// Run a write inside one transaction, re-running it on write conflicts.
    ///
    /// The closure may run several times; each run starts from a clean
    /// transaction. Exhausting the retry budget gives `ConflictRetryExhausted`.
    fn write<T>(
        &self,
        operation: &str,
        mut op: impl FnMut(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.connection()?;
        let policy = self.write_retry;
        let mut last_conflict = String::new();

        for attempt in 0..policy.attempts {
            match run_in_transaction(&mut conn, &mut op) {
                Err(Error::Database(msg)) if is_write_conflict(&msg) => {
                    last_conflict = msg;
                    if attempt + 1 < policy.attempts {
                        let delay = policy.delay(attempt);
                        tracing::warn!(
                            operation,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "write conflict, retrying"
                        );
                        thread::sleep(delay);
                    }
                }
                other => return other,
            }
        }

        Err(Error::ConflictRetryExhausted(format!(
            "{} gave up after {} attempts: {}",
            operation, policy.attempts, last_conflict
        )))
    }

    /// Apply pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.connection()?;
        Ok(MigrationService::new(&conn).run_pending()?)
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Tenant operations ===

    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.write("insert tenant", |tx| {
            tx.execute(
                "INSERT INTO tenants (tenant_key, code, name, active, created_at, deactivated_at)
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![
                    tenant.key.to_string(),
                    tenant.code,
                    tenant.name,
                    tenant.active,
                    format_timestamp(&tenant.created_at),
                    tenant.deactivated_at.as_ref().map(format_timestamp),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_tenant_by_code(&self, code: &str) -> Result<Option<Tenant>> {
        self.query_tenants("WHERE code = ?", [code]).map(|mut t| t.pop())
    }

    pub fn get_tenant_by_key(&self, key: TenantKey) -> Result<Option<Tenant>> {
        self.query_tenants("WHERE tenant_key = ?", [key.to_string()])
            .map(|mut t| t.pop())
    }

    /// All tenants ordered by code
    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.query_tenants("", [] as [&dyn duckdb::ToSql; 0])
    }

    fn query_tenants<P: duckdb::Params>(&self, filter: &str, params: P) -> Result<Vec<Tenant>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT tenant_key, code, name, active, created_at::VARCHAR, deactivated_at::VARCHAR
             FROM tenants {} ORDER BY code",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let tenants = stmt
            .query_map(params, |row| {
                Ok(Tenant {
                    key: key_at(row, 0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                    active: row.get(3)?,
                    created_at: timestamp_at(row, 4)?,
                    deactivated_at: optional_timestamp_at(row, 5)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(tenants)
    }

    /// Flip the active flag. Returns false when the tenant does not exist.
    pub fn set_tenant_active(&self, key: TenantKey, active: bool) -> Result<bool> {
        let deactivated_at = (!active).then(|| format_timestamp(&Utc::now()));
        self.write("set tenant active", |tx| {
            let updated = tx.execute(
                "UPDATE tenants SET active = ?, deactivated_at = CAST(? AS TIMESTAMP)
                 WHERE tenant_key = ?",
                params![active, deactivated_at, key.to_string()],
            )?;
            Ok(updated > 0)
        })
    }

    // === Daily record operations ===

    pub fn get_daily_record(
        &self,
        scope: &TenantScope,
        date: NaiveDate,
    ) -> Result<Option<DailyRecord>> {
        let window = DateWindow::new(date, date)?;
        self.get_daily_records(scope, &window).map(|mut r| r.pop())
    }

    /// Daily records in the window, oldest first
    pub fn get_daily_records(
        &self,
        scope: &TenantScope,
        window: &DateWindow,
    ) -> Result<Vec<DailyRecord>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT d.tenant_key, d.report_date::VARCHAR, {}, d.created_at::VARCHAR, d.updated_at::VARCHAR
             FROM daily_records d
             WHERE d.tenant_key = ?
               AND d.report_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)
             ORDER BY d.report_date",
            metric_select_list("d")
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![
                    scope.key().to_string(),
                    window.from.to_string(),
                    window.to.to_string()
                ],
                row_to_daily_record,
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Stored report dates for the tenant, newest first
    pub fn get_report_dates(&self, scope: &TenantScope) -> Result<Vec<NaiveDate>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT report_date::VARCHAR FROM daily_records
             WHERE tenant_key = ? ORDER BY report_date DESC",
        )?;
        let dates = stmt
            .query_map([scope.key().to_string()], |row| date_at(row, 0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(dates)
    }

    pub fn get_latest_report_date(&self, scope: &TenantScope) -> Result<Option<NaiveDate>> {
        let conn = self.connection()?;
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(report_date)::VARCHAR FROM daily_records WHERE tenant_key = ?",
            [scope.key().to_string()],
            |row| row.get(0),
        )?;
        latest.map(|s| parse_date(&s)).transpose()
    }

    /// Persist one merge result: the daily record and, when given, the
    /// replacement product-line set. Both land in one transaction.
    pub fn commit_merge(
        &self,
        scope: &TenantScope,
        record: &DailyRecord,
        lines: Option<&[ProductLine]>,
    ) -> Result<()> {
        check_owner(scope, record.tenant_key)?;
        if let Some(lines) = lines {
            for line in lines {
                check_owner(scope, line.tenant_key)?;
                if line.date != record.date {
                    return Err(Error::validation(format!(
                        "product line {} is dated {}, record is {}",
                        line.product_code, line.date, record.date
                    )));
                }
            }
        }

        let upsert = format!(
            "INSERT INTO daily_records (tenant_key, report_date, {}, created_at, updated_at)
             VALUES (?, CAST(? AS DATE), {}, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             ON CONFLICT (tenant_key, report_date) DO UPDATE SET {}, updated_at = EXCLUDED.updated_at",
            metric_column_list(),
            metric_placeholders(),
            metric_update_list()
        );
        let key = scope.key().to_string();
        let date = record.date.to_string();

        self.write("commit merge", |tx| {
            let mut values: Vec<Option<String>> = vec![Some(key.clone()), Some(date.clone())];
            values.extend(metric_params(&record.metrics));
            values.push(Some(format_timestamp(&record.created_at)));
            values.push(Some(format_timestamp(&record.updated_at)));
            tx.execute(&upsert, params_from_iter(values.iter()))?;

            if let Some(lines) = lines {
                tx.execute(
                    "DELETE FROM product_lines WHERE tenant_key = ? AND report_date = CAST(? AS DATE)",
                    params![key, date],
                )?;
                let mut stmt = tx.prepare(
                    "INSERT INTO product_lines (
                        tenant_key, report_date, product_code, description, department_code,
                        quantity, sales_value, sales_cost, gross_profit, gross_profit_percent, stock_on_hand
                     ) VALUES (?, CAST(? AS DATE), ?, ?, ?,
                        CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)),
                        CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)))",
                )?;
                for line in lines {
                    stmt.execute(params![
                        key,
                        date,
                        line.product_code,
                        line.description,
                        line.department_code,
                        decimal_param(line.quantity),
                        decimal_param(line.sales_value),
                        decimal_param(line.sales_cost),
                        decimal_param(line.gross_profit),
                        decimal_param(line.gross_profit_percent),
                        decimal_param(line.stock_on_hand),
                    ])?;
                }
            }
            Ok(())
        })
    }

    // === Product line operations ===

    /// Lines for one day, ordered by product code, with department names
    pub fn get_product_lines(
        &self,
        scope: &TenantScope,
        date: NaiveDate,
    ) -> Result<Vec<ProductLine>> {
        let window = DateWindow::new(date, date)?;
        self.get_product_lines_in(scope, &window)
    }

    /// Lines in the window, ordered by date then product code
    pub fn get_product_lines_in(
        &self,
        scope: &TenantScope,
        window: &DateWindow,
    ) -> Result<Vec<ProductLine>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT p.tenant_key, p.report_date::VARCHAR, p.product_code, p.description,
                    p.department_code, d.name,
                    p.quantity::VARCHAR, p.sales_value::VARCHAR, p.sales_cost::VARCHAR,
                    p.gross_profit::VARCHAR, p.gross_profit_percent::VARCHAR, p.stock_on_hand::VARCHAR
             FROM product_lines p
             LEFT JOIN department_codes d ON d.code = p.department_code
             WHERE p.tenant_key = ?
               AND p.report_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)
             ORDER BY p.report_date, p.product_code",
        )?;
        let lines = stmt
            .query_map(
                params![
                    scope.key().to_string(),
                    window.from.to_string(),
                    window.to.to_string()
                ],
                |row| {
                    Ok(ProductLine {
                        tenant_key: key_at(row, 0)?,
                        date: date_at(row, 1)?,
                        product_code: row.get(2)?,
                        description: row.get(3)?,
                        department_code: row.get(4)?,
                        department_name: row.get(5)?,
                        quantity: decimal_at(row, 6)?,
                        sales_value: decimal_at(row, 7)?,
                        sales_cost: decimal_at(row, 8)?,
                        gross_profit: decimal_at(row, 9)?,
                        gross_profit_percent: decimal_at(row, 10)?,
                        stock_on_hand: decimal_at(row, 11)?,
                    })
                },
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(lines)
    }

    // === Rollup operations ===

    /// Insert or overwrite the rollup row for its (tenant, period)
    pub fn upsert_rollup(&self, scope: &TenantScope, rollup: &Rollup) -> Result<()> {
        check_owner(scope, rollup.tenant_key)?;
        let sql = format!(
            "INSERT INTO {} (tenant_key, period_start, day_count, {})
             VALUES (?, CAST(? AS DATE), CAST(? AS BIGINT), {})
             ON CONFLICT (tenant_key, period_start) DO UPDATE SET
                day_count = EXCLUDED.day_count, {}",
            rollup_table(rollup.granularity),
            metric_column_list(),
            metric_placeholders(),
            metric_update_list()
        );

        self.write("upsert rollup", |tx| {
            let mut values: Vec<Option<String>> = vec![
                Some(scope.key().to_string()),
                Some(rollup.period_start.to_string()),
                Some(rollup.day_count.to_string()),
            ];
            values.extend(metric_params(&rollup.metrics));
            tx.execute(&sql, params_from_iter(values.iter()))?;
            Ok(())
        })
    }

    pub fn get_rollup(
        &self,
        scope: &TenantScope,
        granularity: Granularity,
        period_start: NaiveDate,
    ) -> Result<Option<Rollup>> {
        self.query_rollups(scope, granularity, Some(period_start))
            .map(|mut r| r.pop())
    }

    /// Every stored rollup of one granularity for the tenant, oldest first
    pub fn get_rollups(&self, scope: &TenantScope, granularity: Granularity) -> Result<Vec<Rollup>> {
        self.query_rollups(scope, granularity, None)
    }

    fn query_rollups(
        &self,
        scope: &TenantScope,
        granularity: Granularity,
        period_start: Option<NaiveDate>,
    ) -> Result<Vec<Rollup>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT r.tenant_key, r.period_start::VARCHAR, r.day_count, {}
             FROM {} r
             WHERE r.tenant_key = ?
               AND (CAST(? AS DATE) IS NULL OR r.period_start = CAST(? AS DATE))
             ORDER BY r.period_start",
            metric_select_list("r"),
            rollup_table(granularity)
        );
        let start = period_start.map(|d| d.to_string());
        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params![scope.key().to_string(), start, start], |row| {
                Ok(Rollup {
                    tenant_key: key_at(row, 0)?,
                    granularity,
                    period_start: date_at(row, 1)?,
                    day_count: row.get(2)?,
                    metrics: metrics_at(row, 3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rollups)
    }

    // === Department operations ===

    /// Upsert reference rows in one transaction. Returns rows written.
    pub fn upsert_departments(&self, departments: &[DepartmentCode]) -> Result<usize> {
        self.write("upsert departments", |tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO department_codes (code, name) VALUES (?, ?)
                 ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name",
            )?;
            for dept in departments {
                stmt.execute(params![dept.code, dept.name])?;
            }
            Ok(departments.len())
        })
    }

    pub fn list_departments(&self) -> Result<Vec<DepartmentCode>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT code, name FROM department_codes ORDER BY code")?;
        let departments = stmt
            .query_map([], |row| {
                Ok(DepartmentCode {
                    code: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(departments)
    }

    pub fn get_department(&self, code: &str) -> Result<Option<DepartmentCode>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT code, name FROM department_codes WHERE code = ?")?;
        let mut rows = stmt.query_map([code.trim().to_uppercase()], |row| {
            Ok(DepartmentCode {
                code: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    // === Status operations ===

    pub fn count_rows(&self, table: StatusTable) -> Result<i64> {
        let conn = self.connection()?;
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Earliest and latest report dates across all tenants
    pub fn get_report_date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.connection()?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(report_date)::VARCHAR, MAX(report_date)::VARCHAR FROM daily_records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((
            min.map(|s| parse_date(&s)).transpose()?,
            max.map(|s| parse_date(&s)).transpose()?,
        ))
    }

    /// Database file size in bytes; zero for in-memory databases
    pub fn get_db_size(&self) -> Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }

    // === Doctor checks ===

    /// `tenant_key|date|line_count` for lines whose daily record is missing
    pub fn check_orphaned_product_lines(&self) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT p.tenant_key || '|' || p.report_date::VARCHAR || '|' || COUNT(*)::VARCHAR
             FROM product_lines p
             LEFT JOIN daily_records d
               ON d.tenant_key = p.tenant_key AND d.report_date = p.report_date
             WHERE d.tenant_key IS NULL
             GROUP BY p.tenant_key, p.report_date
             ORDER BY p.tenant_key, p.report_date",
            [] as [&dyn duckdb::ToSql; 0],
        )
    }

    /// `tenant_key|date` for daily records whose tenant is not registered
    pub fn check_orphaned_daily_records(&self) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT d.tenant_key || '|' || d.report_date::VARCHAR
             FROM daily_records d
             LEFT JOIN tenants t ON t.tenant_key = d.tenant_key
             WHERE t.tenant_key IS NULL
             ORDER BY d.tenant_key, d.report_date",
            [] as [&dyn duckdb::ToSql; 0],
        )
    }

    /// `tenant_key|date` for records before 2000 or more than a year ahead
    pub fn check_date_sanity(&self) -> Result<Vec<String>> {
        // Rust-computed date keeps ICU out of the build
        let one_year_future = (Utc::now() + chrono::Duration::days(365))
            .format("%Y-%m-%d")
            .to_string();
        self.query_strings(
            "SELECT tenant_key || '|' || report_date::VARCHAR
             FROM daily_records
             WHERE report_date > CAST(? AS DATE) OR report_date < DATE '2000-01-01'
             ORDER BY report_date
             LIMIT 100",
            [one_year_future],
        )
    }

    /// `code|line_count` for line department codes missing from the reference
    pub fn check_unknown_departments(&self) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT p.department_code || '|' || COUNT(*)::VARCHAR
             FROM product_lines p
             LEFT JOIN department_codes d ON d.code = p.department_code
             WHERE p.department_code IS NOT NULL AND d.code IS NULL
             GROUP BY p.department_code
             ORDER BY COUNT(*) DESC, p.department_code",
            [] as [&dyn duckdb::ToSql; 0],
        )
    }

    /// `code|record_count` for deactivated tenants that still hold data
    pub fn check_inactive_tenants_with_data(&self) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT t.code || '|' || COUNT(*)::VARCHAR
             FROM tenants t
             JOIN daily_records d ON d.tenant_key = t.tenant_key
             WHERE NOT t.active
             GROUP BY t.code
             ORDER BY t.code",
            [] as [&dyn duckdb::ToSql; 0],
        )
    }

    fn query_strings<P: duckdb::Params>(&self, sql: &str, params: P) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Check if a table exists in the main schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = 'main' AND table_name = ?",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Tables counted by the status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTable {
    Tenants,
    DailyRecords,
    ProductLines,
    MonthlyRollups,
    YearlyRollups,
    Departments,
}

impl StatusTable {
    fn name(&self) -> &'static str {
        match self {
            StatusTable::Tenants => "tenants",
            StatusTable::DailyRecords => "daily_records",
            StatusTable::ProductLines => "product_lines",
            StatusTable::MonthlyRollups => "monthly_rollups",
            StatusTable::YearlyRollups => "yearly_rollups",
            StatusTable::Departments => "department_codes",
        }
    }
}

fn run_in_transaction<T>(
    conn: &mut Connection,
    op: &mut impl FnMut(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction()?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn check_owner(scope: &TenantScope, owner: TenantKey) -> Result<()> {
    if owner != scope.key() {
        return Err(Error::validation(format!(
            "row for tenant {} written under scope {}",
            owner,
            scope.key()
        )));
    }
    Ok(())
}

// Helper functions

fn decimal_param(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_at(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<Decimal>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            Decimal::from_str_exact(&s)
                .or_else(|_| Decimal::from_str(&s))
                .map(|d| d.normalize())
                .map_err(|e| conversion_error(idx, e))
        })
        .transpose()
}

fn date_at(row: &Row<'_>, idx: usize) -> duckdb::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn key_at(row: &Row<'_>, idx: usize) -> duckdb::Result<TenantKey> {
    let s: String = row.get(idx)?;
    uuid::Uuid::parse_str(&s)
        .map(TenantKey::from_uuid)
        .map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_naive_datetime(&s)
        .map(|dt| dt.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            parse_naive_datetime(&s)
                .map(|dt| dt.and_utc())
                .map_err(|e| conversion_error(idx, e))
        })
        .transpose()
}

fn metrics_at(row: &Row<'_>, first: usize) -> duckdb::Result<MetricSet> {
    let mut metrics = MetricSet::new();
    for (offset, metric) in Metric::ALL.into_iter().enumerate() {
        metrics.set(metric, decimal_at(row, first + offset)?);
    }
    Ok(metrics)
}

fn row_to_daily_record(row: &Row<'_>) -> duckdb::Result<DailyRecord> {
    let after_metrics = 2 + Metric::ALL.len();
    Ok(DailyRecord {
        tenant_key: key_at(row, 0)?,
        date: date_at(row, 1)?,
        metrics: metrics_at(row, 2)?,
        created_at: timestamp_at(row, after_metrics)?,
        updated_at: timestamp_at(row, after_metrics + 1)?,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("bad stored date {:?}: {}", s, e)))
}

fn parse_naive_datetime(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    // Formats DuckDB produces for TIMESTAMP::VARCHAR
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}
