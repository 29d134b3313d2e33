//! Department service - the department code reference table

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::DepartmentCode;

const CODE_HEADER: &str = "department code";
const NAME_HEADER: &str = "department name";

/// A parsed department CSV, before anything is written
#[derive(Debug, Clone, Default, Serialize)]
pub struct DepartmentImport {
    pub departments: Vec<DepartmentCode>,
    /// Rows with a missing or malformed code
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DepartmentImportResult {
    pub imported: usize,
    pub skipped: usize,
}

pub struct DepartmentService {
    repository: Arc<DuckDbRepository>,
}

impl DepartmentService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Parse a department CSV without writing it
    pub fn preview(&self, file_path: &Path) -> Result<DepartmentImport> {
        let mut reader = csv::Reader::from_path(file_path)?;
        let headers = reader.headers()?.clone();

        let position = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };
        let code_idx = position(CODE_HEADER)
            .ok_or_else(|| Error::validation("CSV has no 'Department Code' column"))?;
        let name_idx = position(NAME_HEADER)
            .ok_or_else(|| Error::validation("CSV has no 'Department Name' column"))?;

        let mut import = DepartmentImport::default();
        for record in reader.records() {
            let record = record?;
            let code = record.get(code_idx).unwrap_or("");
            let name = record.get(name_idx).unwrap_or("");
            match DepartmentCode::new(code, name) {
                Ok(dept) => import.departments.push(dept),
                Err(e) => {
                    tracing::debug!(code, error = %e, "skipping department row");
                    import.skipped += 1;
                }
            }
        }
        Ok(import)
    }

    /// Import a department CSV. Valid rows are upserted in one transaction.
    pub fn import_csv(&self, file_path: &Path) -> Result<DepartmentImportResult> {
        let import = self.preview(file_path)?;
        self.apply(&import)
    }

    /// Write a previewed import
    pub fn apply(&self, import: &DepartmentImport) -> Result<DepartmentImportResult> {
        let imported = self.repository.upsert_departments(&import.departments)?;
        if import.skipped > 0 {
            tracing::warn!(skipped = import.skipped, "department rows with invalid codes skipped");
        }
        Ok(DepartmentImportResult {
            imported,
            skipped: import.skipped,
        })
    }

    pub fn list(&self) -> Result<Vec<DepartmentCode>> {
        self.repository.list_departments()
    }

    pub fn lookup(&self, code: &str) -> Result<Option<DepartmentCode>> {
        self.repository.get_department(code)
    }
}
