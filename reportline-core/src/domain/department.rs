//! Department reference data

use serde::{Deserialize, Serialize};

use super::product::is_department_code;
use super::result::{Error, Result};

/// A 4-character department code and its category name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCode {
    pub code: String,
    pub name: String,
}

impl DepartmentCode {
    pub fn new(code: &str, name: &str) -> Result<Self> {
        let code = code.trim().to_uppercase();
        if !is_department_code(&code) {
            return Err(Error::validation(format!(
                "department code must be 4 letters or digits, got {:?}",
                code
            )));
        }
        let name = name.trim();
        Ok(Self {
            name: if name.is_empty() { code.clone() } else { name.to_string() },
            code,
        })
    }
}
