//! Tenant domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Internal tenant key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(Uuid);

impl TenantKey {
    /// Generate a fresh key
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TenantKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::UnknownTenant(s.to_string()))
    }
}

/// A business unit reporting daily figures (one pharmacy location)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub key: TenantKey,
    /// External identifier used by upstream extractors, e.g. "REITZ"
    pub code: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new active tenant with a generated key
    pub fn new(code: &str, name: impl Into<String>) -> Result<Self> {
        let code = normalize_code(code)?;
        let name = name.into();
        let name = if name.trim().is_empty() {
            code.clone()
        } else {
            name.trim().to_string()
        };

        Ok(Self {
            key: TenantKey::generate(),
            code,
            name,
            active: true,
            created_at: Utc::now(),
            deactivated_at: None,
        })
    }
}

/// Normalize an external tenant code: trimmed and upper-cased
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::validation("Tenant code cannot be empty"));
    }
    if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::validation(format!(
            "Tenant code cannot contain whitespace: {:?}",
            code
        )));
    }
    Ok(code.to_uppercase())
}

/// Proof that a tenant key was resolved against the registry.
///
/// Every tenant-scoped repository method takes a scope and binds its key
/// into the SQL it runs. Scopes can only be minted inside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    key: TenantKey,
}

impl TenantScope {
    pub(crate) fn new(key: TenantKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> TenantKey {
        self.key
    }
}
