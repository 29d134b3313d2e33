//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("Tenant is inactive: {0}")]
    InactiveTenant(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock or write contention outlasted the retry budget. Safe to retry.
    #[error("Conflict retry exhausted: {0}")]
    ConflictRetryExhausted(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid date error
    pub fn invalid_date(msg: impl Into<String>) -> Self {
        Self::InvalidDate(msg.into())
    }

    /// Whether the caller may retry the same operation unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConflictRetryExhausted(_))
    }

    /// Stable machine-readable kind, used in JSON output and event logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTenant(_) => "unknown_tenant",
            Self::InactiveTenant(_) => "inactive_tenant",
            Self::InvalidDate(_) => "invalid_date",
            Self::InvalidRange(_) => "invalid_range",
            Self::InvalidThreshold(_) => "invalid_threshold",
            Self::NotFound(_) => "not_found",
            Self::ConflictRetryExhausted(_) => "conflict_retry_exhausted",
            Self::Database(_) => "database",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Csv(_) => "csv",
            Self::Other(_) => "other",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Self::Other(format!("{:#}", other)),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                context.insert("kind".to_string(), serde_json::Value::from(e.kind()));
                context.insert("transient".to_string(), serde_json::Value::from(e.is_transient()));
                Self::fail_with_context(e.to_string(), context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_operation_result_fail() {
        let result: OperationResult<i32> = OperationResult::fail("Something went wrong");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error, Some("Something went wrong".to_string()));
    }

    #[test]
    fn test_from_result_carries_kind() {
        let ok: Result<i32> = Ok(42);
        let result: OperationResult<i32> = ok.into();
        assert!(result.success);

        let err: Result<i32> = Err(Error::ConflictRetryExhausted("busy".into()));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Conflict retry exhausted"));
        let context = result.context.unwrap();
        assert_eq!(context["kind"], "conflict_retry_exhausted");
        assert_eq!(context["transient"], true);
    }

    #[test]
    fn test_only_conflicts_are_transient() {
        assert!(Error::ConflictRetryExhausted("x".into()).is_transient());
        assert!(!Error::UnknownTenant("x".into()).is_transient());
        assert!(!Error::database("x").is_transient());
    }

    #[test]
    fn test_anyhow_roundtrip_keeps_variant() {
        let err: anyhow::Error = Error::InvalidRange("from after to".into()).into();
        let back: Error = err.into();
        assert!(matches!(back, Error::InvalidRange(_)));
    }
}
