//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "ingest": { "lockRetries": 12, "lockRetryDelayMs": 10, "maxLockRetryDelayMs": 500, "refreshRollups": true },
//!   "queries": { "defaultLimit": 20, "lowMarginThreshold": "15", "excludeDepartments": [] }
//! }
//! ```
//! Sections this crate does not know about are kept on save.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Threshold;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ingest: IngestSettings,
    #[serde(default)]
    queries: QuerySettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ingestion tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Attempts to take a (tenant, date) lock before giving up
    pub lock_retries: u32,
    pub lock_retry_delay_ms: u64,
    pub max_lock_retry_delay_ms: u64,
    /// Recompute the enclosing month and year after every changed merge
    pub refresh_rollups: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            lock_retries: 12,
            lock_retry_delay_ms: 10,
            max_lock_retry_delay_ms: 500,
            refresh_rollups: true,
        }
    }
}

impl IngestSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.lock_retries.max(1),
            initial_delay: Duration::from_millis(self.lock_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_lock_retry_delay_ms),
        }
    }
}

/// Defaults for range queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    pub default_limit: usize,
    /// Kept as text so a bad value surfaces as `InvalidThreshold` when used
    pub low_margin_threshold: String,
    pub exclude_departments: Vec<String>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            low_margin_threshold: "15".to_string(),
            exclude_departments: Vec::new(),
        }
    }
}

impl QuerySettings {
    pub fn threshold(&self) -> crate::domain::result::Result<Threshold> {
        self.low_margin_threshold.parse()
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        IngestSettings::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling and capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Reportline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub ingest: IngestSettings,
    pub queries: QuerySettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the data directory.
    ///
    /// A missing or unreadable settings file gives defaults. Environment
    /// overrides: `REPORTLINE_LOCK_RETRIES`, `REPORTLINE_REFRESH_ROLLUPS`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "settings.json is invalid, using defaults");
                SettingsFile::default()
            })
        } else {
            SettingsFile::default()
        };

        let mut ingest = raw.ingest.clone();
        if let Some(retries) = std::env::var("REPORTLINE_LOCK_RETRIES")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            ingest.lock_retries = retries;
        }
        match std::env::var("REPORTLINE_REFRESH_ROLLUPS").ok().as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => ingest.refresh_rollups = true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => ingest.refresh_rollups = false,
            _ => {}
        }

        Ok(Self {
            ingest,
            queries: raw.queries.clone(),
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory, preserving unmanaged sections
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        settings.ingest = self.ingest.clone();
        settings.queries = self.queries.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.queries.default_limit, 20);
        assert_eq!(config.ingest.max_lock_retry_delay_ms, 500);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.queries, QuerySettings::default());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "queries": { "lowMarginThreshold": "12.5", "excludeDepartments": ["PD"] } }"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.queries.default_limit, 20);
        assert_eq!(config.queries.exclude_departments, vec!["PD".to_string()]);
        assert_eq!(
            config.queries.threshold().unwrap().value(),
            "12.5".parse().unwrap()
        );
    }

    #[test]
    fn test_save_preserves_unknown_sections() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "dashboard": { "theme": "dark" } }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config.queries.default_limit = 5;
        config.save(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["dashboard"]["theme"], "dark");
        assert_eq!(value["queries"]["defaultLimit"], 5);
    }

    #[test]
    fn test_retry_policy_backoff_is_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(50));
        assert_eq!(policy.delay(40), Duration::from_millis(50));
    }
}
