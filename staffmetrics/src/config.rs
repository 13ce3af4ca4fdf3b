//! Configuration system for staffmetrics.
//!
//! Supports TOML-based configuration for the record store and bucket rules.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buckets::{BucketInterval, BucketRule};
use crate::error::{Result, StaffmetricsError};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub buckets: BucketConfig,
}

/// Record-store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB database file (default: `staffmetrics.duckdb`).
    pub path: PathBuf,
    /// Table holding one row per employee (default: `employees`).
    pub table: String,
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

/// Bucket rule configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Table with `(min_age, max_age, label)` rows, read on every request.
    /// When unset, the inline `age` brackets (or the defaults) are used.
    pub age_table: Option<String>,
    /// Inline age brackets as closed `[min, max]` intervals.
    pub age: Vec<AgeBracket>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgeBracket {
    pub min: u32,
    pub max: u32,
    pub label: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("staffmetrics.duckdb"),
            table: "employees".to_string(),
            max_concurrency: 16,
        }
    }
}

impl BucketConfig {
    /// Inline age rule, checked for overlaps. Defaults when none configured.
    pub fn age_rule(&self) -> Result<BucketRule> {
        if self.age.is_empty() {
            return Ok(BucketRule::default_age());
        }
        let rule = BucketRule::new(
            self.age
                .iter()
                .map(|b| BucketInterval::closed(b.min as f64, b.max as f64, b.label.clone()))
                .collect(),
        );
        rule.check_non_overlapping()?;
        Ok(rule)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StaffmetricsError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| StaffmetricsError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `STAFFMETRICS_CONFIG` environment variable
    /// 2. `./staffmetrics.toml` (current directory)
    /// 3. `~/.config/staffmetrics/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("STAFFMETRICS_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from STAFFMETRICS_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring STAFFMETRICS_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("staffmetrics.toml") {
            tracing::info!("loaded config from ./staffmetrics.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("staffmetrics").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }
}
