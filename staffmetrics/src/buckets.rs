//! Bucket rules that turn a continuous value (age, tenure) into a label.
//!
//! The age rule is configuration and is read through a [`BucketSource`] on
//! every call; the tenure rule is fixed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backends::BackendConnection;
use crate::error::{Result, StaffmetricsError};

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInterval {
    /// `None` means unbounded below.
    #[serde(default)]
    pub min: Option<f64>,
    /// `None` means unbounded above.
    pub max: Option<f64>,
    /// Closed `[min, max]` when true, half-open `[min, max)` otherwise.
    #[serde(default = "default_inclusive")]
    pub inclusive_max: bool,
    pub label: String,
}

fn default_inclusive() -> bool {
    true
}

impl BucketInterval {
    pub fn closed(min: f64, max: f64, label: impl Into<String>) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            inclusive_max: true,
            label: label.into(),
        }
    }

    pub fn half_open(min: Option<f64>, max: Option<f64>, label: impl Into<String>) -> Self {
        Self {
            min,
            max,
            inclusive_max: false,
            label: label.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if self.min.is_some_and(|min| value < min) {
            return false;
        }
        match self.max {
            None => true,
            Some(max) if self.inclusive_max => value <= max,
            Some(max) => value < max,
        }
    }
}

/// Ordered intervals mapped to labels, with an implicit `Unknown` fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRule {
    intervals: Vec<BucketInterval>,
}

impl BucketRule {
    /// Intervals are kept in ascending lower-bound order.
    pub fn new(mut intervals: Vec<BucketInterval>) -> Self {
        intervals.sort_by(|a, b| lower_bound(a).total_cmp(&lower_bound(b)));
        Self { intervals }
    }

    pub fn intervals(&self) -> &[BucketInterval] {
        &self.intervals
    }

    /// First matching label, or `Unknown` for null and out-of-range values.
    pub fn label_for(&self, value: Option<f64>) -> &str {
        value
            .and_then(|v| self.intervals.iter().find(|i| i.contains(v)))
            .map(|i| i.label.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// Default age brackets used when no configuration is stored.
    pub fn default_age() -> Self {
        Self::new(vec![
            BucketInterval::closed(0.0, 24.0, "Under 25"),
            BucketInterval::closed(25.0, 34.0, "25-34"),
            BucketInterval::closed(35.0, 44.0, "35-44"),
            BucketInterval::closed(45.0, 54.0, "45-54"),
            BucketInterval::closed(55.0, 64.0, "55-64"),
            BucketInterval::closed(65.0, 150.0, "65+"),
        ])
    }

    /// Tenure brackets in years. Not configurable.
    ///
    /// A start date after the reference date gives negative tenure, which
    /// still counts as under one year.
    pub fn tenure() -> Self {
        Self::new(vec![
            BucketInterval::half_open(None, Some(1.0), "Under 1 year"),
            BucketInterval::half_open(Some(1.0), Some(2.0), "1-2 years"),
            BucketInterval::half_open(Some(2.0), Some(5.0), "2-5 years"),
            BucketInterval::half_open(Some(5.0), Some(10.0), "5-10 years"),
            BucketInterval::half_open(Some(10.0), None, "Over 10 years"),
        ])
    }

    /// Configuration-time check; planning trusts whatever is stored.
    pub fn check_non_overlapping(&self) -> Result<()> {
        for pair in self.intervals.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            let overlaps = match (lower.max, upper.min) {
                (None, _) | (_, None) => true,
                (Some(max), Some(min)) if lower.inclusive_max => min <= max,
                (Some(max), Some(min)) => min < max,
            };
            if overlaps {
                return Err(StaffmetricsError::Config(format!(
                    "bucket '{}' overlaps bucket '{}'",
                    lower.label, upper.label
                )));
            }
        }
        Ok(())
    }
}

fn lower_bound(interval: &BucketInterval) -> f64 {
    interval.min.unwrap_or(f64::NEG_INFINITY)
}

/// Where the age rule comes from. Read once per request.
#[async_trait]
pub trait BucketSource: Send + Sync {
    async fn age_rule(&self) -> Result<BucketRule>;
}

/// Fixed rule, typically from the TOML config or the defaults.
#[derive(Debug, Clone)]
pub struct StaticBucketSource {
    rule: BucketRule,
}

impl StaticBucketSource {
    pub fn new(rule: BucketRule) -> Self {
        Self { rule }
    }
}

impl Default for StaticBucketSource {
    fn default() -> Self {
        Self::new(BucketRule::default_age())
    }
}

#[async_trait]
impl BucketSource for StaticBucketSource {
    async fn age_rule(&self) -> Result<BucketRule> {
        Ok(self.rule.clone())
    }
}

/// Reads `(min_age, max_age, label)` rows from a table in the record store.
#[derive(Clone)]
pub struct TableBucketSource {
    connection: Arc<dyn BackendConnection>,
    table: String,
}

impl TableBucketSource {
    pub fn new(connection: Arc<dyn BackendConnection>, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
        }
    }
}

#[async_trait]
impl BucketSource for TableBucketSource {
    async fn age_rule(&self) -> Result<BucketRule> {
        let dialect = self.connection.dialect();
        let sql = format!(
            "SELECT {min}, {max}, {label} FROM {table} ORDER BY {min}",
            min = dialect.quote_ident("min_age"),
            max = dialect.quote_ident("max_age"),
            label = dialect.quote_ident("label"),
            table = dialect.qualify_table(&self.table),
        );
        let result = self.connection.execute_sql(&sql, &[]).await?;

        let mut intervals = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let min = row.get("min_age").and_then(Value::as_f64);
            let max = row.get("max_age").and_then(Value::as_f64);
            let label = row.get("label").and_then(Value::as_str);
            match (min, max, label) {
                (Some(min), Some(max), Some(label)) => {
                    intervals.push(BucketInterval::closed(min, max, label))
                }
                _ => {
                    return Err(StaffmetricsError::Config(format!(
                        "malformed age bucket row in {}: {row:?}",
                        self.table
                    )))
                }
            }
        }

        if intervals.is_empty() {
            tracing::debug!(table = %self.table, "no stored age buckets, using defaults");
            return Ok(BucketRule::default_age());
        }
        tracing::trace!(table = %self.table, buckets = intervals.len(), "loaded age buckets");
        Ok(BucketRule::new(intervals))
    }
}
