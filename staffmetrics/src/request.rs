//! Request types and the checks done before a request reaches the planner.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StaffmetricsError};
use crate::registry::ALL_DIMENSION;

pub const SNAPSHOT_DATE_FORMAT: &str = "%Y-%m-%d";

/// One filter entry: a single value, or a set meaning "any of".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Any(Vec<String>),
}

impl FilterValue {
    /// Split a comma-separated query-string value into a filter entry.
    ///
    /// Blank entries are dropped; a single remaining entry becomes `One`.
    pub fn from_csv(raw: &str) -> Self {
        let mut values: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if values.len() == 1 {
            FilterValue::One(values.remove(0))
        } else {
            FilterValue::Any(values)
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            FilterValue::One(v) => std::slice::from_ref(v),
            FilterValue::Any(vs) => vs,
        }
    }
}

/// Filter id → value(s). Iteration order is the order parameters are bound.
pub type FilterSpec = BTreeMap<String, FilterValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub metric: String,
    /// Dimension id, or `all` for one total row.
    pub group_by: String,
    #[serde(default)]
    pub split_by: Option<String>,
    #[serde(default)]
    pub filters: FilterSpec,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    /// Overrides `active_only` when present.
    #[serde(default)]
    pub snapshot_date: Option<NaiveDate>,
}

fn default_active_only() -> bool {
    true
}

impl AnalysisRequest {
    pub fn new(metric: impl Into<String>, group_by: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            group_by: group_by.into(),
            split_by: None,
            filters: FilterSpec::new(),
            active_only: true,
            snapshot_date: None,
        }
    }

    pub fn total(metric: impl Into<String>) -> Self {
        Self::new(metric, ALL_DIMENSION)
    }

    pub fn split_by(mut self, dimension: impl Into<String>) -> Self {
        self.split_by = Some(dimension.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn filter_one(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(key, FilterValue::One(value.into()))
    }

    pub fn filter_any<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter(key, FilterValue::Any(values.into_iter().map(Into::into).collect()))
    }

    pub fn active_only(mut self, active_only: bool) -> Self {
        self.active_only = active_only;
        self
    }

    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.snapshot_date = Some(date);
        self
    }
}

/// Parse a caller-supplied snapshot date. Only `YYYY-MM-DD` is accepted.
pub fn parse_snapshot_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), SNAPSHOT_DATE_FORMAT)
        .map_err(|_| StaffmetricsError::InvalidSnapshotDate(raw.to_string()))
}

/// Turnover over the closed period `[start_date, end_date]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Filterable dimension to break hires and departures down by.
    #[serde(default)]
    pub group_by: Option<String>,
}

impl ChurnRequest {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            group_by: None,
        }
    }

    /// The calendar month `year-month`, first to last day.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let invalid = || StaffmetricsError::Validation {
            field: "month".to_string(),
            value: format!("{year}-{month:02}"),
            allowed: vec!["a calendar month (YYYY-MM)".to_string()],
        };
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;
        Ok(Self::new(start, end))
    }

    pub fn group_by(mut self, dimension: impl Into<String>) -> Self {
        self.group_by = Some(dimension.into());
        self
    }
}

/// Untyped request as it arrives from a query string or JSON body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisQuery {
    pub metric: String,
    pub group_by: String,
    #[serde(default)]
    pub split_by: Option<String>,
    /// Filter id → comma-separated values.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub active_only: Option<bool>,
    #[serde(default)]
    pub snapshot_date: Option<String>,
}

impl TryFrom<AnalysisQuery> for AnalysisRequest {
    type Error = StaffmetricsError;

    fn try_from(query: AnalysisQuery) -> Result<Self> {
        let snapshot_date = query
            .snapshot_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_snapshot_date)
            .transpose()?;
        Ok(AnalysisRequest {
            metric: query.metric,
            group_by: query.group_by,
            split_by: query.split_by.filter(|s| !s.is_empty()),
            filters: query
                .filters
                .iter()
                .map(|(k, v)| (k.clone(), FilterValue::from_csv(v)))
                .collect(),
            active_only: query.active_only.unwrap_or(true),
            snapshot_date,
        })
    }
}
