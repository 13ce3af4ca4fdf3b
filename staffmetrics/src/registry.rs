//! Whitelist of every metric and dimension the engine understands.
//!
//! Identifiers outside this catalog are rejected before any SQL is built, and
//! the SQL builder only ever interpolates column names declared here.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;

use crate::error::{Result, StaffmetricsError};
use crate::sql_ast::Aggregation;

/// Group-by sentinel meaning "one total row".
pub const ALL_DIMENSION: &str = "all";
pub const ALL_DIMENSION_LABEL: &str = "All (total)";
/// Key of the single entry returned for an ungrouped analysis.
pub const ALL_GROUP_KEY: &str = "All";

/// Physical columns of the employee table.
pub mod columns {
    pub const SALARY: &str = "salary";
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const IS_MANAGER: &str = "is_manager";
    pub const WEEKLY_HOURS: &str = "weekly_hours";
    pub const EMPLOYMENT_START: &str = "employment_start";
    pub const EMPLOYMENT_END: &str = "employment_end";
    pub const IS_ACTIVE: &str = "is_active";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Whole counts.
    Integer,
    /// Percentages and durations in years.
    OneDecimal,
    /// Everything else: rounded to zero decimals, kept as a float.
    Whole,
}

impl Rounding {
    /// Round an aggregate for presentation. A missing aggregate reads as zero.
    pub fn apply(&self, value: Option<f64>) -> serde_json::Value {
        let value = value.filter(|v| v.is_finite()).unwrap_or(0.0);
        match self {
            Rounding::Integer => serde_json::Value::from(value.round() as i64),
            Rounding::OneDecimal => serde_json::Value::from((value * 10.0).round() / 10.0),
            Rounding::Whole => serde_json::Value::from(value.round()),
        }
    }
}

/// Per-row quantity a metric aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Column(&'static str),
    /// Years from employment start to the reference date (or the end date, if earlier).
    TenureYears,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTemplate {
    CountRows,
    Of(Aggregation, ValueSource),
    /// `100 * share of rows where column = value`.
    Percentage {
        column: &'static str,
        equals: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Median,
}

impl Reducer {
    /// Reduce a non-empty set of values. Returns `None` for an empty slice.
    pub fn reduce(&self, values: &mut [f64]) -> Option<f64> {
        match self {
            Reducer::Median => {
                if values.is_empty() {
                    return None;
                }
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Some(values[mid])
                }
            }
        }
    }
}

/// Whether the store can compute the metric or the engine reduces raw rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Pushdown(AggregateTemplate),
    PostAggregate {
        value: ValueSource,
        reducer: Reducer,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: MetricKind,
    /// Columns that must be non-null for a row to count toward the metric.
    pub null_guards: &'static [&'static str],
    pub rounding: Rounding,
}

impl MetricDefinition {
    pub fn requires_post_aggregation(&self) -> bool {
        matches!(self.kind, MetricKind::PostAggregate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Age,
    Tenure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionSource {
    Column(&'static str),
    /// Derived at query time from a bucket rule; never filterable.
    Computed(BucketKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub source: DimensionSource,
    pub null_guards: &'static [&'static str],
}

impl DimensionDefinition {
    pub fn column(&self) -> Option<&'static str> {
        match self.source {
            DimensionSource::Column(col) => Some(col),
            DimensionSource::Computed(_) => None,
        }
    }

    pub fn is_filterable(&self) -> bool {
        self.column().is_some()
    }
}

/// Primary grouping of a request: a dimension or the "one total row" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grouping<'r> {
    All,
    Dimension(&'r DimensionDefinition),
}

impl<'r> Grouping<'r> {
    pub fn id(&self) -> &'r str {
        match self {
            Grouping::All => ALL_DIMENSION,
            Grouping::Dimension(dim) => dim.id,
        }
    }

    pub fn label(&self) -> &'r str {
        match self {
            Grouping::All => ALL_DIMENSION_LABEL,
            Grouping::Dimension(dim) => dim.label,
        }
    }
}

/// `id` + `label` pair used for option listings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Registry {
    metrics: Vec<MetricDefinition>,
    dimensions: Vec<DimensionDefinition>,
    metric_index: HashMap<&'static str, usize>,
    dimension_index: HashMap<&'static str, usize>,
}

static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::new(builtin_metrics(), builtin_dimensions()));

impl Registry {
    pub fn new(metrics: Vec<MetricDefinition>, dimensions: Vec<DimensionDefinition>) -> Self {
        let metric_index = metrics.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let dimension_index = dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();
        Self {
            metrics,
            dimensions,
            metric_index,
            dimension_index,
        }
    }

    /// The built-in catalog, constructed once per process.
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn dimensions(&self) -> &[DimensionDefinition] {
        &self.dimensions
    }

    pub fn filter_dimensions(&self) -> impl Iterator<Item = &DimensionDefinition> {
        self.dimensions.iter().filter(|d| d.is_filterable())
    }

    pub fn metric(&self, id: &str) -> Result<&MetricDefinition> {
        self.metric_index
            .get(id)
            .map(|&i| &self.metrics[i])
            .ok_or_else(|| {
                StaffmetricsError::not_allowed("metric", id, self.metrics.iter().map(|m| m.id))
            })
    }

    /// Resolve a group-by id, accepting the `all` sentinel.
    pub fn grouping(&self, id: &str) -> Result<Grouping<'_>> {
        if id == ALL_DIMENSION {
            return Ok(Grouping::All);
        }
        match self.dimension_index.get(id) {
            Some(&i) => Ok(Grouping::Dimension(&self.dimensions[i])),
            None => Err(StaffmetricsError::not_allowed(
                "group_by",
                id,
                self.dimensions
                    .iter()
                    .map(|d| d.id)
                    .chain(std::iter::once(ALL_DIMENSION)),
            )),
        }
    }

    pub fn split(&self, id: &str) -> Result<&DimensionDefinition> {
        self.dimension_index
            .get(id)
            .map(|&i| &self.dimensions[i])
            .ok_or_else(|| {
                StaffmetricsError::not_allowed("split_by", id, self.dimensions.iter().map(|d| d.id))
            })
    }

    /// Column behind a filterable dimension.
    pub fn filter_column(&self, id: &str) -> Result<&'static str> {
        self.column_dimension("filter", id)
    }

    /// Column behind a column-backed dimension; errors name `field`.
    pub fn column_dimension(&self, field: &str, id: &str) -> Result<&'static str> {
        self.dimension_index
            .get(id)
            .and_then(|&i| self.dimensions[i].column())
            .ok_or_else(|| {
                StaffmetricsError::not_allowed(field, id, self.filter_dimensions().map(|d| d.id))
            })
    }

    pub fn metric_entries(&self) -> Vec<CatalogEntry> {
        self.metrics.iter().map(|m| entry(m.id, m.label)).collect()
    }

    /// Dimensions followed by the `all` sentinel.
    pub fn dimension_entries(&self) -> Vec<CatalogEntry> {
        self.dimensions
            .iter()
            .map(|d| entry(d.id, d.label))
            .chain(std::iter::once(entry(ALL_DIMENSION, ALL_DIMENSION_LABEL)))
            .collect()
    }

    pub fn filter_entries(&self) -> Vec<CatalogEntry> {
        self.filter_dimensions().map(|d| entry(d.id, d.label)).collect()
    }

    /// Every physical column the catalog can reference.
    pub fn referenced_columns(&self) -> BTreeSet<&'static str> {
        let mut cols: BTreeSet<&'static str> = [
            columns::EMPLOYMENT_START,
            columns::EMPLOYMENT_END,
            columns::IS_ACTIVE,
        ]
        .into_iter()
        .collect();
        for metric in &self.metrics {
            cols.extend(metric.null_guards.iter().copied());
            match metric.kind {
                MetricKind::Pushdown(AggregateTemplate::Of(_, ValueSource::Column(col)))
                | MetricKind::PostAggregate {
                    value: ValueSource::Column(col),
                    ..
                } => {
                    cols.insert(col);
                }
                MetricKind::Pushdown(AggregateTemplate::Percentage { column, .. }) => {
                    cols.insert(column);
                }
                _ => {}
            }
        }
        for dim in &self.dimensions {
            cols.extend(dim.null_guards.iter().copied());
            if let Some(col) = dim.column() {
                cols.insert(col);
            }
        }
        cols
    }
}

fn entry(id: &str, label: &str) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        label: label.to_string(),
    }
}

fn builtin_metrics() -> Vec<MetricDefinition> {
    use columns::*;

    let salary = ValueSource::Column(SALARY);
    let age = ValueSource::Column(AGE);
    vec![
        MetricDefinition {
            id: "count",
            label: "Headcount",
            kind: MetricKind::Pushdown(AggregateTemplate::CountRows),
            null_guards: &[],
            rounding: Rounding::Integer,
        },
        MetricDefinition {
            id: "avg_salary",
            label: "Average salary",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(Aggregation::Avg, salary)),
            null_guards: &[SALARY],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "min_salary",
            label: "Lowest salary",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(Aggregation::Min, salary)),
            null_guards: &[SALARY],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "max_salary",
            label: "Highest salary",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(Aggregation::Max, salary)),
            null_guards: &[SALARY],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "sum_salary",
            label: "Total payroll",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(Aggregation::Sum, salary)),
            null_guards: &[SALARY],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "median_salary",
            label: "Median salary",
            kind: MetricKind::PostAggregate {
                value: salary,
                reducer: Reducer::Median,
            },
            null_guards: &[SALARY],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "avg_age",
            label: "Average age",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(Aggregation::Avg, age)),
            null_guards: &[AGE],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "median_age",
            label: "Median age",
            kind: MetricKind::PostAggregate {
                value: age,
                reducer: Reducer::Median,
            },
            null_guards: &[AGE],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "avg_tenure",
            label: "Average tenure (years)",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(
                Aggregation::Avg,
                ValueSource::TenureYears,
            )),
            null_guards: &[EMPLOYMENT_START],
            rounding: Rounding::OneDecimal,
        },
        MetricDefinition {
            id: "avg_work_hours",
            label: "Average weekly hours",
            kind: MetricKind::Pushdown(AggregateTemplate::Of(
                Aggregation::Avg,
                ValueSource::Column(WEEKLY_HOURS),
            )),
            null_guards: &[WEEKLY_HOURS],
            rounding: Rounding::Whole,
        },
        MetricDefinition {
            id: "pct_female",
            label: "Share of women (%)",
            kind: MetricKind::Pushdown(AggregateTemplate::Percentage {
                column: GENDER,
                equals: "Female",
            }),
            null_guards: &[GENDER],
            rounding: Rounding::OneDecimal,
        },
        MetricDefinition {
            id: "pct_leaders",
            label: "Share of managers (%)",
            kind: MetricKind::Pushdown(AggregateTemplate::Percentage {
                column: IS_MANAGER,
                equals: "Yes",
            }),
            null_guards: &[IS_MANAGER],
            rounding: Rounding::OneDecimal,
        },
    ]
}

fn builtin_dimensions() -> Vec<DimensionDefinition> {
    fn plain(id: &'static str, label: &'static str) -> DimensionDefinition {
        DimensionDefinition {
            id,
            label,
            source: DimensionSource::Column(id),
            null_guards: &[],
        }
    }

    vec![
        plain("department", "Department"),
        plain("legal_entity", "Company"),
        plain("work_country", "Country"),
        plain("gender", "Gender"),
        DimensionDefinition {
            id: "age_group",
            label: "Age group",
            source: DimensionSource::Computed(BucketKind::Age),
            null_guards: &[columns::AGE],
        },
        plain("job_family", "Job family"),
        plain("employment_type", "Employment type"),
        plain("is_manager", "Manager / non-manager"),
        plain("cost_center", "Cost center"),
        DimensionDefinition {
            id: "tenure_group",
            label: "Tenure",
            source: DimensionSource::Computed(BucketKind::Tenure),
            null_guards: &[columns::EMPLOYMENT_START],
        },
        plain("employment_level", "Employment level"),
        plain("nationality", "Nationality"),
        plain("work_location", "Work location"),
        plain("division", "Division"),
        plain("role", "Role"),
    ]
}
