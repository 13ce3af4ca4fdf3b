//! Distinct filter values and the option listing a UI builds its dropdowns from.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;

use crate::backends::BackendConnection;
use crate::error::{Result, StaffmetricsError};
use crate::query_builder::{QueryPlanner, VALUE_ALIAS};
use crate::registry::{CatalogEntry, Registry};

/// Filter id → sorted distinct values in the population.
pub type FilterValues = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOptions {
    pub metrics: Vec<CatalogEntry>,
    /// Groupable dimensions with the `all` sentinel last.
    pub dimensions: Vec<CatalogEntry>,
    pub filter_dimensions: Vec<CatalogEntry>,
    pub filter_values: FilterValues,
}

/// Distinct non-null values of every filterable dimension.
///
/// Uses the same population rule as analyses: a snapshot date wins over
/// `active_only`. One query per dimension, run concurrently.
pub async fn list_values(
    registry: &Registry,
    planner: &QueryPlanner<'_>,
    connection: &dyn BackendConnection,
    active_only: bool,
    snapshot_date: Option<NaiveDate>,
) -> Result<FilterValues> {
    let lookups = registry.filter_dimensions().filter_map(|dim| {
        let column = dim.column()?;
        let query =
            planner.distinct_values(column, active_only, snapshot_date, connection.dialect());
        Some(async move {
            let result = connection.execute_sql(&query.sql, &query.params).await?;
            let values: Vec<String> = result
                .rows
                .iter()
                .filter_map(|row| match row.get(VALUE_ALIAS)? {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            Ok::<_, StaffmetricsError>((dim.id.to_string(), values))
        })
    });

    let values: FilterValues = try_join_all(lookups).await?.into_iter().collect();
    tracing::debug!(dimensions = values.len(), active_only, "listed filter values");
    Ok(values)
}

pub async fn options(
    registry: &Registry,
    planner: &QueryPlanner<'_>,
    connection: &dyn BackendConnection,
    active_only: bool,
    snapshot_date: Option<NaiveDate>,
) -> Result<AnalysisOptions> {
    let filter_values =
        list_values(registry, planner, connection, active_only, snapshot_date).await?;
    Ok(AnalysisOptions {
        metrics: registry.metric_entries(),
        dimensions: registry.dimension_entries(),
        filter_dimensions: registry.filter_entries(),
        filter_values,
    })
}
