use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::buckets::BucketRule;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::{Result, StaffmetricsError};
use crate::registry::{columns, DimensionDefinition, Grouping, MetricDefinition, Reducer, Registry};
use crate::request::{AnalysisRequest, ChurnRequest, SNAPSHOT_DATE_FORMAT};
use crate::sql_ast::{RenderedQuery, SqlRenderer};

mod filters;
mod measures;
mod plan;
mod planner;
mod resolve;

pub use plan::{GROUP_ALIAS, SPLIT_ALIAS, VALUE_ALIAS};

/// Fully parameterized query for one analysis request.
#[derive(Debug, Clone)]
pub struct PlannedQuery<'r> {
    pub metric: &'r MetricDefinition,
    pub grouping: Grouping<'r>,
    pub split: Option<&'r DimensionDefinition>,
    pub sql: String,
    pub params: Vec<Value>,
    /// Set when the store returns raw rows and the executor must reduce them.
    pub reducer: Option<Reducer>,
}

impl PlannedQuery<'_> {
    pub fn is_grouped(&self) -> bool {
        !matches!(self.grouping, Grouping::All)
    }
}

/// Departures, hires and headcount for one churn period.
#[derive(Debug, Clone)]
pub struct ChurnQueries {
    /// Column the counts are grouped by, when the request asked for one.
    pub group_column: Option<&'static str>,
    pub terminated: RenderedQuery,
    pub hired: RenderedQuery,
    pub headcount: RenderedQuery,
}

/// Turns requests into SQL for one employee table.
///
/// Tenure without a snapshot date is measured to `today`, which is taken from
/// the local clock when the planner is built and bound like any other date.
pub struct QueryPlanner<'r> {
    registry: &'r Registry,
    table: String,
    today: NaiveDate,
}

impl<'r> QueryPlanner<'r> {
    pub fn new(registry: &'r Registry, table: impl Into<String>) -> Self {
        Self {
            registry,
            table: table.into(),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Plan against the DuckDB dialect.
    pub fn plan(
        &self,
        request: &AnalysisRequest,
        age_rule: &BucketRule,
    ) -> Result<PlannedQuery<'r>> {
        self.plan_with_dialect(request, age_rule, &DuckDbDialect)
    }

    /// Validate the request and render its query. Pure: no I/O, no shared state.
    pub fn plan_with_dialect(
        &self,
        request: &AnalysisRequest,
        age_rule: &BucketRule,
        dialect: &dyn Dialect,
    ) -> Result<PlannedQuery<'r>> {
        let analysis =
            planner::build_query(self.registry, &self.table, request, age_rule, self.today)?;
        let reducer = analysis.plan.reducer();
        let RenderedQuery { sql, params } =
            SqlRenderer::new(dialect).render_select(&analysis.plan.into_select_query());
        tracing::debug!(sql = %sql, params = params.len(), "built analysis query");
        Ok(PlannedQuery {
            metric: analysis.metric,
            grouping: analysis.grouping,
            split: analysis.split,
            sql,
            params,
            reducer,
        })
    }

    /// Distinct non-null values of one column within the population.
    pub fn distinct_values(
        &self,
        column: &str,
        active_only: bool,
        snapshot_date: Option<NaiveDate>,
        dialect: &dyn Dialect,
    ) -> RenderedQuery {
        let query = planner::build_distinct_values_query(
            &self.table,
            column,
            active_only,
            snapshot_date,
        );
        SqlRenderer::new(dialect).render_select(&query)
    }

    /// Validate a churn period and render its three counting queries.
    pub fn churn(&self, request: &ChurnRequest, dialect: &dyn Dialect) -> Result<ChurnQueries> {
        let (from, to) = (request.start_date, request.end_date);
        if to < from {
            return Err(StaffmetricsError::Validation {
                field: "end_date".to_string(),
                value: to.format(SNAPSHOT_DATE_FORMAT).to_string(),
                allowed: vec![format!(
                    "a date on or after {}",
                    from.format(SNAPSHOT_DATE_FORMAT)
                )],
            });
        }
        let group_column = request
            .group_by
            .as_deref()
            .map(|id| self.registry.column_dimension("group_by", id))
            .transpose()?;

        let renderer = SqlRenderer::new(dialect);
        let count_events = |column: &str| {
            renderer.render_select(&planner::build_event_count_query(
                &self.table,
                column,
                from,
                to,
                group_column,
            ))
        };
        let queries = ChurnQueries {
            group_column,
            terminated: count_events(columns::EMPLOYMENT_END),
            hired: count_events(columns::EMPLOYMENT_START),
            headcount: renderer.render_select(&planner::build_period_headcount_query(
                &self.table,
                from,
                to,
            )),
        };
        tracing::debug!(
            terminated = %queries.terminated.sql,
            hired = %queries.hired.sql,
            "built churn queries"
        );
        Ok(queries)
    }
}
