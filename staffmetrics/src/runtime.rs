use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;

use crate::backends::{BackendConnection, TableSchema};
use crate::buckets::{BucketRule, BucketSource, StaticBucketSource};
use crate::catalog::{self, AnalysisOptions, FilterValues};
use crate::churn::{self, ChurnReport, MonthlyChurn};
use crate::error::Result;
use crate::executor::{shape_result, AnalysisResult};
use crate::query_builder::{PlannedQuery, QueryPlanner};
use crate::registry::Registry;
use crate::request::{AnalysisRequest, ChurnRequest};
use crate::validation::Validator;

/// Entry point: plans, executes and shapes analyses against one employee table.
///
/// Holds no mutable state; the age rule is read from its source on every call.
#[derive(Clone)]
pub struct AnalysisEngine {
    registry: &'static Registry,
    connection: Arc<dyn BackendConnection>,
    buckets: Arc<dyn BucketSource>,
    table: String,
}

impl AnalysisEngine {
    pub fn new(connection: Arc<dyn BackendConnection>, table: impl Into<String>) -> Self {
        Self {
            registry: Registry::global(),
            connection,
            buckets: Arc::new(StaticBucketSource::default()),
            table: table.into(),
        }
    }

    /// Open the configured DuckDB file. Age brackets come from `buckets.age_table`
    /// when set, otherwise from the inline brackets or the defaults.
    #[cfg(feature = "duckdb")]
    pub fn from_config(config: &crate::config::EngineConfig) -> Result<Self> {
        let connection: Arc<dyn BackendConnection> =
            Arc::new(crate::backends::DuckDbConnection::from_config(&config.database));
        let buckets: Arc<dyn BucketSource> = match &config.buckets.age_table {
            Some(table) => Arc::new(crate::buckets::TableBucketSource::new(
                connection.clone(),
                table.clone(),
            )),
            None => Arc::new(StaticBucketSource::new(config.buckets.age_rule()?)),
        };
        Ok(Self::new(connection, config.database.table.clone()).with_bucket_source(buckets))
    }

    pub fn with_bucket_source(mut self, buckets: Arc<dyn BucketSource>) -> Self {
        self.buckets = buckets;
        self
    }

    /// A fresh planner; "today" for tenure is read from the clock here, so
    /// every call measures tenure to the current date.
    pub fn planner(&self) -> QueryPlanner<'static> {
        QueryPlanner::new(self.registry, self.table.clone())
    }

    /// Build the query for a request without running it.
    pub fn plan(
        &self,
        request: &AnalysisRequest,
        age_rule: &BucketRule,
    ) -> Result<PlannedQuery<'static>> {
        self.planner()
            .plan_with_dialect(request, age_rule, self.connection.dialect())
    }

    pub async fn execute(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let start = Instant::now();
        let age_rule = self.buckets.age_rule().await?;
        let planned = self.plan(request, &age_rule)?;
        let rows = self
            .connection
            .execute_sql(&planned.sql, &planned.params)
            .await?;
        let row_count = rows.rows.len();
        let result = shape_result(&planned, request, rows);
        tracing::info!(
            metric = planned.metric.id,
            group_by = planned.grouping.id(),
            split_by = planned.split.map(|d| d.id),
            rows = row_count,
            groups = result.meta.total_groups,
            ms = start.elapsed().as_millis(),
            "analysis executed"
        );
        Ok(result)
    }

    pub async fn list_values(
        &self,
        active_only: bool,
        snapshot_date: Option<NaiveDate>,
    ) -> Result<FilterValues> {
        catalog::list_values(
            self.registry,
            &self.planner(),
            self.connection.as_ref(),
            active_only,
            snapshot_date,
        )
        .await
    }

    pub async fn options(
        &self,
        active_only: bool,
        snapshot_date: Option<NaiveDate>,
    ) -> Result<AnalysisOptions> {
        catalog::options(
            self.registry,
            &self.planner(),
            self.connection.as_ref(),
            active_only,
            snapshot_date,
        )
        .await
    }

    /// Departures, hires, headcount and churn rate over a closed period.
    pub async fn churn(&self, request: &ChurnRequest) -> Result<ChurnReport> {
        let start = Instant::now();
        let report = churn::churn(&self.planner(), self.connection.as_ref(), request).await?;
        tracing::info!(
            start = %request.start_date,
            end = %request.end_date,
            group_by = request.group_by.as_deref(),
            ms = start.elapsed().as_millis(),
            "churn computed"
        );
        Ok(report)
    }

    /// Twelve monthly churn reports for `year`.
    pub async fn monthly_churn(&self, year: i32) -> Result<Vec<MonthlyChurn>> {
        churn::monthly_churn(&self.planner(), self.connection.as_ref(), year).await
    }

    /// Fail if the table lacks any column the registry references.
    pub async fn verify_schema(&self) -> Result<TableSchema> {
        Validator::default()
            .verify_schema(self.registry, self.connection.as_ref(), &self.table)
            .await
    }
}
