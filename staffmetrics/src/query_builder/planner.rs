//! Query planner.
//!
//! Validates a request against the registry and builds the predicate list,
//! projection and grouping for one of three shapes: ungrouped, raw rows for
//! post-aggregation, or an ordinary grouped aggregate.

use chrono::NaiveDate;

use crate::buckets::BucketRule;
use crate::error::Result;
use crate::registry::{
    columns, DimensionDefinition, Grouping, MetricDefinition, MetricKind, Registry,
};
use crate::request::AnalysisRequest;
use crate::sql_ast::{Aggregation, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef};

use super::filters::{population_predicates, render_filter_expr};
use super::measures::aggregate_expr;
use super::plan::{FlatPlan, QueryPlan, GROUP_ALIAS, SPLIT_ALIAS, VALUE_ALIAS};
use super::resolve::{bound_date, labelled_column, null_guard, ResolveContext};

/// A validated request: registry entries plus the plan built for it.
#[derive(Debug, Clone)]
pub struct AnalysisPlan<'r> {
    pub metric: &'r MetricDefinition,
    pub grouping: Grouping<'r>,
    pub split: Option<&'r DimensionDefinition>,
    pub plan: QueryPlan,
}

pub fn build_query<'r>(
    registry: &'r Registry,
    table: &str,
    request: &AnalysisRequest,
    age_rule: &BucketRule,
    today: NaiveDate,
) -> Result<AnalysisPlan<'r>> {
    // Step 1: validate every identifier before building anything
    let metric = registry.metric(&request.metric)?;
    let grouping = registry.grouping(&request.group_by)?;
    let split = request
        .split_by
        .as_deref()
        .map(|id| registry.split(id))
        .transpose()?;
    let mut filter_columns = Vec::with_capacity(request.filters.len());
    for (key, value) in &request.filters {
        filter_columns.push((registry.filter_column(key)?, value));
    }

    let ctx = ResolveContext {
        age_rule,
        snapshot_date: request.snapshot_date,
        today,
    };
    let mut plan = FlatPlan::new(TableRef {
        name: table.to_string(),
    });

    // Step 2: population, null guards, then caller filters
    plan.filters.extend(population_predicates(
        request.active_only,
        request.snapshot_date,
    ));

    let group_dim = match grouping {
        Grouping::All => None,
        Grouping::Dimension(dim) => Some(dim),
    };
    let mut guards: Vec<&str> = Vec::new();
    let declared = metric
        .null_guards
        .iter()
        .chain(group_dim.iter().flat_map(|d| d.null_guards.iter()))
        .chain(split.iter().flat_map(|d| d.null_guards.iter()))
        .copied();
    for column in declared {
        if !guards.contains(&column) {
            guards.push(column);
        }
    }
    plan.filters.extend(guards.into_iter().map(null_guard));

    for (column, value) in filter_columns {
        if let Some(expr) = render_filter_expr(column, value) {
            plan.filters.push(expr);
        }
    }

    // Step 3: projection and grouping. Without a grouping the split still
    // applies and the executor nests it under the total key.
    if let Some(dim) = group_dim {
        plan.select_as(ctx.dimension_expr(dim), GROUP_ALIAS);
        plan.order_by.push(SqlExpr::column(GROUP_ALIAS));
    }
    if let Some(split_dim) = split {
        plan.select_as(ctx.dimension_expr(split_dim), SPLIT_ALIAS);
    }

    let plan = match metric.kind {
        MetricKind::PostAggregate { value, reducer } => {
            plan.select_as(ctx.value_expr(value), VALUE_ALIAS);
            QueryPlan::RawRows { plan, reducer }
        }
        MetricKind::Pushdown(template) => {
            plan.select_as(aggregate_expr(template, &ctx), VALUE_ALIAS);
            if group_dim.is_some() {
                plan.group_by.push(SqlExpr::column(GROUP_ALIAS));
            }
            if split.is_some() {
                plan.group_by.push(SqlExpr::column(SPLIT_ALIAS));
            }
            QueryPlan::Aggregate(plan)
        }
    };

    tracing::trace!(
        metric = metric.id,
        group_by = grouping.id(),
        split_by = split.map(|d| d.id),
        post_aggregate = plan.reducer().is_some(),
        "planned analysis"
    );

    Ok(AnalysisPlan {
        metric,
        grouping,
        split,
        plan,
    })
}

/// `SELECT DISTINCT column AS value ... ORDER BY value` within the population.
pub fn build_distinct_values_query(
    table: &str,
    column: &str,
    active_only: bool,
    snapshot_date: Option<NaiveDate>,
) -> SelectQuery {
    let mut filters = population_predicates(active_only, snapshot_date);
    filters.push(null_guard(column));
    SelectQuery {
        distinct: true,
        select: vec![SelectItem {
            expr: SqlExpr::column(column),
            alias: Some(VALUE_ALIAS.to_string()),
        }],
        from: TableRef {
            name: table.to_string(),
        },
        filters,
        group_by: Vec::new(),
        order_by: vec![SqlExpr::column(VALUE_ALIAS)],
    }
}

/// Records whose `date_column` falls in `[from, to]`, counted per group when
/// a group column is given.
pub fn build_event_count_query(
    table: &str,
    date_column: &str,
    from: NaiveDate,
    to: NaiveDate,
    group_column: Option<&str>,
) -> SelectQuery {
    let mut plan = FlatPlan::new(TableRef {
        name: table.to_string(),
    });
    plan.filters.push(SqlExpr::binary(
        SqlBinaryOperator::Gte,
        SqlExpr::column(date_column),
        bound_date(from),
    ));
    plan.filters.push(SqlExpr::binary(
        SqlBinaryOperator::Lte,
        SqlExpr::column(date_column),
        bound_date(to),
    ));
    if let Some(column) = group_column {
        plan.select_as(labelled_column(column), GROUP_ALIAS);
        plan.group_by.push(SqlExpr::column(GROUP_ALIAS));
        plan.order_by.push(SqlExpr::column(GROUP_ALIAS));
    }
    plan.select_as(SqlExpr::aggregate(Aggregation::Count, SqlExpr::Star), VALUE_ALIAS);
    plan.into_select_query()
}

/// Records employed at some point of `[from, to]`: started by the end and
/// not ended before the start.
pub fn build_period_headcount_query(table: &str, from: NaiveDate, to: NaiveDate) -> SelectQuery {
    let mut plan = FlatPlan::new(TableRef {
        name: table.to_string(),
    });
    plan.filters.push(SqlExpr::binary(
        SqlBinaryOperator::Lte,
        SqlExpr::column(columns::EMPLOYMENT_START),
        bound_date(to),
    ));
    plan.filters.push(SqlExpr::binary(
        SqlBinaryOperator::Or,
        SqlExpr::is_null(SqlExpr::column(columns::EMPLOYMENT_END)),
        SqlExpr::binary(
            SqlBinaryOperator::Gt,
            SqlExpr::column(columns::EMPLOYMENT_END),
            bound_date(from),
        ),
    ));
    plan.select_as(SqlExpr::aggregate(Aggregation::Count, SqlExpr::Star), VALUE_ALIAS);
    plan.into_select_query()
}
