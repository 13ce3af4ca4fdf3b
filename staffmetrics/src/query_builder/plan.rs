//! Query plan intermediate representation.
//!
//! The plan records which strategy the planner picked before it is rendered
//! to SQL: the store aggregates, or the store only filters and the engine
//! reduces the raw rows.

use crate::registry::Reducer;
use crate::sql_ast::{SelectItem, SelectQuery, SqlExpr, TableRef};

pub const GROUP_ALIAS: &str = "group";
pub const SPLIT_ALIAS: &str = "split";
pub const VALUE_ALIAS: &str = "value";

#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// One row per group (and split) with the aggregate already computed.
    Aggregate(FlatPlan),
    /// One row per record; grouping and reduction happen in the executor.
    RawRows { plan: FlatPlan, reducer: Reducer },
}

#[derive(Debug, Clone)]
pub struct FlatPlan {
    pub from: TableRef,
    pub select: Vec<SelectItem>,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<SqlExpr>,
}

impl FlatPlan {
    pub fn new(from: TableRef) -> Self {
        Self {
            from,
            select: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn select_as(&mut self, expr: SqlExpr, alias: &str) {
        self.select.push(SelectItem {
            expr,
            alias: Some(alias.to_string()),
        });
    }

    pub fn into_select_query(self) -> SelectQuery {
        SelectQuery {
            distinct: false,
            select: self.select,
            from: self.from,
            filters: self.filters,
            group_by: self.group_by,
            order_by: self.order_by,
        }
    }
}

impl QueryPlan {
    pub fn reducer(&self) -> Option<Reducer> {
        match self {
            QueryPlan::Aggregate(_) => None,
            QueryPlan::RawRows { reducer, .. } => Some(*reducer),
        }
    }

    pub fn into_select_query(self) -> SelectQuery {
        match self {
            QueryPlan::Aggregate(plan) | QueryPlan::RawRows { plan, .. } => {
                plan.into_select_query()
            }
        }
    }
}
