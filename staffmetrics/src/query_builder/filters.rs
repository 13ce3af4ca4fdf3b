use chrono::NaiveDate;
use serde_json::Value;

use crate::registry::columns;
use crate::request::FilterValue;
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

use super::resolve::bound_date;

/// Who counts as "the population" for a request.
///
/// A snapshot date wins over the active flag: employed on or before the
/// date, and not yet ended on it.
pub(crate) fn population_predicates(
    active_only: bool,
    snapshot_date: Option<NaiveDate>,
) -> Vec<SqlExpr> {
    if let Some(date) = snapshot_date {
        let started = SqlExpr::binary(
            SqlBinaryOperator::Lte,
            SqlExpr::column(columns::EMPLOYMENT_START),
            bound_date(date),
        );
        let not_ended = SqlExpr::binary(
            SqlBinaryOperator::Or,
            SqlExpr::is_null(SqlExpr::column(columns::EMPLOYMENT_END)),
            SqlExpr::binary(
                SqlBinaryOperator::Gt,
                SqlExpr::column(columns::EMPLOYMENT_END),
                bound_date(date),
            ),
        );
        vec![started, not_ended]
    } else if active_only {
        vec![SqlExpr::binary(
            SqlBinaryOperator::Eq,
            SqlExpr::column(columns::IS_ACTIVE),
            SqlExpr::Literal(Value::Bool(true)),
        )]
    } else {
        Vec::new()
    }
}

/// `column = ?` or `column IN (?, ...)`; `None` for an empty set.
pub(crate) fn render_filter_expr(column: &str, value: &FilterValue) -> Option<SqlExpr> {
    match value {
        FilterValue::One(v) => Some(SqlExpr::binary(
            SqlBinaryOperator::Eq,
            SqlExpr::column(column),
            SqlExpr::Param(Value::String(v.clone())),
        )),
        FilterValue::Any(values) if values.is_empty() => None,
        FilterValue::Any(values) => Some(SqlExpr::InList {
            expr: Box::new(SqlExpr::column(column)),
            list: values
                .iter()
                .map(|v| SqlExpr::Param(Value::String(v.clone())))
                .collect(),
            negated: false,
        }),
    }
}
