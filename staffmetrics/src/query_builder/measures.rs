//! Aggregate expressions for pushdown metrics.

use serde_json::Value;

use crate::registry::AggregateTemplate;
use crate::sql_ast::{Aggregation, SqlBinaryOperator, SqlExpr};

use super::resolve::ResolveContext;

pub(crate) fn aggregate_expr(template: AggregateTemplate, ctx: &ResolveContext<'_>) -> SqlExpr {
    match template {
        AggregateTemplate::CountRows => SqlExpr::aggregate(Aggregation::Count, SqlExpr::Star),
        AggregateTemplate::Of(agg, source) => SqlExpr::aggregate(agg, ctx.value_expr(source)),
        AggregateTemplate::Percentage { column, equals } => {
            let hit = SqlExpr::Case {
                branches: vec![(
                    SqlExpr::binary(
                        SqlBinaryOperator::Eq,
                        SqlExpr::column(column),
                        SqlExpr::Literal(Value::from(equals)),
                    ),
                    SqlExpr::Literal(Value::from(1)),
                )],
                else_expr: Box::new(SqlExpr::Literal(Value::from(0))),
            };
            SqlExpr::binary(
                SqlBinaryOperator::Divide,
                SqlExpr::binary(
                    SqlBinaryOperator::Multiply,
                    SqlExpr::Literal(Value::from(100.0)),
                    SqlExpr::aggregate(Aggregation::Sum, hit),
                ),
                SqlExpr::aggregate(Aggregation::Count, SqlExpr::Star),
            )
        }
    }
}
