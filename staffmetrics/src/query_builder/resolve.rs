//! Dimension resolution: dimension id → grouping expression plus null guards.

use chrono::NaiveDate;
use serde_json::Value;

use crate::buckets::{BucketRule, UNKNOWN_LABEL};
use crate::registry::{columns, BucketKind, DimensionDefinition, DimensionSource, ValueSource};
use crate::request::SNAPSHOT_DATE_FORMAT;
use crate::sql_ast::{Function, SqlBinaryOperator, SqlExpr};

/// Per-request inputs needed to turn registry entries into SQL.
///
/// The age rule and today's date are handed in by the caller so planning
/// never reads shared state or the clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveContext<'a> {
    pub age_rule: &'a BucketRule,
    pub snapshot_date: Option<NaiveDate>,
    pub today: NaiveDate,
}

impl<'a> ResolveContext<'a> {
    /// "Now" for tenure: the snapshot date when set, else today. Always bound.
    pub fn reference_date(&self) -> SqlExpr {
        bound_date(self.snapshot_date.unwrap_or(self.today))
    }

    /// Years employed as of the reference date; an earlier end date caps it.
    pub fn tenure_years(&self) -> SqlExpr {
        let end = SqlExpr::func(
            Function::Least,
            vec![
                SqlExpr::func(
                    Function::Coalesce,
                    vec![
                        SqlExpr::column(columns::EMPLOYMENT_END),
                        self.reference_date(),
                    ],
                ),
                self.reference_date(),
            ],
        );
        let days = SqlExpr::func(
            Function::DateDiffDays,
            vec![SqlExpr::column(columns::EMPLOYMENT_START), end],
        );
        SqlExpr::binary(
            SqlBinaryOperator::Divide,
            days,
            SqlExpr::Literal(Value::from(DAYS_PER_YEAR)),
        )
    }

    pub fn value_expr(&self, source: ValueSource) -> SqlExpr {
        match source {
            ValueSource::Column(col) => SqlExpr::column(col),
            ValueSource::TenureYears => self.tenure_years(),
        }
    }

    /// Grouping expression for a dimension.
    pub fn dimension_expr(&self, dim: &DimensionDefinition) -> SqlExpr {
        match dim.source {
            DimensionSource::Column(col) => labelled_column(col),
            DimensionSource::Computed(BucketKind::Age) => {
                bucket_case(&SqlExpr::column(columns::AGE), self.age_rule)
            }
            DimensionSource::Computed(BucketKind::Tenure) => {
                bucket_case(&self.tenure_years(), &BucketRule::tenure())
            }
        }
    }
}

/// `coalesce(column, 'Unknown')`.
pub(crate) fn labelled_column(column: &str) -> SqlExpr {
    SqlExpr::func(
        Function::Coalesce,
        vec![
            SqlExpr::column(column),
            SqlExpr::Literal(Value::from(UNKNOWN_LABEL)),
        ],
    )
}

/// `CAST(? AS DATE)` with the date bound as an ISO string.
pub(crate) fn bound_date(date: NaiveDate) -> SqlExpr {
    SqlExpr::func(
        Function::Cast {
            data_type: "DATE".to_string(),
        },
        vec![SqlExpr::Param(Value::String(
            date.format(SNAPSHOT_DATE_FORMAT).to_string(),
        ))],
    )
}

/// Average year length used for tenure.
pub(crate) const DAYS_PER_YEAR: f64 = 365.25;

pub(crate) fn null_guard(column: &str) -> SqlExpr {
    SqlExpr::is_not_null(SqlExpr::column(column))
}

/// `CASE WHEN value in bucket THEN label ... ELSE 'Unknown' END`, ascending.
pub(crate) fn bucket_case(value: &SqlExpr, rule: &BucketRule) -> SqlExpr {
    let branches = rule
        .intervals()
        .iter()
        .map(|interval| {
            let lower = interval.min.map(|min| {
                SqlExpr::binary(SqlBinaryOperator::Gte, value.clone(), number_literal(min))
            });
            let upper = interval.max.map(|max| {
                let op = if interval.inclusive_max {
                    SqlBinaryOperator::Lte
                } else {
                    SqlBinaryOperator::Lt
                };
                SqlExpr::binary(op, value.clone(), number_literal(max))
            });
            let condition = match (lower, upper) {
                (Some(lower), Some(upper)) => SqlExpr::binary(SqlBinaryOperator::And, lower, upper),
                (Some(bound), None) | (None, Some(bound)) => bound,
                // An interval open on both sides matches any non-null value.
                (None, None) => SqlExpr::is_not_null(value.clone()),
            };
            (condition, SqlExpr::Literal(Value::from(interval.label.as_str())))
        })
        .collect();
    SqlExpr::Case {
        branches,
        else_expr: Box::new(SqlExpr::Literal(Value::from(UNKNOWN_LABEL))),
    }
}

fn number_literal(value: f64) -> SqlExpr {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        SqlExpr::Literal(Value::from(value as i64))
    } else {
        SqlExpr::Literal(Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, DuckDbDialect};
    use crate::registry::{Grouping, Registry};
    use crate::sql_ast::{SelectItem, SelectQuery, SqlRenderer, TableRef};

    fn render(expr: SqlExpr) -> (String, Vec<Value>) {
        let query = SelectQuery {
            select: vec![SelectItem { expr, alias: None }],
            from: TableRef {
                name: "employees".to_string(),
            },
            ..Default::default()
        };
        let rendered = SqlRenderer::new(&DuckDbDialect as &dyn Dialect).render_select(&query);
        (rendered.sql, rendered.params)
    }

    fn dimension(id: &str) -> &'static DimensionDefinition {
        match Registry::global().grouping(id).unwrap() {
            Grouping::Dimension(dim) => dim,
            Grouping::All => panic!("expected a dimension"),
        }
    }

    fn context(rule: &BucketRule, snapshot_date: Option<NaiveDate>) -> ResolveContext<'_> {
        ResolveContext {
            age_rule: rule,
            snapshot_date,
            today: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
        }
    }

    #[test]
    fn plain_dimension_is_coalesced() {
        let rule = BucketRule::default_age();
        let (sql, params) = render(context(&rule, None).dimension_expr(dimension("department")));
        assert_eq!(sql, "SELECT coalesce(\"department\", 'Unknown') FROM \"employees\"");
        assert!(params.is_empty());
    }

    #[test]
    fn age_buckets_render_in_ascending_order() {
        let rule = BucketRule::default_age();
        let (sql, _) = render(context(&rule, None).dimension_expr(dimension("age_group")));
        let under = sql.find("'Under 25'").unwrap();
        let senior = sql.find("'65+'").unwrap();
        assert!(under < senior);
        assert!(sql.contains("WHEN ((\"age\" >= 25) AND (\"age\" <= 34)) THEN '25-34'"));
        assert!(sql.ends_with("ELSE 'Unknown' END FROM \"employees\""));
    }

    #[test]
    fn tenure_reference_date_is_always_bound() {
        let rule = BucketRule::default_age();
        let snapshot = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (sql, params) = render(context(&rule, Some(snapshot)).tenure_years());
        assert!(!sql.contains("current_date"));
        assert_eq!(params, vec![Value::from("2024-01-01"), Value::from("2024-01-01")]);

        let (sql, params) = render(context(&rule, None).tenure_years());
        assert!(!sql.contains("current_date"));
        assert_eq!(params, vec![Value::from("2026-03-15"), Value::from("2026-03-15")]);
    }

    #[test]
    fn tenure_buckets_are_half_open() {
        let (sql, _) = render(bucket_case(&SqlExpr::column("t"), &BucketRule::tenure()));
        assert!(sql.contains("CASE WHEN (\"t\" < 1) THEN 'Under 1 year'"));
        assert!(sql.contains("WHEN ((\"t\" >= 1) AND (\"t\" < 2)) THEN '1-2 years'"));
        assert!(sql.contains("WHEN (\"t\" >= 10) THEN 'Over 10 years'"));
    }
}
