use serde_json::Value;

use crate::dialect::Dialect;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        name: String,
    },
    /// Server-side constant; rendered inline by the dialect.
    Literal(Value),
    /// Caller-supplied value; rendered as a placeholder and bound at execution.
    Param(Value),
    Star,
    Function {
        func: Function,
        args: Vec<SqlExpr>,
    },
    Case {
        branches: Vec<(SqlExpr, SqlExpr)>,
        else_expr: Box<SqlExpr>,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Aggregate {
        agg: Aggregation,
        expr: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column { name: name.into() }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_not_null(expr: SqlExpr) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(expr),
            negated: true,
        }
    }

    pub fn is_null(expr: SqlExpr) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    pub fn aggregate(agg: Aggregation, expr: SqlExpr) -> Self {
        SqlExpr::Aggregate {
            agg,
            expr: Box::new(expr),
        }
    }

    pub fn func(func: Function, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Function { func, args }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    Multiply,
    Divide,
    And,
    Or,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Coalesce,
    Least,
    /// Whole days from the first argument to the second.
    DateDiffDays,
    Cast { data_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<SqlExpr>,
}

/// SQL text plus the values bound to its placeholders, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> RenderedQuery {
        let mut params = Vec::new();
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr, &mut params);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();

        let distinct_kw = if query.distinct { "DISTINCT " } else { "" };
        let mut sql = format!(
            "SELECT {distinct_kw}{} FROM {}",
            select_items.join(", "),
            self.dialect.qualify_table(&query.from.name)
        );

        if !query.filters.is_empty() {
            let filters: Vec<String> = query
                .filters
                .iter()
                .map(|f| self.render_expr(f, &mut params))
                .collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query
                .group_by
                .iter()
                .map(|g| self.render_expr(g, &mut params))
                .collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| format!("{} ASC", self.render_expr(o, &mut params)))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        RenderedQuery { sql, params }
    }

    fn render_expr(&self, expr: &SqlExpr, params: &mut Vec<Value>) -> String {
        match expr {
            SqlExpr::Column { name } => self.dialect.quote_ident(name),
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::Param(v) => {
                params.push(v.clone());
                self.dialect.placeholder(params.len())
            }
            SqlExpr::Star => "*".to_string(),
            SqlExpr::Function { func, args } => {
                let rendered_args: Vec<String> =
                    args.iter().map(|a| self.render_expr(a, params)).collect();
                self.dialect.render_function(func, rendered_args)
            }
            SqlExpr::Case {
                branches,
                else_expr,
            } => {
                let mut parts = Vec::new();
                parts.push("CASE".to_string());
                for (when, then) in branches {
                    let when_sql = self.render_expr(when, params);
                    let then_sql = self.render_expr(then, params);
                    parts.push(format!(" WHEN {when_sql} THEN {then_sql}"));
                }
                parts.push(format!(" ELSE {} END", self.render_expr(else_expr, params)));
                parts.join("")
            }
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::Multiply => "*",
                    SqlBinaryOperator::Divide => "/",
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Or => "OR",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                };
                let left_sql = self.render_expr(left, params);
                let right_sql = self.render_expr(right, params);
                format!("({left_sql} {op_sql} {right_sql})")
            }
            SqlExpr::Aggregate { agg, expr } => {
                let inner = self.render_expr(expr, params);
                self.dialect.render_aggregation(agg, &inner)
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let target = self.render_expr(expr, params);
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v, params)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{target} {not_kw}IN ({})", rendered_values.join(", "))
            }
            SqlExpr::IsNull { expr, negated } => {
                let target = self.render_expr(expr, params);
                if *negated {
                    format!("{target} IS NOT NULL")
                } else {
                    format!("{target} IS NULL")
                }
            }
        }
    }
}
