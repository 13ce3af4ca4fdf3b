//! SQL dialect abstractions for the record store.
//!
//! Each dialect is implemented in its own file and gated behind a feature flag.

use crate::sql_ast::{Aggregation, Function};

/// Dialects render identifiers and primitive expression pieces.
/// Expression tree walking lives in the SQL renderer; the dialect
/// only maps logical constructs to SQL fragments.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;
    fn qualify_table(&self, table: &str) -> String {
        self.quote_ident(table).to_string()
    }
    /// Placeholder for the `idx`-th bound parameter (1-based).
    fn placeholder(&self, _idx: usize) -> String {
        "?".to_string()
    }
    fn render_function(&self, func: &Function, args: Vec<String>) -> String;
    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Count => format!("COUNT({expr})"),
            Aggregation::Sum => format!("SUM({expr})"),
            Aggregation::Avg => format!("AVG({expr})"),
            Aggregation::Min => format!("MIN({expr})"),
            Aggregation::Max => format!("MAX({expr})"),
        }
    }
    fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            serde_json::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            serde_json::Value::Object(_) => {
                format!("'{}'", value.to_string().replace('\'', "''"))
            }
        }
    }
}

mod duckdb;
pub use duckdb::DuckDbDialect;
