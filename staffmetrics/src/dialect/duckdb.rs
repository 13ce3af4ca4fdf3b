//! DuckDB dialect implementation.

use crate::sql_ast::Function;

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_function(&self, func: &Function, args: Vec<String>) -> String {
        match func {
            Function::Coalesce => format!("coalesce({})", args.join(", ")),
            Function::Least => format!("least({})", args.join(", ")),
            Function::DateDiffDays => match args.as_slice() {
                [start, end] => format!("date_diff('day', {start}, {end})"),
                _ => "NULL".to_string(),
            },
            Function::Cast { data_type } => match args.as_slice() {
                [expr] => format!("CAST({expr} AS {data_type})"),
                _ => "NULL".to_string(),
            },
        }
    }
}
