//! Record-store backend implementations.
//!
//! Each backend is implemented in its own file and gated behind a feature flag.

use async_trait::async_trait;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::QueryResult;

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Unified interface for all record-store backends.
///
/// Every caller-supplied value reaches the store through `params`; the SQL
/// text only ever contains registry identifiers and placeholders.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);
    async fn fetch_schema(&self, table: &str) -> Result<TableSchema>;
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
}

// Feature-gated backend implementations
#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbConnection;
