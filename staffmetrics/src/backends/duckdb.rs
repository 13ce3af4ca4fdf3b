//! DuckDB backend implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::DatabaseConfig;
use crate::dialect::DuckDbDialect;
use crate::error::{Result, StaffmetricsError};
use crate::executor::{ColumnMeta, QueryResult};

use super::{BackendConnection, ColumnSchema, TableSchema};

/// DuckDB connection implementing the unified backend trait.
#[derive(Clone)]
pub struct DuckDbConnection {
    database_path: PathBuf,
    dialect: DuckDbDialect,
    limiter: Arc<Semaphore>,
    /// First connection opened; later ones are cloned from it so they share one database.
    root: Arc<Mutex<Option<duckdb::Connection>>>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
}

impl DuckDbConnection {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), max_concurrency = 16, "creating DuckDB connection");
        Self {
            database_path: path,
            dialect: DuckDbDialect,
            limiter: Arc::new(Semaphore::new(16)),
            root: Arc::new(Mutex::new(None)),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.path).with_max_concurrency(config.max_concurrency)
    }

    /// Configure maximum concurrent executions; callers can tune based on hardware.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight));
        self
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>> {
        let available = self.limiter.available_permits();
        if available == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter
            .acquire()
            .await
            .map_err(|e| StaffmetricsError::Execution(format!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);

        let mut root = self.root.lock().await;
        if root.is_none() {
            tracing::debug!(path = %self.database_path.display(), "opening DuckDB database");
            let conn = duckdb::Connection::open(self.database_path.clone())
                .map_err(|e| StaffmetricsError::Execution(format!("open duckdb: {e}")))?;
            *root = Some(conn);
        }
        match root.as_ref() {
            Some(conn) => {
                tracing::trace!("cloning DuckDB connection");
                Ok(conn.try_clone()?)
            }
            None => Err(StaffmetricsError::Execution(
                "duckdb root connection missing".to_string(),
            )),
        }
    }

    async fn checkin_connection(&self, conn: duckdb::Connection) {
        let mut guard = self.pool.lock().await;
        guard.push(conn);
    }
}

#[async_trait]
impl BackendConnection for DuckDbConnection {
    fn dialect(&self) -> &(dyn crate::dialect::Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let table = table.to_string();
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let result =
            tokio::task::spawn_blocking(move || -> (Result<TableSchema>, duckdb::Connection) {
                let start = Instant::now();
                let schema = read_table_info(&conn, &table);
                tracing::debug!(
                    table = table.as_str(),
                    ms = start.elapsed().as_millis(),
                    "duckdb fetch_schema"
                );
                (schema, conn)
            })
            .await
            .map_err(|e| StaffmetricsError::Execution(format!("task join error: {e}")))?;

        let (schema, conn) = result;
        self.checkin_connection(conn).await;
        schema
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let sql = sql.to_string();
        let bound: Vec<DuckValue> = params.iter().map(json_to_duck_value).collect();
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let result =
            tokio::task::spawn_blocking(move || -> (Result<QueryResult>, duckdb::Connection) {
                let start = Instant::now();
                let result = run_query(&conn, &sql, bound);
                if let Ok(rows) = &result {
                    tracing::debug!(
                        rows = rows.rows.len(),
                        columns = rows.columns.len(),
                        ms = start.elapsed().as_millis(),
                        "duckdb execute_sql"
                    );
                }
                (result, conn)
            })
            .await
            .map_err(|e| StaffmetricsError::Execution(format!("task join error: {e}")))?;

        let (result, conn) = result;
        self.checkin_connection(conn).await;
        result
    }
}

fn read_table_info(conn: &duckdb::Connection, table: &str) -> Result<TableSchema> {
    let pragma_sql = format!("PRAGMA table_info('{}')", table.replace('\'', "''"));
    let mut stmt = conn.prepare(&pragma_sql)?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    let mut primary_keys = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        let data_type: String = row.get("type")?;
        let not_null: bool = row.get("notnull")?;
        let pk_flag: bool = row.get("pk")?;
        if pk_flag {
            primary_keys.push(name.clone());
        }
        columns.push(ColumnSchema {
            name,
            data_type,
            nullable: !not_null,
        });
    }
    if columns.is_empty() {
        return Err(StaffmetricsError::Schema(format!("table {table} not found")));
    }
    Ok(TableSchema {
        columns,
        primary_keys,
    })
}

fn run_query(conn: &duckdb::Connection, sql: &str, params: Vec<DuckValue>) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows_iter = stmt.query(duckdb::params_from_iter(params))?;
    let stmt_ref = rows_iter
        .as_ref()
        .ok_or_else(|| StaffmetricsError::Execution("statement missing".to_string()))?;
    let mut column_names = Vec::new();
    for idx in 0..stmt_ref.column_count() {
        let name = stmt_ref
            .column_name(idx)
            .map_err(|e| StaffmetricsError::Execution(e.to_string()))?;
        column_names.push(name.to_string());
    }
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut map = Map::new();
        for (idx, name) in column_names.iter().enumerate() {
            let value = duck_value_to_json(row.get_ref(idx)?.to_owned());
            map.insert(name.clone(), value);
        }
        rows.push(map);
    }

    let columns = column_names
        .into_iter()
        .map(|name| ColumnMeta { name })
        .collect();
    Ok(QueryResult { columns, rows })
}

fn json_to_duck_value(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DuckValue::BigInt(i),
            None => DuckValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => DuckValue::Text(s.clone()),
        other => DuckValue::Text(other.to_string()),
    }
}

/// Days between 0001-01-01 and 1970-01-01, for DuckDB's DATE encoding.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(i.to_string()),
        },
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Decimal(d) => match d.to_string().parse::<f64>() {
            Ok(f) => Value::from(f),
            Err(_) => Value::String(d.to_string()),
        },
        DuckValue::Timestamp(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(d) => match d
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
        {
            Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            // `infinity` and other dates chrono cannot represent stay raw.
            None => Value::from(d),
        },
        DuckValue::Time64(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::String(format!("{months} months {days} days {nanos} nanos")),
        DuckValue::List(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Enum(s) => Value::String(s),
        DuckValue::Struct(fields) => {
            let mut map = Map::new();
            for (key, val) in fields.iter() {
                map.insert(key.clone(), duck_value_to_json(val.clone()));
            }
            Value::Object(map)
        }
        DuckValue::Array(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Map(entries) => {
            let pairs: Vec<Value> = entries
                .iter()
                .map(|(k, v)| {
                    Value::Array(vec![
                        duck_value_to_json(k.clone()),
                        duck_value_to_json(v.clone()),
                    ])
                })
                .collect();
            Value::Array(pairs)
        }
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_values_render_as_iso_strings() {
        assert_eq!(duck_value_to_json(DuckValue::Date32(0)), Value::from("1970-01-01"));
        assert_eq!(
            duck_value_to_json(DuckValue::Date32(20_089)),
            Value::from("2025-01-01")
        );
    }

    #[test]
    fn infinite_dates_stay_numeric() {
        assert_eq!(duck_value_to_json(DuckValue::Date32(i32::MAX)), Value::from(i32::MAX));
        assert_eq!(duck_value_to_json(DuckValue::Date32(-i32::MAX)), Value::from(-i32::MAX));
    }

    #[test]
    fn json_params_map_to_duck_values() {
        assert_eq!(json_to_duck_value(&Value::from("Norway")), DuckValue::Text("Norway".into()));
        assert_eq!(json_to_duck_value(&Value::from(3)), DuckValue::BigInt(3));
        assert_eq!(json_to_duck_value(&Value::Null), DuckValue::Null);
    }
}
