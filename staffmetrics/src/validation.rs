use std::collections::HashSet;

use crate::backends::{BackendConnection, TableSchema};
use crate::error::{Result, StaffmetricsError};
use crate::registry::Registry;

/// Checks that the record store carries every column the registry can reference.
pub struct Validator {
    warn_only: bool,
}

impl Validator {
    pub fn new(warn_only: bool) -> Self {
        Self { warn_only }
    }

    pub async fn verify_schema(
        &self,
        registry: &Registry,
        connection: &dyn BackendConnection,
        table: &str,
    ) -> Result<TableSchema> {
        let schema = connection.fetch_schema(table).await?;
        self.validate_table(registry, table, &schema)?;
        Ok(schema)
    }

    fn validate_table(&self, registry: &Registry, table: &str, schema: &TableSchema) -> Result<()> {
        let column_names: HashSet<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        let missing: Vec<&str> = registry
            .referenced_columns()
            .into_iter()
            .filter(|col| !column_names.contains(col))
            .collect();

        self.check(
            missing.is_empty(),
            format!("table {table} is missing columns: {}", missing.join(", ")),
        )
    }

    fn check(&self, condition: bool, message: String) -> Result<()> {
        if condition {
            return Ok(());
        }
        if self.warn_only {
            tracing::warn!("{message}");
            Ok(())
        } else {
            Err(StaffmetricsError::Schema(message))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(false)
    }
}
