use thiserror::Error;

pub type Result<T> = std::result::Result<T, StaffmetricsError>;

#[derive(Debug, Error)]
pub enum StaffmetricsError {
    #[error("invalid {field}: '{value}'. allowed: {}", allowed.join(", "))]
    Validation {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("invalid snapshot_date: '{0}'. expected a calendar date (YYYY-MM-DD)")]
    InvalidSnapshotDate(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StaffmetricsError {
    /// Build a validation error for an identifier that is not in a whitelist.
    pub fn not_allowed<'a>(
        field: &str,
        value: &str,
        allowed: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        StaffmetricsError::Validation {
            field: field.to_string(),
            value: value.to_string(),
            allowed: allowed.into_iter().map(str::to_string).collect(),
        }
    }

    /// Request-level errors: the caller sent something the engine refuses.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StaffmetricsError::Validation { .. } | StaffmetricsError::InvalidSnapshotDate(_)
        )
    }
}
