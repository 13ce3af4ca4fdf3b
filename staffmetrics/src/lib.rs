pub mod backends;
pub mod buckets;
pub mod catalog;
pub mod churn;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod query_builder;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod sql_ast;
pub mod telemetry;
pub mod validation;

pub use crate::validation::Validator;
pub use backends::{BackendConnection, TableSchema};
#[cfg(feature = "duckdb")]
pub use backends::DuckDbConnection;
pub use buckets::{BucketRule, BucketSource, StaticBucketSource, TableBucketSource};
pub use catalog::{AnalysisOptions, FilterValues};
pub use churn::{ChurnCounts, ChurnReport, MonthlyChurn};
pub use config::EngineConfig;
pub use error::{Result, StaffmetricsError};
pub use executor::{AnalysisData, AnalysisMeta, AnalysisResult, QueryResult};
pub use query_builder::{PlannedQuery, QueryPlanner};
pub use registry::Registry;
pub use request::{AnalysisQuery, AnalysisRequest, ChurnRequest, FilterSpec, FilterValue};
pub use runtime::AnalysisEngine;
