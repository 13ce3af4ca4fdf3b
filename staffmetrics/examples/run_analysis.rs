use std::{fs, path::Path};

use staffmetrics::request::parse_snapshot_date;
use staffmetrics::{telemetry, AnalysisEngine, AnalysisRequest, ChurnRequest, EngineConfig};

fn bootstrap_duckdb(path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            gender VARCHAR, age INTEGER, nationality VARCHAR, work_country VARCHAR,
            legal_entity VARCHAR, department VARCHAR, job_family VARCHAR,
            employment_type VARCHAR, employment_start DATE, employment_end DATE,
            weekly_hours DOUBLE, is_manager VARCHAR, salary DOUBLE,
            employment_level VARCHAR, work_location VARCHAR, division VARCHAR,
            role VARCHAR, cost_center VARCHAR, is_active BOOLEAN
        );
        INSERT INTO employees VALUES
            (1, 'Female', 41, 'Norwegian', 'Norway', 'Acme AS', 'Finance', 'Finance', 'Permanent',
             '2016-04-01', NULL, 37.5, 'Yes', 810000, 'Manager', 'Oslo', 'Operations', 'Manager', 'CC10', true),
            (2, 'Male', 29, 'Swedish', 'Sweden', 'Acme AB', 'IT', 'Technology', 'Permanent',
             '2022-09-01', NULL, 40.0, 'No', 520000, 'Staff', 'Stockholm', 'Technology', 'Developer', 'CC20', true),
            (3, 'Female', 35, 'Danish', 'Denmark', 'Acme ApS', 'IT', 'Technology', 'Permanent',
             '2019-01-15', NULL, 37.0, 'No', 610000, 'Senior', 'Copenhagen', 'Technology', 'Developer', 'CC20', true),
            (4, 'Male', 57, 'Norwegian', 'Norway', 'Acme AS', 'Sales', 'Commercial', 'Permanent',
             '2008-03-01', '2024-08-31', 37.5, 'No', 690000, 'Senior', 'Bergen', 'Sales', 'Account manager', 'CC30', false),
            (5, 'Male', 23, 'Norwegian', 'Norway', 'Acme AS', 'Sales', 'Commercial', 'Temporary',
             '2024-11-01', NULL, 20.0, 'No', NULL, 'Junior', 'Oslo', 'Sales', 'Trainee', 'CC30', true);

        CREATE TABLE age_buckets (min_age INTEGER, max_age INTEGER, label VARCHAR);
        INSERT INTO age_buckets VALUES (0, 29, 'Under 30'), (30, 49, '30-49'), (50, 150, '50+');
        ",
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let db_path = std::env::temp_dir().join("staffmetrics-demo.duckdb");
    if db_path.exists() {
        fs::remove_file(&db_path)?;
    }
    bootstrap_duckdb(&db_path)?;

    let config = EngineConfig::from_toml(&format!(
        r#"
[database]
path = "{}"
max_concurrency = 4

[buckets]
age_table = "age_buckets"
"#,
        db_path.display()
    ))?;
    let engine = AnalysisEngine::from_config(&config)?;
    engine.verify_schema().await?;

    let requests = [
        AnalysisRequest::new("count", "work_country"),
        AnalysisRequest::new("median_salary", "department").split_by("gender"),
        AnalysisRequest::new("count", "age_group"),
        AnalysisRequest::total("avg_tenure").as_of(parse_snapshot_date("2024-01-01")?),
        AnalysisRequest::total("pct_female").filter_any("work_country", ["Norway", "Denmark"]),
    ];
    for request in &requests {
        let result = engine.execute(request).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    let period = ChurnRequest::new(
        parse_snapshot_date("2023-01-01")?,
        parse_snapshot_date("2023-12-31")?,
    )
    .group_by("work_country");
    let churn = engine.churn(&period).await?;
    println!("{}", serde_json::to_string_pretty(&churn)?);

    let options = engine.options(true, None).await?;
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(())
}
