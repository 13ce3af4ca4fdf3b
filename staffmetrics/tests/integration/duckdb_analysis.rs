//! End-to-end analyses against an on-disk DuckDB database.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use staffmetrics::backends::{BackendConnection, DuckDbConnection};
use staffmetrics::buckets::TableBucketSource;
use staffmetrics::{AnalysisEngine, AnalysisRequest, ChurnRequest, StaffmetricsError};
use tempfile::TempDir;

/// Ten employees: two terminated (2024-12-31, 2025-06-30) and one with a
/// planned departure in 2027 who is still active. The only Finland record is
/// one of the terminated ones.
fn bootstrap_duckdb(db_path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(db_path)?;
    conn.execute_batch(
        "
        CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            gender VARCHAR,
            age INTEGER,
            nationality VARCHAR,
            work_country VARCHAR,
            legal_entity VARCHAR,
            department VARCHAR,
            job_family VARCHAR,
            employment_type VARCHAR,
            employment_start DATE,
            employment_end DATE,
            weekly_hours DOUBLE,
            is_manager VARCHAR,
            salary DOUBLE,
            employment_level VARCHAR,
            work_location VARCHAR,
            division VARCHAR,
            role VARCHAR,
            cost_center VARCHAR,
            is_active BOOLEAN
        );
        INSERT INTO employees VALUES
            (1, 'Male', 30, 'Norwegian', 'Norway', 'ECIT AS', 'Accounting', 'Finance', 'Permanent',
             '2020-01-01', NULL, 37.5, 'No', 550000, 'Staff', 'Oslo', 'Finance', 'Accountant', 'CC100', true),
            (2, 'Female', 42, 'Norwegian', 'Norway', 'ECIT AS', 'Accounting', 'Finance', 'Permanent',
             '2018-06-01', NULL, 37.5, 'Yes', 720000, 'Manager', 'Oslo', 'Finance', 'Manager', 'CC100', true),
            (3, 'Male', 55, 'Norwegian', 'Norway', 'ECIT Consulting', 'IT', 'Technology', 'Permanent',
             '2015-03-15', NULL, 37.5, 'No', 680000, 'Senior', 'Bergen', 'Technology', 'Consultant', 'CC200', true),
            (4, 'Female', 28, 'Danish', 'Denmark', 'ECIT DK', 'Accounting', 'Finance', 'Permanent',
             '2022-01-10', NULL, 37.0, 'No', 420000, 'Staff', 'Copenhagen', 'Finance', 'Accountant', 'CC300', true),
            (5, 'Male', 35, 'Danish', 'Denmark', 'ECIT DK', 'Sales', 'Commercial', 'Permanent',
             '2019-08-01', NULL, 37.0, 'Yes', 580000, 'Manager', 'Copenhagen', 'Sales', 'Manager', 'CC300', true),
            (6, 'Female', 38, 'Swedish', 'Sweden', 'ECIT SE', 'Accounting', 'Finance', 'Permanent',
             '2021-02-01', NULL, 40.0, 'No', 490000, 'Staff', 'Stockholm', 'Finance', 'Accountant', 'CC400', true),
            (7, 'Male', 24, 'Norwegian', 'Norway', 'ECIT AS', 'IT', 'Technology', 'Temporary',
             '2024-06-01', NULL, 20.0, 'No', 300000, 'Junior', 'Oslo', 'Technology', 'Developer', 'CC200', true),
            (8, 'Male', 48, 'Norwegian', 'Norway', 'ECIT AS', 'Accounting', 'Finance', 'Permanent',
             '2017-01-15', '2025-06-30', 37.5, 'No', 600000, 'Senior', 'Oslo', 'Finance', 'Controller', 'CC100', false),
            (9, 'Female', 33, 'Danish', 'Finland', 'ECIT DK', 'Accounting', 'Finance', 'Permanent',
             '2020-03-01', '2024-12-31', 37.0, 'No', 440000, 'Staff', 'Helsinki', 'Finance', 'Accountant', 'CC300', false),
            (10, 'Male', 62, 'Norwegian', 'Norway', 'ECIT Consulting', 'IT', 'Technology', 'Permanent',
             '2010-01-01', '2027-06-30', 37.5, 'No', 750000, 'Senior', 'Bergen', 'Technology', 'Architect', 'CC200', true);

        CREATE TABLE age_buckets (
            min_age INTEGER,
            max_age INTEGER,
            label VARCHAR
        );
        CREATE TABLE legacy_staff (id INTEGER, name VARCHAR);
        ",
    )?;
    Ok(())
}

struct Fixture {
    _dir: TempDir,
    connection: Arc<DuckDbConnection>,
    engine: AnalysisEngine,
}

fn fixture() -> Fixture {
    fixture_with("")
}

/// The standard fixture with `extra_sql` applied before the engine opens it.
fn fixture_with(extra_sql: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("staff.duckdb");
    bootstrap_duckdb(&db_path).unwrap();
    if !extra_sql.is_empty() {
        let conn = duckdb::Connection::open(&db_path).unwrap();
        conn.execute_batch(extra_sql).unwrap();
    }
    let connection = Arc::new(DuckDbConnection::new(&db_path).with_max_concurrency(4));
    let engine = AnalysisEngine::new(connection.clone(), "employees");
    Fixture {
        _dir: dir,
        connection,
        engine,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn flat(result: &staffmetrics::AnalysisResult) -> &BTreeMap<String, Value> {
    result.data.as_flat().expect("flat result")
}

async fn total(engine: &AnalysisEngine, request: AnalysisRequest) -> f64 {
    let result = engine.execute(&request).await.unwrap();
    flat(&result)["All"].as_f64().unwrap()
}

#[tokio::test]
async fn headcount_by_gender_counts_active_only() {
    let fx = fixture();
    let result = fx
        .engine
        .execute(&AnalysisRequest::new("count", "gender"))
        .await
        .unwrap();
    let data = flat(&result);
    assert_eq!(data["Female"], json!(3));
    assert_eq!(data["Male"], json!(5));
    let sum: i64 = data.values().filter_map(Value::as_i64).sum();
    assert_eq!(sum, 8);
    assert_eq!(result.meta.total_groups, 2);
    assert_eq!(result.meta.group_by_label, "Gender");
}

#[tokio::test]
async fn snapshot_redefines_population() {
    let fx = fixture();
    let engine = &fx.engine;
    assert_eq!(total(engine, AnalysisRequest::total("count")).await, 8.0);
    assert_eq!(
        total(engine, AnalysisRequest::total("count").active_only(false)).await,
        10.0
    );
    assert_eq!(
        total(engine, AnalysisRequest::total("count").as_of(date(2025, 1, 1))).await,
        9.0
    );
    assert_eq!(
        total(engine, AnalysisRequest::total("count").as_of(date(2020, 6, 1))).await,
        7.0
    );
}

#[tokio::test]
async fn snapshot_counts_follow_hires_and_terminations() {
    let fx = fixture();
    let mut counts = Vec::new();
    for day in [
        date(2024, 5, 31),
        date(2024, 6, 1),
        date(2024, 12, 30),
        date(2024, 12, 31),
        date(2025, 6, 29),
        date(2025, 6, 30),
    ] {
        counts.push(total(&fx.engine, AnalysisRequest::total("count").as_of(day)).await);
    }
    // hire on 2024-06-01, terminations effective on their end dates
    assert_eq!(counts, vec![9.0, 10.0, 10.0, 9.0, 9.0, 8.0]);
}

#[tokio::test]
async fn multi_value_filter_equals_sum_of_single_filters() {
    let fx = fixture();
    let both = fx
        .engine
        .execute(
            &AnalysisRequest::new("count", "work_country")
                .filter_any("work_country", ["Norway", "Denmark"]),
        )
        .await
        .unwrap();
    let norway = fx
        .engine
        .execute(
            &AnalysisRequest::new("count", "work_country").filter_any("work_country", ["Norway"]),
        )
        .await
        .unwrap();
    let denmark = fx
        .engine
        .execute(
            &AnalysisRequest::new("count", "work_country").filter_one("work_country", "Denmark"),
        )
        .await
        .unwrap();

    let sum = |r: &staffmetrics::AnalysisResult| -> i64 {
        flat(r).values().filter_map(Value::as_i64).sum()
    };
    assert_eq!(sum(&both), sum(&norway) + sum(&denmark));
    assert_eq!(sum(&both), 7);
    assert_eq!(flat(&both).len(), 2);
}

#[tokio::test]
async fn empty_filter_set_means_no_filter() {
    let fx = fixture();
    let unfiltered = total(&fx.engine, AnalysisRequest::total("count")).await;
    let empty = total(
        &fx.engine,
        AnalysisRequest::total("count").filter_any("department", Vec::<String>::new()),
    )
    .await;
    assert_eq!(unfiltered, empty);
}

#[tokio::test]
async fn median_lies_between_min_and_max() {
    let fx = fixture();
    for group_by in ["work_country", "department", "gender", "all"] {
        let run = |metric: &str| {
            let request = AnalysisRequest::new(metric, group_by).active_only(false);
            let engine = fx.engine.clone();
            async move { engine.execute(&request).await.unwrap() }
        };
        let median = run("median_salary").await;
        let min = run("min_salary").await;
        let max = run("max_salary").await;
        for (group, value) in flat(&median) {
            let m = value.as_f64().unwrap();
            let lo = flat(&min)[group].as_f64().unwrap();
            let hi = flat(&max)[group].as_f64().unwrap();
            assert!(lo <= m && m <= hi, "{group_by}/{group}: {lo} <= {m} <= {hi}");
        }
    }

    let overall = total(&fx.engine, AnalysisRequest::total("median_salary")).await;
    assert_eq!(overall, 565_000.0);
}

#[tokio::test]
async fn percentages_round_to_one_decimal() {
    let fx = fixture();
    assert_eq!(total(&fx.engine, AnalysisRequest::total("pct_female")).await, 37.5);
    assert_eq!(total(&fx.engine, AnalysisRequest::total("pct_leaders")).await, 25.0);
}

#[tokio::test]
async fn split_produces_nested_groups() {
    let fx = fixture();
    let result = fx
        .engine
        .execute(&AnalysisRequest::new("count", "work_country").split_by("gender"))
        .await
        .unwrap();
    let data = result.data.as_nested().unwrap();
    assert_eq!(data["Norway"]["Female"], json!(1));
    assert_eq!(data["Norway"]["Male"], json!(4));
    assert_eq!(data["Denmark"]["Female"], json!(1));
    assert_eq!(data["Sweden"].len(), 1);
    assert!(!data.contains_key("Finland"));
    assert_eq!(result.meta.split_by_label.as_deref(), Some("Gender"));
}

#[tokio::test]
async fn default_age_and_tenure_buckets() {
    let fx = fixture();
    let ages = fx
        .engine
        .execute(&AnalysisRequest::new("count", "age_group"))
        .await
        .unwrap();
    assert_eq!(
        flat(&ages),
        &[
            ("25-34".to_string(), json!(2)),
            ("35-44".to_string(), json!(3)),
            ("55-64".to_string(), json!(2)),
            ("Under 25".to_string(), json!(1)),
        ]
        .into_iter()
        .collect::<BTreeMap<_, _>>()
    );

    let tenure = fx
        .engine
        .execute(&AnalysisRequest::new("count", "tenure_group").as_of(date(2025, 1, 1)))
        .await
        .unwrap();
    let data = flat(&tenure);
    assert_eq!(data["Under 1 year"], json!(1));
    assert_eq!(data["2-5 years"], json!(2));
    assert_eq!(data["5-10 years"], json!(5));
    assert_eq!(data["Over 10 years"], json!(1));
}

#[tokio::test]
async fn stored_age_buckets_are_read_on_every_call() {
    let fx = fixture();
    fx.connection
        .execute_sql(
            "INSERT INTO age_buckets VALUES (0, 39, 'Under 40'), (40, 150, '40+')",
            &[],
        )
        .await
        .unwrap();
    let engine = fx.engine.clone().with_bucket_source(Arc::new(TableBucketSource::new(
        fx.connection.clone(),
        "age_buckets",
    )));

    let request = AnalysisRequest::new("count", "age_group");
    let first = engine.execute(&request).await.unwrap();
    assert_eq!(flat(&first)["Under 40"], json!(5));
    assert_eq!(flat(&first)["40+"], json!(3));

    fx.connection
        .execute_sql("UPDATE age_buckets SET label = 'Forty plus' WHERE min_age = 40", &[])
        .await
        .unwrap();
    let second = engine.execute(&request).await.unwrap();
    assert_eq!(flat(&second)["Forty plus"], json!(3));
    assert!(!flat(&second).contains_key("40+"));
}

#[tokio::test]
async fn empty_bucket_table_falls_back_to_defaults() {
    let fx = fixture();
    let engine = fx.engine.clone().with_bucket_source(Arc::new(TableBucketSource::new(
        fx.connection.clone(),
        "age_buckets",
    )));
    let result = engine
        .execute(&AnalysisRequest::new("count", "age_group"))
        .await
        .unwrap();
    assert_eq!(flat(&result)["35-44"], json!(3));
}

#[tokio::test]
async fn filter_catalog_respects_population() {
    let fx = fixture();
    let active = fx.engine.list_values(true, None).await.unwrap();
    assert_eq!(active["work_country"], vec!["Denmark", "Norway", "Sweden"]);
    assert!(!active.contains_key("age_group"));

    let everyone = fx.engine.list_values(false, None).await.unwrap();
    assert!(everyone["work_country"].contains(&"Finland".to_string()));

    let snapshot = fx
        .engine
        .list_values(true, Some(date(2020, 6, 1)))
        .await
        .unwrap();
    assert_eq!(snapshot["work_country"], vec!["Denmark", "Finland", "Norway"]);
}

#[tokio::test]
async fn options_list_catalog_and_values() {
    let fx = fixture();
    let options = fx.engine.options(true, None).await.unwrap();
    assert_eq!(options.metrics[0].id, "count");
    assert_eq!(options.dimensions.last().unwrap().id, "all");
    assert_eq!(options.dimensions.last().unwrap().label, "All (total)");
    assert!(options.filter_values["department"].contains(&"IT".to_string()));
}

#[tokio::test]
async fn schema_verification() {
    let fx = fixture();
    let schema = fx.engine.verify_schema().await.unwrap();
    assert!(schema.has_column("salary"));
    assert_eq!(schema.primary_keys, vec!["id".to_string()]);
    let column = |name: &str| schema.columns.iter().find(|c| c.name == name).unwrap();
    assert_eq!(column("employment_start").data_type, "DATE");
    assert_eq!(column("salary").data_type, "DOUBLE");
    assert!(column("employment_end").nullable);

    let legacy = AnalysisEngine::new(fx.connection.clone(), "legacy_staff");
    let err = legacy.verify_schema().await.unwrap_err();
    assert!(matches!(err, StaffmetricsError::Schema(_)));
    assert!(err.to_string().contains("salary"));
}

#[tokio::test]
async fn invalid_requests_fail_before_touching_the_store() {
    let fx = fixture();
    let err = fx
        .engine
        .execute(&AnalysisRequest::new("count", "gender").split_by("favourite_colour"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("favourite_colour"));
}

#[tokio::test]
async fn execution_is_idempotent() {
    let fx = fixture();
    let request = AnalysisRequest::new("avg_salary", "department")
        .split_by("is_manager")
        .filter_any("work_country", ["Norway", "Denmark", "Sweden"]);
    let a = fx.engine.execute(&request).await.unwrap();
    let b = fx.engine.execute(&request).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test]
async fn tenure_without_snapshot_measures_to_today() {
    let fx = fixture();
    // Tenure only grows with the reference date; at 2026-10-16 the active
    // average is already above 7.9 years.
    let avg = total(&fx.engine, AnalysisRequest::total("avg_tenure")).await;
    assert!(avg >= 7.9, "{avg}");

    let result = fx
        .engine
        .execute(&AnalysisRequest::new("count", "tenure_group"))
        .await
        .unwrap();
    let data = flat(&result);
    assert!(!data.contains_key("Unknown"), "{data:?}");
    assert_eq!(data.values().filter_map(Value::as_i64).sum::<i64>(), 8);
    assert!(data.contains_key("Over 10 years"));
}

#[tokio::test]
async fn future_start_date_counts_as_under_one_year() {
    let fx = fixture_with(
        "INSERT INTO employees VALUES
            (11, 'Female', 26, 'Norwegian', 'Norway', 'ECIT AS', 'IT', 'Technology', 'Permanent',
             '2999-01-01', NULL, 37.5, 'No', 500000, 'Staff', 'Oslo', 'Technology', 'Developer',
             'CC200', true);",
    );
    let before = fixture();
    let with_hire = fx
        .engine
        .execute(&AnalysisRequest::new("count", "tenure_group"))
        .await
        .unwrap();
    let without = before
        .engine
        .execute(&AnalysisRequest::new("count", "tenure_group"))
        .await
        .unwrap();

    let under = |r: &staffmetrics::AnalysisResult| {
        flat(r).get("Under 1 year").and_then(Value::as_i64).unwrap_or(0)
    };
    assert_eq!(under(&with_hire), under(&without) + 1);
    assert!(!flat(&with_hire).contains_key("Unknown"));
}

#[tokio::test]
async fn split_without_grouping_nests_under_all() {
    let fx = fixture_with("UPDATE employees SET age = NULL WHERE id = 1;");
    let result = fx
        .engine
        .execute(&AnalysisRequest::total("count").split_by("gender"))
        .await
        .unwrap();
    let nested = result.data.as_nested().expect("nested result");
    assert_eq!(nested["All"]["Female"], json!(3));
    assert_eq!(nested["All"]["Male"], json!(5));
    assert_eq!(result.meta.split_by.as_deref(), Some("gender"));

    // The null guard of the split only drops records the split cannot place.
    let by_age = fx
        .engine
        .execute(&AnalysisRequest::total("count").split_by("age_group"))
        .await
        .unwrap();
    let by_age = &by_age.data.as_nested().expect("nested result")["All"];
    assert_eq!(by_age.values().filter_map(Value::as_i64).sum::<i64>(), 7);
    assert_eq!(total(&fx.engine, AnalysisRequest::total("count")).await, 8.0);
}

#[tokio::test]
async fn churn_over_a_year() {
    let fx = fixture();
    let report = fx
        .engine
        .churn(&ChurnRequest::new(date(2024, 1, 1), date(2024, 12, 31)))
        .await
        .unwrap();
    assert_eq!((report.terminated, report.hired, report.headcount), (1, 1, 10));
    assert_eq!(report.churn_rate_pct, 10.0);
    assert_eq!(report.net_change, 0);
    assert!(report.groups.is_empty());

    let report = fx
        .engine
        .churn(&ChurnRequest::new(date(2025, 1, 1), date(2025, 12, 31)).group_by("work_country"))
        .await
        .unwrap();
    assert_eq!((report.terminated, report.hired, report.headcount), (1, 0, 9));
    assert_eq!(report.churn_rate_pct, 11.11);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups["Norway"].net_change, -1);
}

#[tokio::test]
async fn churn_by_country_keeps_both_sides() {
    let fx = fixture();
    let report = fx
        .engine
        .churn(&ChurnRequest::new(date(2024, 1, 1), date(2024, 12, 31)).group_by("work_country"))
        .await
        .unwrap();
    let finland = report.groups["Finland"];
    assert_eq!((finland.terminated, finland.hired, finland.net_change), (1, 0, -1));
    let norway = report.groups["Norway"];
    assert_eq!((norway.terminated, norway.hired, norway.net_change), (0, 1, 1));
}

#[tokio::test]
async fn monthly_churn_covers_the_year() {
    let fx = fixture();
    let months = fx.engine.monthly_churn(2024).await.unwrap();
    assert_eq!(months.len(), 12);
    assert_eq!(months[0].month, "2024-01");
    assert_eq!(months[11].month, "2024-12");

    let hired: Vec<i64> = months.iter().map(|m| m.report.hired).collect();
    assert_eq!(hired, vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
    assert_eq!(months[11].report.terminated, 1);
    assert_eq!(months[11].report.headcount, 10);
    assert_eq!(months[11].report.churn_rate_pct, 10.0);
    let departures: i64 = months.iter().map(|m| m.report.terminated).sum();
    assert_eq!(departures, 1);
}

