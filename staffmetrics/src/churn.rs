//! Turnover over a period: departures, hires, headcount and churn rate.
//!
//! Counts come straight from the record store and ignore the active flag;
//! every record whose employment touches the period is considered.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;

use crate::backends::BackendConnection;
use crate::buckets::UNKNOWN_LABEL;
use crate::error::{Result, StaffmetricsError};
use crate::executor::QueryResult;
use crate::query_builder::{QueryPlanner, GROUP_ALIAS, VALUE_ALIAS};
use crate::registry::ALL_GROUP_KEY;
use crate::request::ChurnRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChurnCounts {
    pub terminated: i64,
    pub hired: i64,
    pub net_change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub group_by: Option<String>,
    pub terminated: i64,
    pub hired: i64,
    /// Records employed at some point of the period.
    pub headcount: i64,
    /// `terminated / headcount * 100`, two decimals; 0 for an empty period.
    pub churn_rate_pct: f64,
    pub net_change: i64,
    /// Per-group counts; empty unless `group_by` was set.
    pub groups: BTreeMap<String, ChurnCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyChurn {
    /// `YYYY-MM`
    pub month: String,
    #[serde(flatten)]
    pub report: ChurnReport,
}

pub async fn churn(
    planner: &QueryPlanner<'_>,
    connection: &dyn BackendConnection,
    request: &ChurnRequest,
) -> Result<ChurnReport> {
    let queries = planner.churn(request, connection.dialect())?;
    let (terminated, hired, headcount) = futures::try_join!(
        connection.execute_sql(&queries.terminated.sql, &queries.terminated.params),
        connection.execute_sql(&queries.hired.sql, &queries.hired.params),
        connection.execute_sql(&queries.headcount.sql, &queries.headcount.params),
    )?;

    let grouped = queries.group_column.is_some();
    let terminated = counts_by_group(&terminated, grouped);
    let hired = counts_by_group(&hired, grouped);
    let headcount = counts_by_group(&headcount, false)
        .get(ALL_GROUP_KEY)
        .copied()
        .unwrap_or(0);

    let mut groups: BTreeMap<String, ChurnCounts> = BTreeMap::new();
    for (key, &count) in &terminated {
        groups.entry(key.clone()).or_default().terminated = count;
    }
    for (key, &count) in &hired {
        groups.entry(key.clone()).or_default().hired = count;
    }
    for counts in groups.values_mut() {
        counts.net_change = counts.hired - counts.terminated;
    }

    let total_terminated: i64 = terminated.values().sum();
    let total_hired: i64 = hired.values().sum();
    let report = ChurnReport {
        period_start: request.start_date,
        period_end: request.end_date,
        group_by: request.group_by.clone(),
        terminated: total_terminated,
        hired: total_hired,
        headcount,
        churn_rate_pct: churn_rate(total_terminated, headcount),
        net_change: total_hired - total_terminated,
        groups: if grouped { groups } else { BTreeMap::new() },
    };
    tracing::debug!(
        start = %report.period_start,
        end = %report.period_end,
        terminated = report.terminated,
        hired = report.hired,
        headcount = report.headcount,
        "computed churn"
    );
    Ok(report)
}

/// One ungrouped report per calendar month of `year`, January first.
pub async fn monthly_churn(
    planner: &QueryPlanner<'_>,
    connection: &dyn BackendConnection,
    year: i32,
) -> Result<Vec<MonthlyChurn>> {
    let months = (1..=12)
        .map(|month| ChurnRequest::month(year, month))
        .collect::<Result<Vec<_>>>()?;
    let reports = try_join_all(months.iter().map(|request| async move {
        let report = churn(planner, connection, request).await?;
        Ok::<_, StaffmetricsError>(MonthlyChurn {
            month: request.start_date.format("%Y-%m").to_string(),
            report,
        })
    }))
    .await?;
    Ok(reports)
}

fn churn_rate(terminated: i64, headcount: i64) -> f64 {
    if headcount <= 0 {
        return 0.0;
    }
    (terminated as f64 / headcount as f64 * 100.0 * 100.0).round() / 100.0
}

/// Group label → count; ungrouped results land under the total key.
fn counts_by_group(result: &QueryResult, grouped: bool) -> BTreeMap<String, i64> {
    result
        .rows
        .iter()
        .map(|row| {
            let key = match (grouped, row.get(GROUP_ALIAS)) {
                (true, Some(Value::String(label))) => label.clone(),
                (true, Some(other)) if !other.is_null() => other.to_string(),
                (true, _) => UNKNOWN_LABEL.to_string(),
                (false, _) => ALL_GROUP_KEY.to_string(),
            };
            let count = row.get(VALUE_ALIAS).and_then(Value::as_i64).unwrap_or(0);
            (key, count)
        })
        .collect()
}
