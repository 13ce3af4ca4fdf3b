//! Query results and the shaping of rows into an [`AnalysisResult`].
//!
//! Ordinary metrics arrive already aggregated, one row per group (and split).
//! Post-aggregate metrics arrive as one row per record and are bucketed and
//! reduced here.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::buckets::UNKNOWN_LABEL;
use crate::query_builder::{PlannedQuery, GROUP_ALIAS, SPLIT_ALIAS, VALUE_ALIAS};
use crate::registry::{Reducer, Rounding, ALL_GROUP_KEY};
use crate::request::{AnalysisRequest, FilterSpec, FilterValue};

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

/// Echo of the resolved request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisMeta {
    pub metric: String,
    pub metric_label: String,
    pub group_by: String,
    pub group_by_label: String,
    pub split_by: Option<String>,
    pub split_by_label: Option<String>,
    pub filters: FilterSpec,
    pub active_only: bool,
    pub snapshot_date: Option<NaiveDate>,
    pub total_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisData {
    /// `group -> value`
    Flat(BTreeMap<String, Value>),
    /// `group -> split -> value`
    Nested(BTreeMap<String, BTreeMap<String, Value>>),
}

impl AnalysisData {
    pub fn len(&self) -> usize {
        match self {
            AnalysisData::Flat(map) => map.len(),
            AnalysisData::Nested(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_flat(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            AnalysisData::Flat(map) => Some(map),
            AnalysisData::Nested(_) => None,
        }
    }

    pub fn as_nested(&self) -> Option<&BTreeMap<String, BTreeMap<String, Value>>> {
        match self {
            AnalysisData::Nested(map) => Some(map),
            AnalysisData::Flat(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub meta: AnalysisMeta,
    pub data: AnalysisData,
}

/// Turn the rows of a planned query into the result handed back to callers.
pub fn shape_result(
    planned: &PlannedQuery<'_>,
    request: &AnalysisRequest,
    result: QueryResult,
) -> AnalysisResult {
    let rounding = planned.metric.rounding;
    let grouped = planned.is_grouped();
    let nested = planned.split.is_some();

    let data = match (planned.reducer, nested) {
        (None, false) if !grouped => shape_total(&result.rows, rounding),
        (None, false) => AnalysisData::Flat(
            result
                .rows
                .iter()
                .map(|row| {
                    let value = rounding.apply(number_of(row.get(VALUE_ALIAS)));
                    (label_of(row.get(GROUP_ALIAS)), value)
                })
                .collect(),
        ),
        (None, true) => {
            let mut data: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
            for row in &result.rows {
                data.entry(group_key(row, grouped))
                    .or_default()
                    .insert(
                        label_of(row.get(SPLIT_ALIAS)),
                        rounding.apply(number_of(row.get(VALUE_ALIAS))),
                    );
            }
            AnalysisData::Nested(data)
        }
        (Some(reducer), false) => {
            AnalysisData::Flat(reduce_flat(&result.rows, grouped, reducer, rounding))
        }
        (Some(reducer), true) => {
            AnalysisData::Nested(reduce_nested(&result.rows, grouped, reducer, rounding))
        }
    };

    let meta = AnalysisMeta {
        metric: planned.metric.id.to_string(),
        metric_label: planned.metric.label.to_string(),
        group_by: planned.grouping.id().to_string(),
        group_by_label: planned.grouping.label().to_string(),
        split_by: planned.split.map(|d| d.id.to_string()),
        split_by_label: planned.split.map(|d| d.label.to_string()),
        filters: applied_filters(&request.filters),
        active_only: request.active_only,
        snapshot_date: request.snapshot_date,
        total_groups: data.len(),
    };
    AnalysisResult { meta, data }
}

fn shape_total(rows: &[Map<String, Value>], rounding: Rounding) -> AnalysisData {
    let value = rows.first().and_then(|row| number_of(row.get(VALUE_ALIAS)));
    let mut data = BTreeMap::new();
    data.insert(ALL_GROUP_KEY.to_string(), rounding.apply(value));
    AnalysisData::Flat(data)
}

fn reduce_flat(
    rows: &[Map<String, Value>],
    grouped: bool,
    reducer: Reducer,
    rounding: Rounding,
) -> BTreeMap<String, Value> {
    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let bucket = buckets.entry(group_key(row, grouped)).or_default();
        if let Some(v) = number_of(row.get(VALUE_ALIAS)) {
            bucket.push(v);
        }
    }
    buckets
        .into_iter()
        .filter_map(|(key, mut values)| {
            reducer
                .reduce(&mut values)
                .map(|v| (key, rounding.apply(Some(v))))
        })
        .collect()
}

fn reduce_nested(
    rows: &[Map<String, Value>],
    grouped: bool,
    reducer: Reducer,
    rounding: Rounding,
) -> BTreeMap<String, BTreeMap<String, Value>> {
    let mut buckets: BTreeMap<String, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
    for row in rows {
        let bucket = buckets
            .entry(group_key(row, grouped))
            .or_default()
            .entry(label_of(row.get(SPLIT_ALIAS)))
            .or_default();
        if let Some(v) = number_of(row.get(VALUE_ALIAS)) {
            bucket.push(v);
        }
    }

    let mut data = BTreeMap::new();
    for (group, splits) in buckets {
        let reduced: BTreeMap<String, Value> = splits
            .into_iter()
            .filter_map(|(split, mut values)| {
                reducer
                    .reduce(&mut values)
                    .map(|v| (split, rounding.apply(Some(v))))
            })
            .collect();
        if !reduced.is_empty() {
            data.insert(group, reduced);
        }
    }
    data
}

/// Filters that reached the query; an empty set constrains nothing.
fn applied_filters(filters: &FilterSpec) -> FilterSpec {
    filters
        .iter()
        .filter(|(_, value)| !matches!(value, FilterValue::Any(values) if values.is_empty()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Top-level key of a row: its group label, or `All` when ungrouped.
fn group_key(row: &Map<String, Value>, grouped: bool) -> String {
    if grouped {
        label_of(row.get(GROUP_ALIAS))
    } else {
        ALL_GROUP_KEY.to_string()
    }
}

/// Group or split label of a row. Missing values read as `Unknown`.
fn label_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN_LABEL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Numeric value of a row; decimals that did not fit an `f64` arrive as strings.
fn number_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
