use staffmetrics::registry::{
    DimensionSource, MetricKind, Registry, Rounding, ALL_DIMENSION, ALL_DIMENSION_LABEL,
};

#[test]
fn option_listings_follow_catalog_order() {
    let registry = Registry::global();
    let metrics: Vec<String> = registry.metric_entries().into_iter().map(|e| e.id).collect();
    assert_eq!(metrics.first().map(String::as_str), Some("count"));
    assert!(metrics.contains(&"median_salary".to_string()));
    assert_eq!(metrics.len(), registry.metrics().len());

    let dims = registry.dimension_entries();
    assert_eq!(dims.len(), registry.dimensions().len() + 1);
    assert_eq!(dims[0].id, "department");
    let last = dims.last().unwrap();
    assert_eq!((last.id.as_str(), last.label.as_str()), (ALL_DIMENSION, ALL_DIMENSION_LABEL));
}

#[test]
fn filter_listing_is_the_column_backed_dimensions() {
    let registry = Registry::global();
    let filters: Vec<String> = registry.filter_entries().into_iter().map(|e| e.id).collect();
    for dim in registry.dimensions() {
        let listed = filters.contains(&dim.id.to_string());
        assert_eq!(listed, matches!(dim.source, DimensionSource::Column(_)), "{}", dim.id);
    }
    assert!(!filters.contains(&ALL_DIMENSION.to_string()));
}

#[test]
fn only_medians_need_post_aggregation() {
    for metric in Registry::global().metrics() {
        assert_eq!(
            metric.requires_post_aggregation(),
            metric.id.starts_with("median_"),
            "{}",
            metric.id
        );
        if let MetricKind::PostAggregate { .. } = metric.kind {
            assert!(!metric.null_guards.is_empty(), "{}", metric.id);
        }
    }
}

#[test]
fn rounding_matches_metric_family() {
    for metric in Registry::global().metrics() {
        let expected = if metric.id == "count" {
            Rounding::Integer
        } else if metric.id.starts_with("pct_") || metric.id == "avg_tenure" {
            Rounding::OneDecimal
        } else {
            Rounding::Whole
        };
        assert_eq!(metric.rounding, expected, "{}", metric.id);
    }
}

#[test]
fn catalog_serializes_as_id_label_pairs() {
    let entries = Registry::global().metric_entries();
    let json = serde_json::to_value(&entries[0]).unwrap();
    assert_eq!(json, serde_json::json!({"id": "count", "label": "Headcount"}));
}
