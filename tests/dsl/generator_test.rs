#[path = "../common/mod.rs"]
mod common;

use common::*;
use insta::assert_snapshot;
use serde_json::{json, Value};
use vista::condition::{BasicConditionCompiler, FilterCond};
use vista::config::QuerySettings;
use vista::dsl::{build_dsl, DslCompilation, NodeRoutes};
use vista::error::ViewError;
use vista::model::{
    DataType, DataView, FeatureType, Pagination, QueryType, RowColumnRule, SortDirection,
    SortParam, ViewQuery,
};
use vista::validation::validate_view;

fn compile_with(
    view: &mut DataView,
    query: &ViewQuery,
    pagination: &Pagination,
    routes: &NodeRoutes,
) -> Result<DslCompilation, ViewError> {
    let settings = QuerySettings::default();
    validate_view(view, &settings)?;
    build_dsl(view, query, pagination, routes, &BasicConditionCompiler, &settings)
}

fn compile(view: &mut DataView, query: &ViewQuery) -> Result<DslCompilation, ViewError> {
    let pagination = query.pagination(view.query_type)?;
    compile_with(view, query, &pagination, &NodeRoutes::new())
}

fn body(compiled: &DslCompilation) -> Value {
    serde_json::to_value(&compiled.query).unwrap()
}

fn merged_routes() -> NodeRoutes {
    let mut routes = NodeRoutes::new();
    routes.insert("n_logs".to_string(), vec!["ds-logs-2024.01.01".to_string()]);
    routes.insert("n_audit".to_string(), vec!["ds-audit-2024.01.01".to_string()]);
    routes
}

#[test]
fn test_atomic_index_view_defaults() {
    let compiled = compile(&mut logs_view(), &ViewQuery::default()).unwrap();
    let text = String::from_utf8(compiled.query.to_bytes().unwrap()).unwrap();
    assert_snapshot!(text, @r#"{"from":0,"size":10,"sort":[{"@timestamp":"desc"}],"query":{"bool":{}}}"#);
}

#[test]
fn test_time_range_and_filter() {
    let query = ViewQuery {
        start: 1_704_067_200_000,
        end: 1_704_153_600_000,
        filters: Some(FilterCond::and(vec![
            FilterCond::leaf("host", "==", "web-1"),
            FilterCond::leaf("status", ">=", 500),
        ])),
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(
        body(&compiled)["query"],
        json!({"bool": {"filter": [
            {"range": {"@timestamp": {"gte": 1_704_067_200_000_i64, "lte": 1_704_153_600_000_i64}}},
            {"bool": {"filter": [
                {"term": {"host": "web-1"}},
                {"range": {"status": {"gte": 500}}}
            ]}}
        ]}})
    );
    assert!(!compiled.query.track_scores);
}

#[test]
fn test_scoring_filter_goes_to_must() {
    let query = ViewQuery {
        filters: Some(FilterCond::leaf("message", "match", "timeout")),
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(
        body(&compiled)["query"],
        json!({"bool": {"must": [{"match": {"message": "timeout"}}]}})
    );
    assert!(compiled.query.track_scores);
}

#[test]
fn test_custom_view_branches_per_node() {
    let query = ViewQuery::default();
    let mut view = merged_logs_view();
    let pagination = query.pagination(QueryType::IndexBase).unwrap();
    let compiled = compile_with(&mut view, &query, &pagination, &merged_routes()).unwrap();

    assert_eq!(
        body(&compiled)["query"],
        json!({"bool": {
            "should": [
                {"bool": {"filter": [
                    {"terms": {"_index": ["ds-logs-2024.01.01"]}},
                    {"range": {"status": {"gte": 500}}}
                ]}},
                {"bool": {"filter": [
                    {"terms": {"_index": ["ds-audit-2024.01.01"]}}
                ]}}
            ],
            "minimum_should_match": 1
        }})
    );
}

#[test]
fn test_unrouted_node_matches_nothing() {
    let query = ViewQuery::default();
    let mut view = merged_logs_view();
    let mut routes = merged_routes();
    routes.remove("n_audit");
    let pagination = query.pagination(QueryType::IndexBase).unwrap();
    let compiled = compile_with(&mut view, &query, &pagination, &routes).unwrap();

    let should = &body(&compiled)["query"]["bool"]["should"];
    assert_eq!(should[1], json!({"bool": {"filter": [{"terms": {"_index": []}}]}}));
}

#[test]
fn test_binary_sort_rejected() {
    let query = ViewQuery {
        sort: vec![SortParam::new("payload", SortDirection::Asc)],
        ..Default::default()
    };
    let err = compile(&mut logs_view(), &query).unwrap_err();
    assert!(matches!(err, ViewError::BinaryFieldSort(ref f) if f == "payload"));
    assert!(err.is_client_fault());
}

#[test]
fn test_text_sort_needs_keyword() {
    let query = ViewQuery {
        sort: vec![
            SortParam::new("message", SortDirection::Asc),
            SortParam::new("status", SortDirection::Asc),
        ],
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(
        body(&compiled)["sort"],
        json!([{"status": "asc"}, {"@timestamp": "desc"}])
    );

    let mut view = logs_view();
    view.fields = vec![
        field("@timestamp", DataType::Date),
        field("message", DataType::Text).with_feature(FeatureType::Keyword),
    ]
    .into();
    let compiled = compile(&mut view, &query).unwrap();
    assert_eq!(
        body(&compiled)["sort"],
        json!([{"message.keyword": "asc"}, {"status": "asc"}, {"@timestamp": "desc"}])
    );
}

#[test]
fn test_score_alias_and_dedupe() {
    let query = ViewQuery {
        sort: vec![
            SortParam::new("__score", SortDirection::Desc),
            SortParam::new("@timestamp", SortDirection::Asc),
        ],
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(
        body(&compiled)["sort"],
        json!([{"_score": "desc"}, {"@timestamp": "asc"}])
    );
}

#[test]
fn test_point_in_time_page() {
    let pagination = Pagination::SearchAfter {
        cursor: vec![json!(1_704_067_200_000_i64), json!("doc-9")],
        pit_id: Some("pit-1".to_string()),
        pit_keep_alive: Some("1m".to_string()),
    };
    let compiled =
        compile_with(&mut logs_view(), &ViewQuery::default(), &pagination, &NodeRoutes::new()).unwrap();
    let value = body(&compiled);

    assert_eq!(value["size"], json!(10_000));
    assert_eq!(value["sort"], json!([{"@timestamp": "desc"}, {"__id": "desc"}]));
    assert_eq!(value["pit"], json!({"id": "pit-1", "keep_alive": "1m"}));
    assert_eq!(value["search_after"], json!([1_704_067_200_000_i64, "doc-9"]));
}

#[test]
fn test_first_cursor_page_size() {
    let explicit = ViewQuery {
        use_search_after: true,
        limit: 50,
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &explicit).unwrap();
    assert_eq!(compiled.query.size, 50);

    let defaulted = ViewQuery {
        use_search_after: true,
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &defaulted).unwrap();
    assert_eq!(compiled.query.size, 10);
}

#[test]
fn test_offset_page() {
    let query = ViewQuery {
        limit: 25,
        offset: 50,
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(compiled.query.from, 50);
    assert_eq!(compiled.query.size, 25);
}

#[test]
fn test_raw_dsl_view_totals_and_cursor() {
    let mut view = logs_view();
    view.query_type = QueryType::Dsl;
    let query = ViewQuery {
        need_total: true,
        use_search_after: true,
        ..Default::default()
    };
    let compiled = compile(&mut view, &query).unwrap();
    let value = body(&compiled);

    assert_eq!(value["track_total_hits"], json!(true));
    assert_eq!(value["sort"], json!([{"_id": "desc"}]));
}

#[test]
fn test_row_rules_narrow_fields() {
    let query = ViewQuery {
        row_column_rules: vec![RowColumnRule {
            id: "r1".to_string(),
            name: "web only".to_string(),
            fields: vec!["host".to_string(), "status".to_string()],
            row_filters: Some(FilterCond::leaf("host", "prefix", "web-")),
        }],
        ..Default::default()
    };
    let compiled = compile(&mut logs_view(), &query).unwrap();
    assert_eq!(compiled.fields.names().collect::<Vec<_>>(), vec!["host", "status"]);
    assert_eq!(
        body(&compiled)["query"],
        json!({"bool": {"filter": [{"prefix": {"host": "web-"}}]}})
    );
}

#[test]
fn test_compilation_is_deterministic() {
    let query = ViewQuery {
        start: 1,
        end: 2,
        filters: Some(FilterCond::leaf("host", "in", json!(["web-1", "web-2"]))),
        sort: vec![SortParam::new("host", SortDirection::Desc)],
        ..Default::default()
    };
    let pagination = query.pagination(QueryType::IndexBase).unwrap();
    let first = compile_with(&mut merged_logs_view(), &query, &pagination, &merged_routes()).unwrap();
    let second = compile_with(&mut merged_logs_view(), &query, &pagination, &merged_routes()).unwrap();
    assert_eq!(
        first.query.to_bytes().unwrap(),
        second.query.to_bytes().unwrap()
    );
}
