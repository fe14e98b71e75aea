#[path = "../common/mod.rs"]
mod common;

use common::*;
use insta::assert_snapshot;
use serde_json::json;
use vista::condition::{BasicConditionCompiler, FilterCond};
use vista::config::QuerySettings;
use vista::error::ViewError;
use vista::model::{
    DataType, DataView, RowColumnRule, SearchAfterParams, SortDirection, SortParam, ViewQuery,
};
use vista::sql::{compose_request_sql, RequestSql};
use vista::validation::validate_view;

fn compose(view: &mut DataView, query: &ViewQuery) -> Result<RequestSql, ViewError> {
    let settings = QuerySettings::default();
    validate_view(view, &settings)?;
    let pagination = query.pagination(view.query_type)?;
    compose_request_sql(view, query, &pagination, &BasicConditionCompiler, &settings)
}

#[test]
fn test_default_page() {
    let request = compose(&mut orders_view(), &ViewQuery::default()).unwrap();
    assert_snapshot!(request.sql, @"SELECT * FROM sales.orders LIMIT 10");
    assert_eq!(request.limit, 10);
    assert_eq!(request.count_sql, None);
    assert_eq!(request.next_uri, None);
}

#[test]
fn test_time_window_and_filter() {
    let query = ViewQuery {
        date_field: Some("created_at".to_string()),
        start: 1_700_000_000_000,
        end: 1_700_086_400_000,
        filters: Some(FilterCond::leaf("amount", ">", 100)),
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM sales.orders WHERE ("created_at" BETWEEN from_unixtime(1700000000) AND from_unixtime(1700086400)) AND ("amount" > 100) LIMIT 10"#);
}

#[test]
fn test_open_ended_time_window() {
    let query = ViewQuery {
        date_field: Some("created_at".to_string()),
        start: 1_700_000_000_000,
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM sales.orders WHERE "created_at" >= from_unixtime(1700000000) LIMIT 10"#);
}

#[test]
fn test_count_statement() {
    let query = ViewQuery {
        need_total: true,
        filters: Some(FilterCond::leaf("id", "==", 7)),
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_snapshot!(request.count_sql.unwrap(), @r#"SELECT count(*) FROM (SELECT * FROM sales.orders WHERE "id" = 7) AS t"#);
}

#[test]
fn test_sort_and_offset() {
    let query = ViewQuery {
        sort: vec![
            SortParam::new("amount", SortDirection::Desc),
            SortParam::new("amount", SortDirection::Asc),
            SortParam::new("id", SortDirection::Asc),
        ],
        limit: 5,
        offset: 10,
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM sales.orders ORDER BY "amount" DESC, "id" ASC LIMIT 5 OFFSET 10"#);
}

#[test]
fn test_sort_over_paged_statement_is_wrapped() {
    let mut view = orders_view();
    view.sql_str = Some("SELECT * FROM sales.orders ORDER BY id LIMIT 100".to_string());
    let query = ViewQuery {
        sort: vec![SortParam::new("amount", SortDirection::Asc)],
        ..Default::default()
    };
    let request = compose(&mut view, &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM (SELECT * FROM sales.orders ORDER BY id LIMIT 100) AS sorted ORDER BY "amount" ASC LIMIT 10"#);
}

#[test]
fn test_filter_spliced_into_existing_where() {
    let mut view = orders_view();
    view.sql_str = Some("SELECT * FROM sales.orders WHERE amount > 0".to_string());
    let query = ViewQuery {
        filters: Some(FilterCond::leaf("id", "==", 7)),
        ..Default::default()
    };
    let request = compose(&mut view, &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM sales.orders WHERE (amount > 0) AND ("id" = 7) LIMIT 10"#);
}

#[test]
fn test_caller_sql_filtered_before_group_by() {
    let query = ViewQuery {
        sql: Some("SELECT region, count(*) AS n FROM sales.customers GROUP BY region".to_string()),
        filters: Some(FilterCond::leaf("region", "==", "emea")),
        ..Default::default()
    };
    let request = compose(&mut customers_view(), &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT region, count(*) AS n FROM sales.customers WHERE "region" = 'emea' GROUP BY region LIMIT 10"#);
}

#[test]
fn test_union_view_filtered_as_subquery() {
    let query = ViewQuery {
        filters: Some(FilterCond::leaf("kind", "==", "refund")),
        ..Default::default()
    };
    let request = compose(&mut ledger_view(), &query).unwrap();
    assert!(request
        .sql
        .starts_with(r#"SELECT * FROM (SELECT "id" AS "entry_id""#));
    assert!(request
        .sql
        .ends_with(r#"AS t2) AS subquery WHERE "kind" = 'refund' LIMIT 10"#));
}

#[test]
fn test_cursor_page_uses_gateway_token() {
    let query = ViewQuery {
        use_search_after: true,
        search_after: Some(SearchAfterParams {
            search_after: vec![json!("20240101_0001"), json!("tok"), json!(3)],
            ..Default::default()
        }),
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_eq!(request.sql, "SELECT * FROM sales.orders");
    assert_eq!(request.next_uri.as_deref(), Some("20240101_0001/tok/3"));
    assert_eq!(request.limit, 10_000);
}

#[test]
fn test_first_cursor_page_uses_default_limit() {
    let query = ViewQuery {
        use_search_after: true,
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_eq!(request.limit, 10);
    assert_eq!(request.next_uri, None);
}

#[test]
fn test_pit_rejected_for_sql_views() {
    let query = ViewQuery {
        search_after: Some(SearchAfterParams {
            pit_keep_alive: Some("1m".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let err = compose(&mut orders_view(), &query).unwrap_err();
    assert!(matches!(err, ViewError::InvalidQuery(_)));
}

#[test]
fn test_row_column_rules() {
    let query = ViewQuery {
        row_column_rules: vec![RowColumnRule {
            id: "r1".to_string(),
            name: "small orders".to_string(),
            fields: vec!["id".to_string(), "amount".to_string()],
            row_filters: Some(FilterCond::leaf("amount", "<", 1000)),
        }],
        ..Default::default()
    };
    let request = compose(&mut orders_view(), &query).unwrap();
    assert_snapshot!(request.sql, @r#"SELECT * FROM sales.orders WHERE "amount" < 1000 LIMIT 10"#);
    assert_eq!(request.fields.names().collect::<Vec<_>>(), vec!["id", "amount"]);
}

#[test]
fn test_binary_sort_rejected() {
    let mut view = orders_view();
    view.fields.push(field("receipt", DataType::Binary));
    let query = ViewQuery {
        sort: vec![SortParam::new("receipt", SortDirection::Asc)],
        ..Default::default()
    };
    let err = compose(&mut view, &query).unwrap_err();
    assert!(matches!(err, ViewError::BinaryFieldSort(f) if f == "receipt"));
}
