#[path = "../common/mod.rs"]
mod common;

use common::*;
use std::sync::Mutex;

use insta::assert_snapshot;
use vista::condition::{
    BasicConditionCompiler, Compiled, ConditionCompiler, ConditionError, FilterCond,
};
use vista::model::{DataScopeNode, DataType, FieldSet, NodeConfig, SqlNodeConfig, ViewType};
use vista::sql::{build_view_sql, SqlGenerator};

#[test]
fn test_atomic_view() {
    let mut view = orders_view();
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @"SELECT * FROM sales.orders");
}

#[test]
fn test_atomic_view_with_stored_sql() {
    let mut view = orders_view();
    view.sql_str = Some("SELECT id, amount FROM sales.orders WHERE amount > 0".to_string());
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @"SELECT id, amount FROM sales.orders WHERE amount > 0");
}

#[test]
fn test_union_all_with_constants() {
    let mut view = ledger_view();
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT "id" AS "entry_id", "amount" AS "value", 'order' AS "kind" FROM (SELECT "id", "amount" FROM sales.orders) AS t1 UNION ALL SELECT "id" AS "entry_id", "amount" AS "value", 'refund' AS "kind" FROM (SELECT "id", "amount" FROM sales.refunds) AS t2"#);
}

#[test]
fn test_union_lineage_uses_output_names() {
    let mut view = ledger_view();
    build_view_sql(&mut view, &BasicConditionCompiler).unwrap();

    let lineage = view.node("ledger").unwrap().output_fields_map.as_ref().unwrap();
    let value = lineage.get("value").unwrap();
    assert_eq!(value.original_name, "value");
    assert_eq!(value.data_type, DataType::Double);

    // The output node has no fields of its own and inherits the union's.
    let out = view.node("out").unwrap().output_fields_map.as_ref().unwrap();
    assert_eq!(out.names().collect::<Vec<_>>(), vec!["entry_id", "value", "kind"]);
}

#[test]
fn test_left_join() {
    let mut view = order_customers_view();
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT * FROM (SELECT "id", "customer_id", "amount" FROM sales.orders) AS lft LEFT JOIN (SELECT "id", "region" FROM sales.customers) AS rgt ON lft."customer_id" = rgt."id""#);
}

#[test]
fn test_view_node_filter() {
    let mut view = custom_view(
        "big_orders",
        vec![
            view_node_filtered(
                "orders",
                orders_view(),
                vec![field("id", DataType::Long), field("amount", DataType::Double)],
                Some(FilterCond::leaf("amount", ">", 100)),
            ),
            output_node("orders"),
        ],
    );
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT "id", "amount" FROM sales.orders WHERE "amount" > 100"#);
}

#[test]
fn test_sql_node_substitutes_inputs() {
    let mut view = custom_view(
        "raw",
        vec![
            view_node(
                "orders",
                orders_view(),
                vec![field("id", DataType::Long), field("amount", DataType::Double)],
            ),
            DataScopeNode::new(
                "s",
                NodeConfig::Sql(SqlNodeConfig {
                    sql_expression: "SELECT id AS order_id FROM {{.orders}} o WHERE o.amount > 0"
                        .to_string(),
                }),
            )
            .with_inputs(["orders"])
            .with_output_fields(vec![field("order_id", DataType::Long)]),
            output_node("s"),
        ],
    );
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT id AS order_id FROM (SELECT "id", "amount" FROM sales.orders) o WHERE o.amount > 0"#);
}

#[test]
fn test_sql_node_rejects_foreign_placeholder() {
    let mut view = custom_view(
        "raw",
        vec![
            view_node("orders", orders_view(), vec![field("id", DataType::Long)]),
            DataScopeNode::new(
                "s",
                NodeConfig::Sql(SqlNodeConfig {
                    sql_expression: "SELECT * FROM {{.customers}}".to_string(),
                }),
            )
            .with_inputs(["orders"]),
            output_node("s"),
        ],
    );
    let err = build_view_sql(&mut view, &BasicConditionCompiler).unwrap_err();
    assert_eq!(err.node_id(), Some("s"));
    assert!(err.to_string().contains("customers"));
}

#[test]
fn test_unresolved_union_field() {
    let mut view = ledger_view();
    if let NodeConfig::Union(cfg) = &mut view.data_scope[2].config {
        cfg.union_fields[1][0] = from_field("refund_id");
    }
    let err = build_view_sql(&mut view, &BasicConditionCompiler).unwrap_err();
    assert_eq!(err.node_id(), Some("ledger"));
    assert!(err.to_string().contains("refund_id"));
}

#[test]
fn test_node_sql_is_memoized() {
    let view = ledger_view();
    let mut generator = SqlGenerator::new(&view, &BasicConditionCompiler);
    let first = generator.build_node("orders").unwrap();
    let whole = generator.build_view().unwrap();
    assert!(whole.contains(&first));
    assert_eq!(generator.build_node("orders").unwrap(), first);
    assert!(generator.lineage("refunds").is_some());
}

#[test]
fn test_generation_is_deterministic() {
    let a = build_view_sql(&mut order_customers_view(), &BasicConditionCompiler).unwrap();
    let b = build_view_sql(&mut order_customers_view(), &BasicConditionCompiler).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_multi_key_join_emits_one_equality_per_pair() {
    let both = || vec![field("id", DataType::Long), field("amount", DataType::Double)];
    let mut view = custom_view(
        "matched_refunds",
        vec![
            view_node("orders", orders_view(), both()),
            view_node("refunds", refunds_view(), both()),
            join_node("joined", "orders", "refunds", &[("id", "id"), ("amount", "amount")], both()),
            output_node("joined"),
        ],
    );
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT * FROM (SELECT "id", "amount" FROM sales.orders) AS lft LEFT JOIN (SELECT "id", "amount" FROM sales.refunds) AS rgt ON lft."id" = rgt."id" AND lft."amount" = rgt."amount""#);
}

#[test]
fn test_input_sql_with_braces_is_not_a_placeholder() {
    let mut view = custom_view(
        "named",
        vec![
            view_node_filtered(
                "orders",
                customers_view(),
                vec![field("id", DataType::Long), field("name", DataType::String)],
                Some(FilterCond::leaf("name", "==", "{{x}}")),
            ),
            DataScopeNode::new(
                "s",
                NodeConfig::Sql(SqlNodeConfig {
                    sql_expression: "SELECT id FROM {{.orders}} o".to_string(),
                }),
            )
            .with_inputs(["orders"])
            .with_output_fields(vec![field("id", DataType::Long)]),
            output_node("s"),
        ],
    );
    let sql = build_view_sql(&mut view, &BasicConditionCompiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT id FROM (SELECT "id", "name" FROM sales.customers WHERE "name" = '{{x}}') o"#);
}

#[test]
fn test_cyclic_scope_is_rejected() {
    let sql_node = |id: &str, input: &str| {
        DataScopeNode::new(
            id,
            NodeConfig::Sql(SqlNodeConfig {
                sql_expression: format!("SELECT * FROM {{{{.{}}}}}", input),
            }),
        )
        .with_inputs([input])
    };
    let view = custom_view(
        "looped",
        vec![sql_node("s1", "s2"), sql_node("s2", "s1"), output_node("s1")],
    );
    let mut generator = SqlGenerator::new(&view, &BasicConditionCompiler);
    let err = generator.build_view().unwrap_err();
    assert_eq!(err.node_id(), Some("s1"));
    assert!(err.to_string().contains("reachable from itself"));
}

/// Delegates to the basic compiler and remembers the view type it was given.
#[derive(Default)]
struct RecordingCompiler {
    seen: Mutex<Vec<ViewType>>,
}

impl ConditionCompiler for RecordingCompiler {
    fn compile(
        &self,
        filter: &FilterCond,
        view_type: ViewType,
        fields: &FieldSet,
    ) -> Result<Option<Compiled>, ConditionError> {
        self.seen.lock().unwrap().push(view_type);
        BasicConditionCompiler.compile(filter, view_type, fields)
    }
}

#[test]
fn test_view_node_filter_uses_source_view_type() {
    let mut source = orders_view();
    source.view_type = ViewType::Custom;
    let mut view = custom_view(
        "big_orders",
        vec![
            view_node_filtered(
                "orders",
                source,
                vec![field("id", DataType::Long)],
                Some(FilterCond::leaf("amount", ">", 100)),
            ),
            output_node("orders"),
        ],
    );
    let compiler = RecordingCompiler::default();
    let sql = build_view_sql(&mut view, &compiler).unwrap();
    assert_snapshot!(sql, @r#"SELECT "id" FROM sales.orders WHERE "amount" > 100"#);
    assert_eq!(compiler.seen.lock().unwrap().as_slice(), &[ViewType::Custom]);
}
