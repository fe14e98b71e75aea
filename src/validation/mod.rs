//! Structural validation of views and their data scopes.
//!
//! A custom view is checked as a DAG: node IDs are unique, every input
//! resolves, per-type cardinalities hold and there is no cycle. Nodes are
//! then checked in topological order, so the outputs a raw-SQL node derives
//! from its expression are known before anything consumes them.
//!
//! Validation also completes the view: raw-SQL outputs are filled in, the
//! view fields default to the output node's, and the field scope widens to
//! `all` when the column list cannot be known up front.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::condition::validate_filter;
use crate::config::QuerySettings;
use crate::error::{ViewError, ViewResult};
use crate::model::{
    DataScopeNode, DataType, DataView, FieldScope, FieldSet, JoinNodeConfig, NodeConfig, NodeType,
    QueryType, SqlNodeConfig, UnionNodeConfig, UnionType, ViewField, ViewNodeConfig,
};
use crate::sql::extract_select_fields;

/// Validate a view and complete the fields validation derives.
pub fn validate_view(view: &mut DataView, settings: &QuerySettings) -> ViewResult<()> {
    if view.is_atomic() {
        view.is_single_source = true;
    } else {
        validate_data_scope(view, settings)?;
        if view.fields.is_empty() {
            view.fields = scope_output_fields(view);
        }
        if view.has_star || view.fields.is_empty() {
            view.field_scope = FieldScope::All;
        }
    }

    if let Some(dup) = view.fields.duplicate_names().first() {
        return Err(ViewError::validation(format!(
            "view field '{}' is declared more than once",
            dup
        )));
    }
    Ok(())
}

/// Validate a custom view's data scope.
pub fn validate_data_scope(view: &mut DataView, settings: &QuerySettings) -> ViewResult<()> {
    let scope = &view.data_scope;
    if scope.is_empty() {
        return Err(ViewError::validation("data scope is empty"));
    }
    if scope.len() > settings.max_scope_nodes {
        return Err(ViewError::validation(format!(
            "data scope has {} nodes, at most {} are allowed",
            scope.len(),
            settings.max_scope_nodes
        )));
    }

    let order = topological_order(scope)?;
    let query_type = source_query_type(scope)?;
    view.query_type = query_type;
    view.is_single_source = single_source(scope);

    for idx in order {
        let node = &view.data_scope[idx];
        let mut derived = None;
        match &node.config {
            NodeConfig::View(cfg) => check_view_node(node, cfg, query_type, settings)?,
            NodeConfig::Join(cfg) => check_join_node(node, cfg, &view.data_scope)?,
            NodeConfig::Union(cfg) => check_union_node(node, cfg, query_type, &view.data_scope)?,
            NodeConfig::Sql(cfg) => derived = Some(sql_node_fields(node, cfg, query_type)?),
            NodeConfig::Output => check_output_node(node)?,
        }
        if let Some(dup) = node.output_fields.duplicate_names().first() {
            return Err(ViewError::node_validation(
                &node.id,
                format!("output field '{}' is declared more than once", dup),
            ));
        }

        if let Some((fields, has_star)) = derived {
            view.data_scope[idx].output_fields = fields;
            view.has_sql_node = true;
            view.has_star |= has_star;
        }
    }

    debug!(
        view = %view.id,
        nodes = view.data_scope.len(),
        query_type = ?view.query_type,
        "validated data scope"
    );
    Ok(())
}

/// Node positions ordered so every node follows its inputs.
fn topological_order(scope: &[DataScopeNode]) -> ViewResult<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(scope.len(), scope.len());
    let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(scope.len());
    let mut outputs = 0;

    for (pos, node) in scope.iter().enumerate() {
        if node.id.is_empty() {
            return Err(ViewError::validation("data scope node has an empty id"));
        }
        if index.insert(&node.id, graph.add_node(pos)).is_some() {
            return Err(ViewError::node_validation(&node.id, "duplicate node id"));
        }
        if node.node_type() == NodeType::Output {
            outputs += 1;
        }
    }
    if outputs != 1 {
        return Err(ViewError::validation(format!(
            "data scope must have exactly one output node, found {}",
            outputs
        )));
    }

    for node in scope {
        check_cardinality(node)?;
        let target = index[node.id.as_str()];
        let mut seen = HashSet::new();
        for input in &node.input_nodes {
            if !seen.insert(input.as_str()) {
                return Err(ViewError::node_validation(
                    &node.id,
                    format!("input node '{}' is listed more than once", input),
                ));
            }
            let source = index.get(input.as_str()).ok_or_else(|| {
                ViewError::node_validation(&node.id, format!("input node '{}' does not exist", input))
            })?;
            graph.add_edge(*source, target, ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|idx| graph[idx]).collect()),
        Err(cycle) => Err(ViewError::node_validation(
            &scope[graph[cycle.node_id()]].id,
            "data scope contains a cycle",
        )),
    }
}

fn check_cardinality(node: &DataScopeNode) -> ViewResult<()> {
    let n = node.input_nodes.len();
    let expected = match node.node_type() {
        NodeType::View if n != 0 => "no inputs",
        NodeType::Join if n != 2 => "exactly 2 inputs",
        NodeType::Union if n < 2 => "at least 2 inputs",
        NodeType::Sql if n < 1 => "at least 1 input",
        NodeType::Output if n != 1 => "exactly 1 input",
        _ => return Ok(()),
    };
    Err(ViewError::node_validation(
        &node.id,
        format!("{} node requires {}, got {}", node.node_type(), expected, n),
    ))
}

/// The query type every source view shares.
fn source_query_type(scope: &[DataScopeNode]) -> ViewResult<QueryType> {
    let mut shared: Option<QueryType> = None;
    for node in scope.iter().filter(|n| n.node_type() == NodeType::View) {
        let source = node.source_view().ok_or_else(|| {
            ViewError::node_validation(&node.id, "source view is not loaded")
        })?;
        if !source.is_atomic() {
            return Err(ViewError::node_validation(
                &node.id,
                format!("source view '{}' is not atomic", source.id),
            ));
        }
        match shared {
            None => shared = Some(source.query_type),
            Some(qt) if qt != source.query_type => {
                return Err(ViewError::node_validation(
                    &node.id,
                    format!(
                        "source view '{}' uses query type {:?}, other sources use {:?}",
                        source.id, source.query_type, qt
                    ),
                ))
            }
            Some(_) => {}
        }
    }
    shared.ok_or_else(|| ViewError::validation("data scope has no view node"))
}

fn single_source(scope: &[DataScopeNode]) -> bool {
    let mut ids = scope
        .iter()
        .filter_map(|n| n.source_view())
        .map(|v| v.data_source_id.as_str());
    match ids.next() {
        Some(first) => ids.all(|id| id == first),
        None => true,
    }
}

fn check_view_node(
    node: &DataScopeNode,
    cfg: &ViewNodeConfig,
    query_type: QueryType,
    settings: &QuerySettings,
) -> ViewResult<()> {
    let Some(source) = cfg.view.as_deref() else {
        return Err(ViewError::node_validation(&node.id, "source view is not loaded"));
    };

    if let Some(filter) = &cfg.filters {
        validate_filter(filter, &source.fields, settings.max_sub_conditions)
            .map_err(|e| ViewError::node_validation(&node.id, e.to_string()))?;
    }

    if cfg.distinct.enable {
        if query_type.is_search() {
            return Err(ViewError::node_validation(
                &node.id,
                "distinct is not supported for search views",
            ));
        }
        for name in &cfg.distinct.fields {
            if !node.output_fields.contains(name) {
                return Err(ViewError::node_validation(
                    &node.id,
                    format!("distinct field '{}' is not an output field", name),
                ));
            }
        }
    }

    if !source.fields.is_empty() {
        for field in &node.output_fields {
            if !source.fields.contains(field.source_name()) {
                return Err(ViewError::node_validation(
                    &node.id,
                    format!(
                        "output field '{}' does not exist in source view '{}'",
                        field.source_name(),
                        source.id
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_join_node(
    node: &DataScopeNode,
    cfg: &JoinNodeConfig,
    scope: &[DataScopeNode],
) -> ViewResult<()> {
    if cfg.join_on.is_empty() {
        return Err(ViewError::node_validation(&node.id, "join node has no join keys"));
    }
    let left = input_fields(scope, &node.input_nodes[0]);
    let right = input_fields(scope, &node.input_nodes[1]);

    let mut pairs = HashSet::new();
    for on in &cfg.join_on {
        if on.left_field.is_empty() || on.right_field.is_empty() {
            return Err(ViewError::node_validation(
                &node.id,
                "join keys must name a field on both sides",
            ));
        }
        if on.operator != "=" {
            return Err(ViewError::node_validation(
                &node.id,
                format!("join operator '{}' is not supported", on.operator),
            ));
        }
        if !pairs.insert((on.left_field.as_str(), on.right_field.as_str())) {
            return Err(ViewError::node_validation(
                &node.id,
                format!("join key {} = {} is repeated", on.left_field, on.right_field),
            ));
        }
        for (fields, name, input) in [
            (left, &on.left_field, &node.input_nodes[0]),
            (right, &on.right_field, &node.input_nodes[1]),
        ] {
            if let Some(fields) = fields.filter(|f| !f.is_empty()) {
                if !fields.contains(name) {
                    return Err(ViewError::node_validation(
                        &node.id,
                        format!("join field '{}' does not exist in node '{}'", name, input),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_union_node(
    node: &DataScopeNode,
    cfg: &UnionNodeConfig,
    query_type: QueryType,
    scope: &[DataScopeNode],
) -> ViewResult<()> {
    if query_type.is_search() {
        if cfg.union_type != UnionType::All {
            return Err(ViewError::node_validation(
                &node.id,
                "search views only support union all",
            ));
        }
        return Ok(());
    }

    if cfg.union_fields.len() != node.input_nodes.len() {
        return Err(ViewError::node_validation(
            &node.id,
            format!(
                "union node has {} field mappings for {} inputs",
                cfg.union_fields.len(),
                node.input_nodes.len()
            ),
        ));
    }
    for (input, mapping) in node.input_nodes.iter().zip(&cfg.union_fields) {
        if mapping.len() != node.output_fields.len() {
            return Err(ViewError::node_validation(
                &node.id,
                format!(
                    "mapping for input '{}' has {} fields, expected {}",
                    input,
                    mapping.len(),
                    node.output_fields.len()
                ),
            ));
        }
        let fields = input_fields(scope, input).filter(|f| !f.is_empty());
        let mut seen = HashSet::new();
        for from in mapping.iter().filter(|f| !f.is_const()) {
            if !seen.insert(from.field.as_str()) {
                return Err(ViewError::node_validation(
                    &node.id,
                    format!("field '{}' is mapped twice from input '{}'", from.field, input),
                ));
            }
            if let Some(fields) = fields {
                if !fields.contains(&from.field) {
                    return Err(ViewError::node_validation(
                        &node.id,
                        format!("field '{}' does not exist in node '{}'", from.field, input),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Output fields of a raw-SQL node as parsed from its expression, plus
/// whether the projection contains a star.
fn sql_node_fields(
    node: &DataScopeNode,
    cfg: &SqlNodeConfig,
    query_type: QueryType,
) -> ViewResult<(FieldSet, bool)> {
    if query_type != QueryType::Sql {
        return Err(ViewError::node_validation(
            &node.id,
            "sql nodes are only supported for SQL views",
        ));
    }
    if cfg.sql_expression.trim().is_empty() {
        return Err(ViewError::node_validation(&node.id, "sql expression is empty"));
    }
    let parsed = extract_select_fields(&cfg.sql_expression)
        .map_err(|e| ViewError::node_validation(&node.id, e.to_string()))?;

    let fields = parsed
        .fields
        .iter()
        .map(|col| {
            let name = col.output_name();
            match node.output_fields.get(name) {
                Some(declared) => declared.clone().with_original_name(col.name.clone()),
                None => ViewField::new(name, DataType::Unknown).with_original_name(col.name.clone()),
            }
        })
        .collect();
    Ok((fields, parsed.has_star))
}

fn check_output_node(node: &DataScopeNode) -> ViewResult<()> {
    if let Some(dup) = node.output_fields.duplicate_display_names().first() {
        return Err(ViewError::node_validation(
            &node.id,
            format!("display name '{}' is used more than once", dup),
        ));
    }
    Ok(())
}

fn input_fields<'a>(scope: &'a [DataScopeNode], id: &str) -> Option<&'a FieldSet> {
    scope.iter().find(|n| n.id == id).map(|n| &n.output_fields)
}

/// Fields of the output node, falling back to its input's.
fn scope_output_fields(view: &DataView) -> FieldSet {
    let Some(output) = view.output_node() else {
        return FieldSet::new();
    };
    if !output.output_fields.is_empty() {
        return output.output_fields.clone();
    }
    output
        .input_nodes
        .first()
        .and_then(|id| input_fields(&view.data_scope, id))
        .cloned()
        .unwrap_or_default()
}
