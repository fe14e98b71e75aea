//! Compiles a view's data scope into one SQL statement.
//!
//! The scope is walked from the output node towards the view nodes. Each
//! node's SQL is computed once and memoized; an explicit visiting set turns
//! a cycle that slipped past validation into a compile error instead of
//! unbounded recursion.
//!
//! ```text
//!   view(v1) ─┐
//!             ├─ join(j1) ─┐
//!   view(v2) ─┘            ├─ union(u1) ── output(out)
//!   view(v3) ──────────────┘
//! ```
//!
//! Every compiled node also records its output lineage: the field set the
//! rows it produces carry, keyed by the column names a consumer sees.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::quote::{quote_ident, quote_qualified, quote_string};
use super::template::{self, TemplateError};
use crate::condition::{sql_condition, ConditionCompiler, FilterCond};
use crate::error::{ViewError, ViewResult};
use crate::model::{
    DataScopeNode, DataView, DistinctConfig, FieldSet, JoinNodeConfig, NodeConfig, SqlNodeConfig,
    UnionNodeConfig, ViewNodeConfig, ViewType,
};

/// Memoizing SQL compiler over one view's data scope.
pub struct SqlGenerator<'v> {
    view: &'v DataView,
    nodes: HashMap<&'v str, &'v DataScopeNode>,
    compiler: &'v dyn ConditionCompiler,
    sqls: HashMap<String, String>,
    lineage: HashMap<String, FieldSet>,
    visiting: HashSet<String>,
}

impl<'v> SqlGenerator<'v> {
    pub fn new(view: &'v DataView, compiler: &'v dyn ConditionCompiler) -> Self {
        let nodes = view
            .data_scope
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();
        Self {
            view,
            nodes,
            compiler,
            sqls: HashMap::new(),
            lineage: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// SQL for the whole view: the atomic table, or the scope's output node.
    pub fn build_view(&mut self) -> ViewResult<String> {
        let view = self.view;
        if view.is_atomic() {
            return atomic_view_sql(view);
        }
        let output = view
            .output_node()
            .ok_or_else(|| ViewError::compile("data scope has no output node"))?;
        self.build_node(&output.id)
    }

    /// SQL for one node, compiling its inputs first.
    pub fn build_node(&mut self, node_id: &str) -> ViewResult<String> {
        if let Some(sql) = self.sqls.get(node_id) {
            return Ok(sql.clone());
        }
        let node = *self.nodes.get(node_id).ok_or_else(|| {
            ViewError::compile(format!("node '{}' not found in data scope", node_id))
        })?;
        if !self.visiting.insert(node.id.clone()) {
            return Err(ViewError::node_compile(
                &node.id,
                "node is reachable from itself",
            ));
        }

        let result = match &node.config {
            NodeConfig::View(cfg) => self.view_node(node, cfg),
            NodeConfig::Join(cfg) => self.join_node(node, cfg),
            NodeConfig::Union(cfg) => self.union_node(node, cfg),
            NodeConfig::Sql(cfg) => self.sql_node(node, cfg),
            NodeConfig::Output => self.output_node(node),
        };
        self.visiting.remove(&node.id);
        let (sql, lineage) = result?;

        debug!(node = %node.id, kind = %node.node_type(), sql = %sql, "compiled data scope node");
        self.sqls.insert(node.id.clone(), sql.clone());
        self.lineage.insert(node.id.clone(), lineage);
        Ok(sql)
    }

    /// Output lineage of a compiled node.
    pub fn lineage(&self, node_id: &str) -> Option<&FieldSet> {
        self.lineage.get(node_id)
    }

    pub fn into_lineage(self) -> HashMap<String, FieldSet> {
        self.lineage
    }

    fn input_lineage(&self, node: &DataScopeNode, input: &str) -> ViewResult<&FieldSet> {
        self.lineage.get(input).ok_or_else(|| {
            ViewError::node_compile(&node.id, format!("input node '{}' was not compiled", input))
        })
    }

    fn condition(
        &self,
        node: &DataScopeNode,
        filter: Option<&FilterCond>,
        view_type: ViewType,
        fields: &FieldSet,
    ) -> ViewResult<Option<String>> {
        sql_condition(self.compiler, filter, view_type, fields)
            .map_err(|e| ViewError::node_compile(&node.id, e.to_string()))
    }

    fn view_node(
        &mut self,
        node: &DataScopeNode,
        cfg: &ViewNodeConfig,
    ) -> ViewResult<(String, FieldSet)> {
        let source = cfg.view.as_deref().ok_or_else(|| {
            ViewError::node_compile(
                &node.id,
                format!("source view '{}' is not loaded", cfg.view_id),
            )
        })?;
        let table = table_name(source)
            .ok_or_else(|| ViewError::node_compile(&node.id, "source view has no table"))?;

        let columns = projection(node, &cfg.distinct, &node.output_fields, None)?;
        let mut sql = format!("SELECT {} FROM {}", columns, table);
        if let Some(cond) =
            self.condition(node, cfg.filters.as_ref(), source.view_type, &source.fields)?
        {
            sql = format!("{} WHERE {}", sql, cond);
        }
        Ok((sql, node.output_fields.clone()))
    }

    fn join_node(
        &mut self,
        node: &DataScopeNode,
        cfg: &JoinNodeConfig,
    ) -> ViewResult<(String, FieldSet)> {
        let [left_id, right_id] = node.input_nodes.as_slice() else {
            return Err(ViewError::node_compile(
                &node.id,
                format!("join node requires 2 inputs, got {}", node.input_nodes.len()),
            ));
        };
        if cfg.join_on.is_empty() {
            return Err(ViewError::node_compile(&node.id, "join node has no join keys"));
        }
        let left_sql = self.build_node(left_id)?;
        let right_sql = self.build_node(right_id)?;

        let left = self.input_lineage(node, left_id)?;
        let right = self.input_lineage(node, right_id)?;
        let mut keys = Vec::with_capacity(cfg.join_on.len());
        for on in &cfg.join_on {
            let l = left.get(&on.left_field).ok_or_else(|| {
                ViewError::node_compile(
                    &node.id,
                    format!("left field '{}' not found in node '{}'", on.left_field, left_id),
                )
            })?;
            let r = right.get(&on.right_field).ok_or_else(|| {
                ViewError::node_compile(
                    &node.id,
                    format!("right field '{}' not found in node '{}'", on.right_field, right_id),
                )
            })?;
            keys.push(format!(
                "{} = {}",
                quote_qualified("lft", l.source_name()),
                quote_qualified("rgt", r.source_name())
            ));
        }

        let columns = projection(node, &cfg.distinct, &node.output_fields, Some("*"))?;
        let mut sql = format!(
            "SELECT {} FROM ({}) AS lft {} JOIN ({}) AS rgt ON {}",
            columns,
            left_sql,
            cfg.join_type.as_sql(),
            right_sql,
            keys.join(" AND ")
        );
        if let Some(cond) =
            self.condition(node, cfg.filters.as_ref(), ViewType::Custom, &node.output_fields)?
        {
            sql = format!("{} WHERE {}", sql, cond);
        }
        Ok((sql, node.output_fields.clone()))
    }

    fn union_node(
        &mut self,
        node: &DataScopeNode,
        cfg: &UnionNodeConfig,
    ) -> ViewResult<(String, FieldSet)> {
        if node.input_nodes.len() < 2 {
            return Err(ViewError::node_compile(
                &node.id,
                format!("union node requires at least 2 inputs, got {}", node.input_nodes.len()),
            ));
        }
        if cfg.union_fields.len() != node.input_nodes.len() {
            return Err(ViewError::node_compile(
                &node.id,
                format!(
                    "union node has {} field mappings for {} inputs",
                    cfg.union_fields.len(),
                    node.input_nodes.len()
                ),
            ));
        }

        let mut branches = Vec::with_capacity(node.input_nodes.len());
        for (i, (input, mapping)) in node.input_nodes.iter().zip(&cfg.union_fields).enumerate() {
            if mapping.len() != node.output_fields.len() {
                return Err(ViewError::node_compile(
                    &node.id,
                    format!(
                        "mapping for input '{}' has {} fields, expected {}",
                        input,
                        mapping.len(),
                        node.output_fields.len()
                    ),
                ));
            }
            let input_sql = self.build_node(input)?;
            let input_fields = self.input_lineage(node, input)?;

            let mut columns = Vec::with_capacity(mapping.len());
            for (out, from) in node.output_fields.iter().zip(mapping) {
                let expr = if from.is_const() {
                    quote_string(&from.field)
                } else {
                    let source = input_fields.get(&from.field).ok_or_else(|| {
                        ViewError::node_compile(
                            &node.id,
                            format!("field '{}' not found in node '{}'", from.field, input),
                        )
                    })?;
                    quote_ident(source.source_name())
                };
                columns.push(format!("{} AS {}", expr, quote_ident(&out.name)));
            }
            branches.push(format!(
                "SELECT {} FROM ({}) AS t{}",
                columns.join(", "),
                input_sql,
                i + 1
            ));
        }

        let lineage = renamed_to_output(&node.output_fields);
        let mut sql = branches.join(&format!(" {} ", cfg.union_type.as_sql()));
        if let Some(cond) = self.condition(node, cfg.filters.as_ref(), ViewType::Custom, &lineage)? {
            sql = format!("SELECT * FROM ({}) AS union_result WHERE {}", sql, cond);
        }
        Ok((sql, lineage))
    }

    fn sql_node(
        &mut self,
        node: &DataScopeNode,
        cfg: &SqlNodeConfig,
    ) -> ViewResult<(String, FieldSet)> {
        if node.input_nodes.is_empty() {
            return Err(ViewError::node_compile(&node.id, "sql node requires at least 1 input"));
        }
        for input in &node.input_nodes {
            self.build_node(input)?;
        }
        let sql = template::render(&cfg.sql_expression, |id| {
            if !node.input_nodes.iter().any(|input| input == id) {
                return Err(TemplateError::UnknownNode(id.to_string()));
            }
            self.sqls
                .get(id)
                .map(|sql| format!("({})", sql))
                .ok_or_else(|| TemplateError::UnknownNode(id.to_string()))
        })
        .map_err(|e| ViewError::node_compile(&node.id, e.to_string()))?;
        Ok((sql, renamed_to_output(&node.output_fields)))
    }

    fn output_node(&mut self, node: &DataScopeNode) -> ViewResult<(String, FieldSet)> {
        let [input] = node.input_nodes.as_slice() else {
            return Err(ViewError::node_compile(
                &node.id,
                format!("output node requires 1 input, got {}", node.input_nodes.len()),
            ));
        };
        let sql = self.build_node(input)?;
        let lineage = if node.output_fields.is_empty() {
            self.input_lineage(node, input)?.clone()
        } else {
            node.output_fields.clone()
        };
        Ok((sql, lineage))
    }
}

/// Compile the view to SQL and record each node's lineage on the view.
pub fn build_view_sql(view: &mut DataView, compiler: &dyn ConditionCompiler) -> ViewResult<String> {
    let (sql, lineage) = {
        let mut generator = SqlGenerator::new(view, compiler);
        let sql = generator.build_view()?;
        (sql, generator.into_lineage())
    };
    for node in &mut view.data_scope {
        if let Some(fields) = lineage.get(&node.id) {
            node.output_fields_map = Some(fields.clone());
        }
    }
    Ok(sql)
}

/// `SELECT * FROM <table>` for an atomic view, or its stored SQL.
pub fn atomic_view_sql(view: &DataView) -> ViewResult<String> {
    if let Some(sql) = view.sql_str.as_deref().filter(|s| !s.trim().is_empty()) {
        return Ok(sql.to_string());
    }
    let table = table_name(view)
        .ok_or_else(|| ViewError::compile(format!("view '{}' has no table", view.id)))?;
    Ok(format!("SELECT * FROM {}", table))
}

fn table_name(view: &DataView) -> Option<&str> {
    [view.meta_table_name.as_str(), view.technical_name.as_str()]
        .into_iter()
        .find(|name| !name.is_empty())
}

/// Column list of a view or join node. `all` is used instead of listing
/// every output field when no distinct projection is requested.
fn projection(
    node: &DataScopeNode,
    distinct: &DistinctConfig,
    fields: &FieldSet,
    all: Option<&str>,
) -> ViewResult<String> {
    if distinct.enable {
        let names: Vec<&str> = if distinct.fields.is_empty() {
            fields.names().collect()
        } else {
            distinct.fields.iter().map(String::as_str).collect()
        };
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let field = fields.get(name).ok_or_else(|| {
                ViewError::node_compile(&node.id, format!("distinct field '{}' is not an output field", name))
            })?;
            columns.push(quote_ident(field.source_name()));
        }
        if !columns.is_empty() {
            return Ok(format!("DISTINCT {}", columns.join(", ")));
        }
    }

    if let Some(all) = all {
        return Ok(all.to_string());
    }
    if fields.is_empty() {
        return Ok("*".to_string());
    }
    Ok(fields
        .iter()
        .map(|f| quote_ident(f.source_name()))
        .collect::<Vec<_>>()
        .join(", "))
}

/// Lineage for nodes whose result columns carry the output names.
fn renamed_to_output(fields: &FieldSet) -> FieldSet {
    fields
        .iter()
        .map(|f| {
            let mut f = f.clone();
            f.original_name = f.name.clone();
            f
        })
        .collect()
}
