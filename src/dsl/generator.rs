//! Search DSL compilation for IndexBase and DSL views.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::types::{BoolQuery, DslQuery, PitClause, SortClause};
use crate::condition::{dsl_condition, merge_row_column_rules, ConditionCompiler, META_FIELD_ID};
use crate::config::QuerySettings;
use crate::error::{ViewError, ViewResult};
use crate::model::{
    DataView, FeatureType, FieldSet, NodeConfig, Pagination, QueryType, SortDirection, SortParam,
    UnionType, ViewQuery, ViewType,
};

pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const SCORE_FIELD: &str = "_score";
pub const DOC_ID_FIELD: &str = "_id";
pub const INDEX_FIELD: &str = "_index";
/// Caller-facing alias of [`SCORE_FIELD`].
pub const SCORE_ALIAS: &str = "__score";

/// Physical indices per data-scope node ID.
pub type NodeRoutes = BTreeMap<String, Vec<String>>;

/// A compiled search request.
#[derive(Debug, Clone, PartialEq)]
pub struct DslCompilation {
    pub query: DslQuery,
    /// Fields visible to the caller after column rules.
    pub fields: FieldSet,
}

/// Compile a request against a search view.
///
/// `routes` maps every view node (or the atomic view's ID) to its indices.
pub fn build_dsl(
    view: &DataView,
    query: &ViewQuery,
    pagination: &Pagination,
    routes: &NodeRoutes,
    compiler: &dyn ConditionCompiler,
    settings: &QuerySettings,
) -> ViewResult<DslCompilation> {
    let (mut bool_query, mut track_scores) = build_scope_query(view, routes, compiler)?;

    if let Some(range) = time_range(query.start, query.end) {
        bool_query.filter.push(range);
    }

    if let Some((clause, scoring)) =
        dsl_condition(compiler, query.filters.as_ref(), view.view_type, &view.fields)?
    {
        bool_query.push(clause, scoring);
        track_scores |= scoring;
    }

    let mut fields = view.fields.clone();
    if !query.row_column_rules.is_empty() {
        let merged =
            merge_row_column_rules(&query.row_column_rules, &view.fields, settings.max_sub_conditions)?;
        if let Some((clause, scoring)) =
            dsl_condition(compiler, merged.filter.as_ref(), view.view_type, &view.fields)?
        {
            bool_query.push(clause, scoring);
            track_scores |= scoring;
        }
        fields = merged.fields;
    }

    let sort = complete_sort(
        build_sort(&query.sort, &view.fields)?,
        view.query_type,
        pagination.is_cursor(),
    );

    let mut dsl = DslQuery {
        size: page_size(query, pagination, settings),
        sort,
        track_total_hits: view.query_type == QueryType::Dsl && query.need_total,
        track_scores,
        ..Default::default()
    };
    dsl.query.bool = bool_query;

    match pagination {
        Pagination::Offset { offset } => dsl.from = *offset,
        Pagination::SearchAfter {
            cursor,
            pit_id,
            pit_keep_alive,
        } => {
            dsl.search_after = cursor.clone();
            dsl.pit = pit_id.as_ref().map(|id| PitClause {
                id: id.clone(),
                keep_alive: pit_keep_alive.clone(),
            });
        }
        Pagination::Scroll { .. } | Pagination::SqlCursor { .. } => {}
    }

    debug!(view = %view.id, size = dsl.size, from = dsl.from, "compiled search request");
    Ok(DslCompilation { query: dsl, fields })
}

fn page_size(query: &ViewQuery, pagination: &Pagination, settings: &QuerySettings) -> usize {
    if query.limit > 0 {
        query.limit
    } else if !pagination.cursor().is_empty() {
        settings.search_after_limit
    } else {
        settings.default_limit
    }
}

/// The part of the query that restricts a view to its own documents.
///
/// Atomic views need nothing beyond the index list. A custom view gets one
/// clause per view node: a `terms` filter on `_index` for the node's routed
/// indices plus the node's own filter. The returned flag reports whether any
/// node filter scores.
pub fn build_scope_query(
    view: &DataView,
    routes: &NodeRoutes,
    compiler: &dyn ConditionCompiler,
) -> ViewResult<(BoolQuery, bool)> {
    if view.is_atomic() {
        return Ok((BoolQuery::default(), false));
    }

    let mut clauses = Vec::new();
    let mut track_scores = false;
    for node in &view.data_scope {
        let cfg = match &node.config {
            NodeConfig::View(cfg) => cfg,
            NodeConfig::Union(cfg) if cfg.union_type == UnionType::All => continue,
            NodeConfig::Output => continue,
            NodeConfig::Union(_) => {
                return Err(ViewError::node_compile(
                    &node.id,
                    "search views only support union all",
                ))
            }
            other => {
                return Err(ViewError::node_compile(
                    &node.id,
                    format!("{} node is not supported for search views", other.node_type()),
                ))
            }
        };
        let source = cfg.view.as_deref().ok_or_else(|| {
            ViewError::node_compile(&node.id, format!("source view '{}' is not loaded", cfg.view_id))
        })?;

        let indices = routes.get(&node.id).cloned().unwrap_or_default();
        let mut branch = BoolQuery::default();
        branch.filter.push(json!({ "terms": { INDEX_FIELD: indices } }));
        let cond = dsl_condition(compiler, cfg.filters.as_ref(), ViewType::Atomic, &source.fields)
            .map_err(|e| ViewError::node_compile(&node.id, e.to_string()))?;
        if let Some((clause, scoring)) = cond {
            branch.push(clause, scoring);
            track_scores |= scoring;
        }
        clauses.push(json!({ "bool": branch }));
    }

    let mut bool_query = BoolQuery::default();
    match clauses.len() {
        0 => return Err(ViewError::compile("data scope has no view node")),
        1 => bool_query.filter = clauses,
        _ => {
            bool_query.should = clauses;
            bool_query.minimum_should_match = Some(1);
        }
    }
    Ok((bool_query, track_scores))
}

/// `{"range": {"@timestamp": {...}}}` with only the non-zero bounds.
fn time_range(start: i64, end: i64) -> Option<Value> {
    let mut bounds = serde_json::Map::new();
    if start != 0 {
        bounds.insert("gte".to_string(), json!(start));
    }
    if end != 0 {
        bounds.insert("lte".to_string(), json!(end));
    }
    if bounds.is_empty() {
        return None;
    }
    Some(json!({ "range": { TIMESTAMP_FIELD: bounds } }))
}

/// Translate the caller's sort into search sort clauses.
pub fn build_sort(sort: &[SortParam], fields: &FieldSet) -> ViewResult<Vec<SortClause>> {
    let mut clauses = Vec::with_capacity(sort.len());
    for param in sort {
        if param.field.is_empty() {
            return Err(ViewError::InvalidQuery("sort field is required".to_string()));
        }
        let direction = param.direction.ok_or_else(|| {
            ViewError::InvalidQuery(format!("sort direction is required for '{}'", param.field))
        })?;

        if param.field == SCORE_ALIAS {
            clauses.push(SortClause::new(SCORE_FIELD, direction));
            continue;
        }
        let Some(field) = fields.get(&param.field) else {
            clauses.push(SortClause::new(param.field.clone(), direction));
            continue;
        };
        if field.data_type.is_binary() {
            return Err(ViewError::BinaryFieldSort(param.field.clone()));
        }
        if field.data_type.is_text() {
            if field.has_feature(FeatureType::Keyword) {
                clauses.push(SortClause::new(format!("{}.keyword", field.name), direction));
            } else {
                warn!(field = %field.name, "dropping sort on text field without keyword sub-field");
            }
            continue;
        }
        clauses.push(SortClause::new(field.name.clone(), direction));
    }
    Ok(clauses)
}

/// Append the tie-breakers a backend needs for stable paging, then drop
/// repeated fields keeping the first occurrence.
pub fn complete_sort(
    mut sort: Vec<SortClause>,
    query_type: QueryType,
    cursor: bool,
) -> Vec<SortClause> {
    match (query_type, cursor) {
        (QueryType::IndexBase, true) => {
            sort.push(SortClause::new(TIMESTAMP_FIELD, SortDirection::Desc));
            sort.push(SortClause::new(META_FIELD_ID, SortDirection::Desc));
        }
        (QueryType::IndexBase, false) => {
            sort.push(SortClause::new(TIMESTAMP_FIELD, SortDirection::Desc));
        }
        (QueryType::Dsl, true) => sort.push(SortClause::new(DOC_ID_FIELD, SortDirection::Desc)),
        _ => {}
    }

    let mut seen: Vec<String> = Vec::with_capacity(sort.len());
    sort.retain(|clause| {
        if seen.contains(&clause.field) {
            false
        } else {
            seen.push(clause.field.clone());
            true
        }
    });
    sort
}
