//! Backend rows to caller-facing entries.

use serde_json::Value;
use tracing::warn;

use super::flatten::{flatten, pick_fields, Row};
use super::payload::{Hit, SearchResponse, SqlColumn, SqlPage};
use super::pool::RowPool;
use super::{RowError, ViewPage};
use crate::error::ViewResult;
use crate::model::{DataType, DataView, FieldScope, FieldSet, Format, ViewField, ViewQuery};

pub const INDEX_META: &str = "__index";
pub const SCORE_META: &str = "_score";

/// The fields a page exposes and the metadata it carries.
#[derive(Debug, Clone)]
struct Projection {
    fields: FieldSet,
    /// The caller named output fields.
    explicit: bool,
    with_index: bool,
    with_score: bool,
}

impl Projection {
    fn new(fields: &FieldSet, output_fields: &[String]) -> Self {
        if output_fields.is_empty() {
            return Self {
                fields: fields.clone(),
                explicit: false,
                with_index: true,
                with_score: true,
            };
        }

        let mut picked = FieldSet::new();
        let mut with_index = false;
        let mut with_score = false;
        for name in output_fields {
            match name.as_str() {
                INDEX_META => with_index = true,
                SCORE_META => with_score = true,
                _ => match fields.get(name) {
                    Some(field) => {
                        picked.push(field.clone());
                    }
                    None => warn!(field = %name, "output field is not part of the view"),
                },
            }
        }
        Self {
            fields: picked,
            explicit: true,
            with_index,
            with_score,
        }
    }

    fn shape(&self, doc: Row, format: Format, view: &DataView) -> Result<Row, RowError> {
        let all = view.field_scope == FieldScope::All;
        match format {
            Format::Flat if all => Ok(flatten(&doc, None)),
            Format::Flat => Ok(flatten(&doc, Some(&self.fields))),
            Format::Original if (view.is_atomic() || all) && !self.explicit => Ok(doc),
            Format::Original => pick_fields(&doc, &self.fields),
        }
    }
}

/// Normalize a search response.
///
/// `fields` are the fields visible to the caller; `total` is reported only
/// when the query asked for it.
pub fn normalize_search(
    pool: &RowPool,
    view: &DataView,
    fields: &FieldSet,
    query: &ViewQuery,
    response: SearchResponse,
    total: Option<u64>,
) -> ViewResult<ViewPage> {
    let projection = Projection::new(fields, &query.output_fields);
    let search_after = response.last_sort();
    let SearchResponse {
        hits,
        scroll_id,
        pit_id,
    } = response;

    let entries = pool.process(hits.hits, |_, hit| search_row(hit, &projection, query.format, view))?;

    Ok(ViewPage {
        entries,
        total_count: total.filter(|_| query.need_total),
        scroll_id: scroll_id.filter(|s| !s.is_empty()),
        pit_id: pit_id.filter(|s| !s.is_empty()),
        search_after,
        view: query.include_view.then(|| view.clone()),
    })
}

fn search_row(hit: Hit, projection: &Projection, format: Format, view: &DataView) -> Result<Row, RowError> {
    let source = hit.source.ok_or_else(|| RowError::MissingSource(hit.id.clone()))?;
    let mut row = projection.shape(source, format, view)?;
    if projection.with_index {
        row.insert(INDEX_META.to_string(), Value::String(hit.index));
    }
    if projection.with_score {
        row.insert(
            SCORE_META.to_string(),
            hit.score.map(Value::from).unwrap_or(Value::Null),
        );
    }
    Ok(row)
}

/// Normalize a SQL gateway page.
///
/// The view is the request's own copy: its fields are rebuilt from the
/// returned columns when its scope is `all` (always the case for caller
/// SQL), or narrowed to the returned columns when it has a raw-SQL node.
pub fn normalize_sql(
    pool: &RowPool,
    view: &mut DataView,
    fields: &FieldSet,
    query: &ViewQuery,
    page: SqlPage,
    total: Option<u64>,
) -> ViewResult<ViewPage> {
    let search_after = if query.wants_cursor() {
        page.cursor()
    } else {
        Vec::new()
    };
    let SqlPage { columns, rows, .. } = page;

    let caller_sql = query.sql.as_deref().is_some_and(|s| !s.trim().is_empty());
    if caller_sql {
        view.field_scope = FieldScope::All;
    }

    let visible = if view.field_scope == FieldScope::All {
        view.fields = fields_from_columns(&columns);
        if query.row_column_rules.is_empty() {
            view.fields.clone()
        } else {
            view.fields.narrowed_to(fields.names())
        }
    } else if view.has_sql_node {
        view.fields = typed_from_columns(&view.fields, &columns);
        fields.narrowed_to(view.fields.names())
    } else {
        fields.clone()
    };

    let projection = Projection {
        with_index: false,
        with_score: false,
        ..Projection::new(&visible, &query.output_fields)
    };
    let positional = view.field_scope == FieldScope::All;
    let shared: &DataView = view;
    let entries = pool.process(rows, |_, values| {
        let doc = sql_row(values, &columns, &shared.fields, positional)?;
        projection.shape(doc, query.format, shared)
    })?;

    Ok(ViewPage {
        entries,
        total_count: total.filter(|_| query.need_total),
        scroll_id: None,
        pit_id: None,
        search_after,
        view: query.include_view.then(|| shared.clone()),
    })
}

/// One field per column, repeated names renamed `<name>_<n>`.
fn fields_from_columns(columns: &[SqlColumn]) -> FieldSet {
    let mut seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    columns
        .iter()
        .map(|col| {
            let count = seen.entry(col.name.as_str()).or_insert(0);
            let name = if *count == 0 {
                col.name.clone()
            } else {
                format!("{}_{}", col.name, count)
            };
            *count += 1;
            ViewField::new(name, DataType::from_backend(&col.type_name)).with_original_name(col.name.clone())
        })
        .collect()
}

/// Declared fields that came back as columns, typed from the columns.
fn typed_from_columns(declared: &FieldSet, columns: &[SqlColumn]) -> FieldSet {
    let mut out = FieldSet::new();
    for col in columns {
        if let Some(field) = declared.get(&col.name) {
            let mut field = field.clone();
            field.data_type = DataType::from_backend(&col.type_name);
            out.push(field);
        }
    }
    out
}

/// Key a row's values by column.
///
/// With positional naming each value takes the name of the field built for
/// its column. Otherwise a repeated column name (a join exposing the same
/// column from both sides) is written to every `<name>_*` field reading that
/// column.
fn sql_row(
    values: Value,
    columns: &[SqlColumn],
    view_fields: &FieldSet,
    positional: bool,
) -> Result<Row, RowError> {
    let Value::Array(values) = values else {
        return Err(RowError::NotAnArray);
    };

    let mut row = Row::new();
    for (i, (col, value)) in columns.iter().zip(values).enumerate() {
        if positional {
            let name = view_fields
                .as_slice()
                .get(i)
                .map_or(col.name.as_str(), |f| f.name.as_str());
            row.insert(name.to_string(), value);
        } else if row.contains_key(&col.name) {
            let prefix = format!("{}_", col.name);
            for field in view_fields
                .iter()
                .filter(|f| f.name.starts_with(&prefix) && f.original_name == col.name)
            {
                row.insert(field.name.clone(), value.clone());
            }
        } else {
            row.insert(col.name.clone(), value);
        }
    }
    Ok(row)
}
