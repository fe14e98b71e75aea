//! The statement actually sent to the SQL gateway for one request.
//!
//! View SQL (generated, stored, or supplied by the caller) is narrowed by
//! the request's time window, global filter and row security rules, then
//! sorted and paged.

use serde_json::Value;
use tracing::{debug, warn};

use super::builder::{add_page_if_missing, has_limit, mask_sql, SqlBuilder};
use super::generator::build_view_sql;
use super::quote::quote_ident;
use crate::condition::{merge_row_column_rules, sql_condition, ConditionCompiler};
use crate::config::QuerySettings;
use crate::error::{ViewError, ViewResult};
use crate::model::{DataView, FieldSet, Pagination, SortParam, ViewQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct RequestSql {
    pub sql: String,
    /// `SELECT count(*)` over the filtered statement, when a total is requested.
    pub count_sql: Option<String>,
    /// Fields visible to the caller after column rules.
    pub fields: FieldSet,
    /// Gateway continuation token for cursor pages.
    pub next_uri: Option<String>,
    pub limit: usize,
}

/// Build the request statement. Lineage is recorded on `view`, which is
/// expected to be the request's own copy.
pub fn compose_request_sql(
    view: &mut DataView,
    query: &ViewQuery,
    pagination: &Pagination,
    compiler: &dyn ConditionCompiler,
    settings: &QuerySettings,
) -> ViewResult<RequestSql> {
    let base = match query.sql.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(sql) => sql.to_string(),
        None => build_view_sql(view, compiler)?,
    };

    let mut builder = SqlBuilder::new(base);
    if let Some(cond) = time_filter(query) {
        builder.add_where(cond);
    }
    if let Some(cond) = sql_condition(compiler, query.filters.as_ref(), view.view_type, &view.fields)? {
        builder.add_where(cond);
    }

    let mut fields = view.fields.clone();
    if !query.row_column_rules.is_empty() {
        let merged =
            merge_row_column_rules(&query.row_column_rules, &view.fields, settings.max_sub_conditions)?;
        if let Some(cond) = sql_condition(compiler, merged.filter.as_ref(), view.view_type, &view.fields)? {
            builder.add_where(cond);
        }
        fields = merged.fields;
    }
    let filtered = builder.build();

    let count_sql = query
        .need_total
        .then(|| format!("SELECT count(*) FROM ({}) AS t", filtered));

    let order = sort_clause(&query.sort, &fields)?;
    let mut sql = match order {
        Some(order) => append_order_by(&filtered, &order),
        None => filtered,
    };

    let (limit, next_uri) = if pagination.is_cursor() {
        let limit = if query.limit > 0 {
            query.limit
        } else if pagination.cursor().is_empty() {
            settings.default_limit
        } else {
            settings.search_after_limit
        };
        (limit, cursor_token(pagination.cursor()))
    } else {
        let limit = if query.limit > 0 {
            query.limit
        } else {
            settings.default_limit
        };
        let offset = match pagination {
            Pagination::Offset { offset } => *offset,
            _ => 0,
        };
        sql = add_page_if_missing(&sql, limit, offset);
        (limit, None)
    };

    debug!(view = %view.id, sql = %sql, "composed request SQL");
    Ok(RequestSql {
        sql,
        count_sql,
        fields,
        next_uri,
        limit,
    })
}

/// `"<date_field>" BETWEEN from_unixtime(<start s>) AND from_unixtime(<end s>)`,
/// or the one-sided form when only one bound is set. Bounds arrive in
/// milliseconds.
fn time_filter(query: &ViewQuery) -> Option<String> {
    let field = query.date_field.as_deref().filter(|f| !f.is_empty())?;
    let col = quote_ident(field);
    match (query.start, query.end) {
        (0, 0) => None,
        (start, 0) => Some(format!("{} >= from_unixtime({})", col, start / 1000)),
        (0, end) => Some(format!("{} <= from_unixtime({})", col, end / 1000)),
        (start, end) => Some(format!(
            "{} BETWEEN from_unixtime({}) AND from_unixtime({})",
            col,
            start / 1000,
            end / 1000
        )),
    }
}

/// De-duplicated `ORDER BY` items for fields present in the view.
fn sort_clause(sort: &[SortParam], fields: &FieldSet) -> ViewResult<Option<String>> {
    let mut seen: Vec<&str> = Vec::new();
    let mut items = Vec::new();
    for param in sort {
        if param.field.is_empty() {
            return Err(ViewError::InvalidQuery("sort field is required".to_string()));
        }
        let direction = param.direction.ok_or_else(|| {
            ViewError::InvalidQuery(format!("sort direction is required for '{}'", param.field))
        })?;
        if seen.contains(&param.field.as_str()) {
            continue;
        }
        seen.push(&param.field);

        let Some(field) = fields.get(&param.field) else {
            warn!(field = %param.field, "dropping sort on a field the view does not expose");
            continue;
        };
        if field.data_type.is_binary() {
            return Err(ViewError::BinaryFieldSort(param.field.clone()));
        }
        items.push(format!("{} {}", quote_ident(&field.name), direction.as_sql()));
    }
    Ok((!items.is_empty()).then(|| items.join(", ")))
}

/// Statements that already sort or page are wrapped so the new order applies last.
fn append_order_by(sql: &str, order: &str) -> String {
    let masked = mask_sql(sql).to_ascii_lowercase();
    let sorted_or_paged = masked.contains("order by") || has_limit(sql);
    if sorted_or_paged {
        format!("SELECT * FROM ({}) AS sorted ORDER BY {}", sql, order)
    } else {
        format!("{} ORDER BY {}", sql.trim_end().trim_end_matches(';'), order)
    }
}

/// Gateway cursor values joined as a `next_uri` path.
fn cursor_token(cursor: &[Value]) -> Option<String> {
    if cursor.is_empty() {
        return None;
    }
    let parts: Vec<String> = cursor
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(parts.join("/"))
}
