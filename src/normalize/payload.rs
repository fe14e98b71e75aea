//! Backend response payloads.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ViewError, ViewResult};

/// A search response: `hits.hits`, optional totals and paging handles.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub pit_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<HitsTotal>,
    pub hits: Vec<Hit>,
}

/// `hits.total` is an object on current backends and a bare number on old ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HitsTotal {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort: Option<Vec<Value>>,
}

impl SearchResponse {
    pub fn total(&self) -> Option<u64> {
        self.hits.total.as_ref().map(|t| match t {
            HitsTotal::Object { value } => *value,
            HitsTotal::Count(n) => *n,
        })
    }

    /// The cursor for the next page: the sort values of the last hit.
    pub fn last_sort(&self) -> Vec<Value> {
        self.hits
            .hits
            .last()
            .and_then(|hit| hit.sort.clone())
            .unwrap_or_default()
    }
}

/// Parse a search response from the index backend.
pub fn parse_search_response(body: &[u8]) -> ViewResult<SearchResponse> {
    serde_json::from_slice(body)
        .map_err(|e| ViewError::Payload(format!("invalid search response: {}", e)))
}

#[derive(Deserialize)]
struct DslEnvelope {
    data: Vec<SearchResponse>,
}

/// Parse a raw DSL backend response: `{"data": [<search response>]}`.
pub fn parse_dsl_response(body: &[u8]) -> ViewResult<SearchResponse> {
    let envelope: DslEnvelope = serde_json::from_slice(body)
        .map_err(|e| ViewError::Payload(format!("invalid DSL response: {}", e)))?;
    envelope
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ViewError::Payload("DSL response has no data".to_string()))
}

/// A column announced by the SQL gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// A SQL gateway page as sent. Single-source gateways use
/// `entries`/`next_uri`, federated ones `data`/`nextUri`.
#[derive(Debug, Clone, Deserialize)]
struct RawSqlResponse {
    columns: Option<Vec<SqlColumn>>,
    #[serde(alias = "data")]
    entries: Option<Vec<Value>>,
    #[serde(default)]
    total_count: Option<i64>,
    #[serde(alias = "nextUri", default)]
    next_uri: Option<String>,
}

/// A SQL gateway page with its columns and rows present.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPage {
    pub columns: Vec<SqlColumn>,
    /// One JSON array per row, positionally aligned with `columns`.
    pub rows: Vec<Value>,
    /// Rows in this page as reported by the gateway.
    pub total_count: Option<i64>,
    pub next_uri: Option<String>,
}

impl SqlPage {
    /// The last three segments of `next_uri`, used as the caller's cursor.
    pub fn cursor(&self) -> Vec<Value> {
        let Some(uri) = self.next_uri.as_deref().filter(|u| !u.is_empty()) else {
            return Vec::new();
        };
        let parts: Vec<&str> = uri.trim_matches('/').split('/').collect();
        if parts.len() < 3 {
            return Vec::new();
        }
        parts[parts.len() - 3..]
            .iter()
            .map(|p| Value::String(p.to_string()))
            .collect()
    }
}

/// Parse a SQL gateway page. Missing or null columns and rows are errors.
pub fn parse_sql_response(body: &[u8]) -> ViewResult<SqlPage> {
    let raw: RawSqlResponse = serde_json::from_slice(body)
        .map_err(|e| ViewError::Payload(format!("invalid SQL response: {}", e)))?;
    let columns = raw
        .columns
        .ok_or_else(|| ViewError::Payload("SQL response has no columns".to_string()))?;
    let rows = raw
        .entries
        .ok_or_else(|| ViewError::Payload("SQL response has no rows".to_string()))?;
    Ok(SqlPage {
        columns,
        rows,
        total_count: raw.total_count,
        next_uri: raw.next_uri,
    })
}

/// Read `SELECT count(*)` output: the first cell of the first row.
pub fn parse_sql_count(body: &[u8]) -> ViewResult<u64> {
    let page = parse_sql_response(body)?;
    page.rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(Value::as_u64)
        .ok_or_else(|| ViewError::Payload("count result is not a non-negative integer".to_string()))
}
