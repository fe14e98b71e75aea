//! Normalization of backend responses into view pages.
//!
//! ```text
//!   raw bytes ── payload ──► hits / rows
//!                              │
//!                          RowPool (bounded, order-preserving)
//!                              │ per row: flatten | pick, metadata
//!                              ▼
//!                           ViewPage
//! ```
//!
//! Every row of a page is processed on the shared [`RowPool`]. The caller
//! blocks until all rows are done and a single failed row fails the page.

pub mod flatten;
pub mod payload;
pub mod pool;
pub mod rows;

use serde::Serialize;
use serde_json::Value;

use crate::model::DataView;

pub use flatten::{flatten, pick_fields, Row};
pub use payload::{
    parse_dsl_response, parse_search_response, parse_sql_count, parse_sql_response, Hit,
    SearchResponse, SqlColumn, SqlPage,
};
pub use pool::RowPool;
pub use rows::{normalize_search, normalize_sql, INDEX_META, SCORE_META};

/// Why a single row could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("document '{0}' has no _source")]
    MissingSource(String),

    #[error("row is not an array of column values")]
    NotAnArray,

    #[error("path segment '{0}' is not an object")]
    NotAnObject(String),
}

/// One page of view data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewPage {
    pub entries: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pit_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_after: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<DataView>,
}

impl ViewPage {
    /// A page with no rows; the total is zero when one was requested.
    pub fn empty(need_total: bool) -> Self {
        Self {
            total_count: need_total.then_some(0),
            ..Default::default()
        }
    }
}
