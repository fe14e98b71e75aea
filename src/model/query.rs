//! The per-request query envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::view::QueryType;
use crate::condition::FilterCond;
use crate::error::{ViewError, ViewResult};

/// Shape of the normalized rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Nested documents flattened into dotted keys.
    #[default]
    Flat,
    /// Documents keep their nesting.
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortParam {
    pub field: String,
    pub direction: Option<SortDirection>,
}

impl SortParam {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction: Some(direction),
        }
    }
}

/// A row/column security rule: the fields a caller may see and the rows
/// they may read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowColumnRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_filters: Option<FilterCond>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchAfterParams {
    #[serde(default)]
    pub search_after: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_keep_alive: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterCond>,
    pub sort: Vec<SortParam>,
    pub limit: usize,
    pub offset: usize,
    /// Epoch milliseconds; zero means unbounded.
    pub start: i64,
    pub end: i64,
    /// Time column used to bound SQL views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,
    pub format: Format,
    pub output_fields: Vec<String>,
    pub need_total: bool,
    pub row_column_rules: Vec<RowColumnRule>,
    /// Scroll keep-alive (e.g. "1m"); opens a scroll on the first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    pub use_search_after: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<SearchAfterParams>,
    /// Caller-supplied SQL that replaces the generated view SQL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Return an empty page instead of failing when a filter names an unknown field.
    pub allow_non_exist_field: bool,
    pub include_view: bool,
}

/// The single pagination strategy a request uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    Offset {
        offset: usize,
    },
    Scroll {
        keep_alive: Option<String>,
        scroll_id: Option<String>,
    },
    /// Point-in-time plus sort cursor on a search backend.
    SearchAfter {
        cursor: Vec<Value>,
        pit_id: Option<String>,
        pit_keep_alive: Option<String>,
    },
    /// Gateway cursor token for SQL backends.
    SqlCursor {
        cursor: Vec<Value>,
    },
}

impl Pagination {
    pub fn is_cursor(&self) -> bool {
        matches!(self, Pagination::SearchAfter { .. } | Pagination::SqlCursor { .. })
    }

    pub fn cursor(&self) -> &[Value] {
        match self {
            Pagination::SearchAfter { cursor, .. } | Pagination::SqlCursor { cursor } => cursor,
            _ => &[],
        }
    }
}

impl ViewQuery {
    pub fn wants_cursor(&self) -> bool {
        self.use_search_after || self.search_after.is_some()
    }

    fn wants_scroll(&self) -> bool {
        self.scroll.is_some() || self.scroll_id.is_some()
    }

    /// Resolve the one pagination mode this request uses. Mixing modes is rejected.
    pub fn pagination(&self, query_type: QueryType) -> ViewResult<Pagination> {
        let cursor = self.wants_cursor();
        let scroll = self.wants_scroll();

        if cursor && scroll {
            return Err(ViewError::InvalidQuery(
                "scroll and search_after cannot be combined".to_string(),
            ));
        }
        if (cursor || scroll) && self.offset > 0 {
            return Err(ViewError::InvalidQuery(
                "offset cannot be combined with scroll or search_after".to_string(),
            ));
        }

        if scroll {
            if query_type == QueryType::Sql {
                return Err(ViewError::InvalidQuery(
                    "scroll is not supported for SQL views".to_string(),
                ));
            }
            return Ok(Pagination::Scroll {
                keep_alive: self.scroll.clone(),
                scroll_id: self.scroll_id.clone(),
            });
        }

        if cursor {
            let params = self.search_after.clone().unwrap_or_default();
            if query_type == QueryType::Sql {
                if params.pit_id.is_some() || params.pit_keep_alive.is_some() {
                    return Err(ViewError::InvalidQuery(
                        "point-in-time is not supported for SQL views".to_string(),
                    ));
                }
                return Ok(Pagination::SqlCursor {
                    cursor: params.search_after,
                });
            }
            return Ok(Pagination::SearchAfter {
                cursor: params.search_after,
                pit_id: params.pit_id.filter(|id| !id.is_empty()),
                pit_keep_alive: params.pit_keep_alive.filter(|k| !k.is_empty()),
            });
        }

        Ok(Pagination::Offset {
            offset: self.offset,
        })
    }
}
