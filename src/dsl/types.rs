//! The search DSL request object.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Value};

use crate::model::SortDirection;

/// A search request body. Field order and every collection are
/// deterministic, so equal inputs serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DslQuery {
    pub from: usize,
    pub size: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub track_total_hits: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub track_scores: bool,
    pub query: QueryClause,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pit: Option<PitClause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_after: Vec<Value>,
}

impl DslQuery {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The same request with paging, sorting and cursors stripped, as a
    /// count request expects.
    pub fn count_body(&self) -> Value {
        json!({ "query": self.query })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryClause {
    pub bool: BoolQuery,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty() && self.must.is_empty() && self.should.is_empty()
    }

    /// Place a clause in `must` when it scores, otherwise in `filter`.
    pub fn push(&mut self, clause: Value, scoring: bool) {
        if scoring {
            self.must.push(clause);
        } else {
            self.filter.push(clause);
        }
    }
}

/// `{"<field>": "<direction>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

impl Serialize for SortClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.direction)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PitClause {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}
