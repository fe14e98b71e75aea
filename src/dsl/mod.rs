//! Search DSL generation for IndexBase and DSL views.
//!
//! A request becomes one `bool` query:
//!
//! ```text
//! bool
//! ├─ scope      terms(_index) + node filter, one per view node
//! ├─ range      @timestamp gte/lte
//! ├─ filters    caller filter (must when scoring, filter otherwise)
//! └─ rules      OR of row/column security filters
//! ```
//!
//! Sorting is completed with the tie-breakers the backend needs for stable
//! paging, and the serialized body is deterministic.

pub mod generator;
pub mod types;

pub use generator::{
    build_dsl, build_scope_query, build_sort, complete_sort, DslCompilation, NodeRoutes,
    DOC_ID_FIELD, INDEX_FIELD, SCORE_ALIAS, SCORE_FIELD, TIMESTAMP_FIELD,
};
pub use types::{BoolQuery, DslQuery, PitClause, QueryClause, SortClause};
