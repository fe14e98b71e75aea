//! # Vista
//!
//! A data-view query compiler for search-engine and SQL-federation backends.
//!
//! ## Architecture
//!
//! A data view is either a single physical source or a graph of scope
//! nodes (view, join, union, raw SQL, output). A query against a view is
//! validated, compiled for the view's backend, executed and normalized:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              DataView + ViewQuery                        │
//! │  (fields, data scope graph, filters, sort, pagination)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Checked scope (topological order, fields)         │
//! └─────────────────────────────────────────────────────────┘
//!                 │                         │
//!     [routing + dsl]                       [sql]
//!                 ▼                         ▼
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │  Search DSL (bool query)  │  │  Federated SQL statement │
//! └──────────────────────────┘  └──────────────────────────┘
//!                 │                         │
//!                 └────────────┬────────────┘
//!                              ▼ [backend]
//! ┌─────────────────────────────────────────────────────────┐
//! │           Raw response ── [normalize] ──► ViewPage       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`service::ViewQueryService`] runs the whole pipeline; each stage is
//! also usable on its own.

pub mod backend;
pub mod condition;
pub mod config;
pub mod dsl;
pub mod error;
pub mod model;
pub mod normalize;
pub mod routing;
pub mod service;
pub mod sql;
pub mod validation;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::backend::{
        BackendError, IndexResolver, ResolvedIndices, SearchBackend, SearchRequest, SqlBackend,
        SqlFetch,
    };
    pub use crate::condition::{
        BasicConditionCompiler, ConditionCompiler, ConditionError, FilterCond,
    };
    pub use crate::config::{QuerySettings, Settings};
    pub use crate::dsl::{build_dsl, DslCompilation, DslQuery};
    pub use crate::error::{ViewError, ViewResult};
    pub use crate::model::{
        DataScopeNode, DataType, DataView, FieldScope, FieldSet, Format, NodeConfig, NodeType,
        Pagination, QueryType, SortDirection, SortParam, ViewField, ViewQuery, ViewType,
    };
    pub use crate::normalize::{RowPool, ViewPage};
    pub use crate::service::{Backends, ViewQueryService};
    pub use crate::sql::{build_view_sql, compose_request_sql, SqlGenerator};
    pub use crate::validation::validate_view;
}

pub use error::{ViewError, ViewResult};
pub use model::{DataView, ViewQuery};
pub use service::ViewQueryService;
