//! SQL generation for SQL-federation views.
//!
//! - [`generator`]: data scope → one statement, with per-node lineage
//! - [`request`]: view statement → the paged, filtered request statement
//! - [`builder`]: WHERE injection and LIMIT handling on arbitrary SQL text
//! - [`fields`]: projection extraction for raw-SQL nodes
//! - [`template`]: node placeholders in raw-SQL nodes
//! - [`quote`]: identifier and literal quoting

pub mod builder;
pub mod fields;
pub mod generator;
pub mod quote;
pub mod request;
pub mod template;

pub use builder::{add_limit_if_missing, add_page_if_missing, has_limit, SqlBuilder};
pub use fields::{extract_select_fields, SelectFields, SqlField, SqlFieldError};
pub use generator::{atomic_view_sql, build_view_sql, SqlGenerator};
pub use request::{compose_request_sql, RequestSql};
