//! Data model: views, fields, data-scope nodes and the query envelope.

mod field;
mod query;
mod scope;
mod view;

pub use field::{DataType, FeatureType, FieldFeature, FieldSet, ViewField};
pub use query::{
    Format, Pagination, RowColumnRule, SearchAfterParams, SortDirection, SortParam, ViewQuery,
};
pub use scope::{
    DataScopeNode, DistinctConfig, JoinNodeConfig, JoinOn, JoinType, NodeConfig, NodeType,
    SqlNodeConfig, UnionField, UnionNodeConfig, UnionType, ViewNodeConfig,
};
pub use view::{DataView, FieldScope, QueryType, ViewType};
