//! The data view: a named, typed projection over one or more physical stores.

use serde::{Deserialize, Serialize};

use super::field::{FieldSet, ViewField};
use super::scope::{DataScopeNode, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    /// Maps 1:1 to a physical index family or table.
    #[default]
    Atomic,
    /// Composed from a data-scope DAG.
    Custom,
}

/// Backend family a view executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueryType {
    /// Time-partitioned search-engine index family, routed through the index resolver.
    #[default]
    IndexBase,
    /// Raw search DSL backend addressed by technical name.
    #[serde(rename = "DSL")]
    Dsl,
    /// SQL-federation gateway.
    #[serde(rename = "SQL")]
    Sql,
}

impl QueryType {
    pub fn is_search(self) -> bool {
        matches!(self, QueryType::IndexBase | QueryType::Dsl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    /// Every column the backend returns is part of the view.
    All,
    /// Only the declared fields are exposed.
    #[default]
    Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataView {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Base type of an atomic search view, or the backend's name for it.
    #[serde(default)]
    pub technical_name: String,
    /// Physical table of an atomic SQL view.
    #[serde(default)]
    pub meta_table_name: String,
    /// Stored SQL that replaces the generated one for atomic SQL views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_str: Option<String>,
    #[serde(default)]
    pub data_source_id: String,
    #[serde(rename = "type", default)]
    pub view_type: ViewType,
    #[serde(default)]
    pub query_type: QueryType,
    #[serde(default)]
    pub fields: FieldSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_scope: Vec<DataScopeNode>,
    #[serde(default)]
    pub field_scope: FieldScope,

    #[serde(skip)]
    pub has_sql_node: bool,
    #[serde(skip)]
    pub has_star: bool,
    #[serde(skip)]
    pub is_single_source: bool,
}

impl DataView {
    /// An atomic view over one physical index family or table.
    pub fn atomic(id: impl Into<String>, technical_name: impl Into<String>, query_type: QueryType) -> Self {
        let technical_name = technical_name.into();
        Self {
            id: id.into(),
            meta_table_name: technical_name.clone(),
            technical_name,
            view_type: ViewType::Atomic,
            query_type,
            ..Default::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<ViewField>) -> Self {
        self.fields = FieldSet::from(fields);
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.view_type == ViewType::Atomic
    }

    pub fn node(&self, id: &str) -> Option<&DataScopeNode> {
        self.data_scope.iter().find(|n| n.id == id)
    }

    /// The first output node of the scope.
    pub fn output_node(&self) -> Option<&DataScopeNode> {
        self.data_scope
            .iter()
            .find(|n| n.node_type() == NodeType::Output)
    }

    /// View nodes in declaration order.
    pub fn view_nodes(&self) -> impl Iterator<Item = &DataScopeNode> {
        self.data_scope
            .iter()
            .filter(|n| n.node_type() == NodeType::View)
    }
}
