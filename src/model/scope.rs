//! Data-scope nodes: the DAG a custom view is composed from.
//!
//! Node JSON carries a `type` tag and an untyped `config` object. The config
//! is decoded into [`NodeConfig`] when the node is loaded, so everything
//! downstream works on typed configs.

use serde::{Deserialize, Serialize};

use super::field::{FieldSet, ViewField};
use super::view::DataView;
use crate::condition::FilterCond;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    View,
    Join,
    Union,
    Sql,
    Output,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::View => "view",
            NodeType::Join => "join",
            NodeType::Union => "union",
            NodeType::Sql => "sql",
            NodeType::Output => "output",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistinctConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Reads an atomic view, optionally filtered and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewNodeConfig {
    pub view_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterCond>,
    #[serde(default)]
    pub distinct: DistinctConfig,
    /// The source atomic view, hydrated by the view store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Box<DataView>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    #[serde(rename = "inner")]
    Inner,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "full outer")]
    FullOuter,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::FullOuter => "FULL OUTER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOn {
    pub left_field: String,
    pub right_field: String,
    #[serde(default = "default_join_operator")]
    pub operator: String,
}

fn default_join_operator() -> String {
    "=".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNodeConfig {
    pub join_type: JoinType,
    #[serde(default)]
    pub join_on: Vec<JoinOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterCond>,
    #[serde(default)]
    pub distinct: DistinctConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionType {
    All,
    Distinct,
}

impl UnionType {
    pub fn as_sql(self) -> &'static str {
        match self {
            UnionType::All => "UNION ALL",
            UnionType::Distinct => "UNION DISTINCT",
        }
    }
}

/// Where a union branch takes one output column from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionField {
    pub field: String,
    /// `const` makes `field` a literal; anything else names an input column.
    #[serde(default)]
    pub value_from: String,
}

impl UnionField {
    pub fn is_const(&self) -> bool {
        self.value_from == "const"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionNodeConfig {
    pub union_type: UnionType,
    /// One mapping list per input, positionally aligned with the output fields.
    #[serde(default)]
    pub union_fields: Vec<Vec<UnionField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterCond>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlNodeConfig {
    #[serde(default)]
    pub sql_expression: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    View(ViewNodeConfig),
    Join(JoinNodeConfig),
    Union(UnionNodeConfig),
    Sql(SqlNodeConfig),
    Output,
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::View(_) => NodeType::View,
            NodeConfig::Join(_) => NodeType::Join,
            NodeConfig::Union(_) => NodeType::Union,
            NodeConfig::Sql(_) => NodeType::Sql,
            NodeConfig::Output => NodeType::Output,
        }
    }

    fn decode(node_id: &str, node_type: NodeType, raw: serde_json::Value) -> Result<Self, String> {
        // An absent config decodes like an empty object.
        let raw = match raw {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let wrap = |e: serde_json::Error| {
            format!("node '{}': invalid {} config: {}", node_id, node_type, e)
        };
        Ok(match node_type {
            NodeType::View => NodeConfig::View(serde_json::from_value(raw).map_err(wrap)?),
            NodeType::Join => NodeConfig::Join(serde_json::from_value(raw).map_err(wrap)?),
            NodeType::Union => NodeConfig::Union(serde_json::from_value(raw).map_err(wrap)?),
            NodeType::Sql => NodeConfig::Sql(serde_json::from_value(raw).map_err(wrap)?),
            NodeType::Output => NodeConfig::Output,
        })
    }

    fn encode(&self) -> serde_json::Value {
        let encoded = match self {
            NodeConfig::View(cfg) => serde_json::to_value(cfg),
            NodeConfig::Join(cfg) => serde_json::to_value(cfg),
            NodeConfig::Union(cfg) => serde_json::to_value(cfg),
            NodeConfig::Sql(cfg) => serde_json::to_value(cfg),
            NodeConfig::Output => return serde_json::Value::Object(Default::default()),
        };
        encoded.unwrap_or(serde_json::Value::Null)
    }
}

/// One node of a custom view's data scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct DataScopeNode {
    pub id: String,
    pub input_nodes: Vec<String>,
    pub config: NodeConfig,
    pub output_fields: FieldSet,
    /// Output lineage recorded when the node is compiled to SQL.
    pub output_fields_map: Option<FieldSet>,
}

impl DataScopeNode {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            input_nodes: Vec::new(),
            config,
            output_fields: FieldSet::new(),
            output_fields_map: None,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_nodes = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_fields(mut self, fields: Vec<ViewField>) -> Self {
        self.output_fields = FieldSet::from(fields);
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }

    /// The source view of a view node, if it has been hydrated.
    pub fn source_view(&self) -> Option<&DataView> {
        match &self.config {
            NodeConfig::View(cfg) => cfg.view.as_deref(),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    input_nodes: Vec<String>,
    #[serde(default)]
    config: serde_json::Value,
    #[serde(default)]
    output_fields: Vec<ViewField>,
}

impl TryFrom<RawNode> for DataScopeNode {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let config = NodeConfig::decode(&raw.id, raw.node_type, raw.config)?;
        Ok(Self {
            id: raw.id,
            input_nodes: raw.input_nodes,
            config,
            output_fields: FieldSet::from(raw.output_fields),
            output_fields_map: None,
        })
    }
}

impl From<DataScopeNode> for RawNode {
    fn from(node: DataScopeNode) -> Self {
        Self {
            id: node.id,
            node_type: node.config.node_type(),
            input_nodes: node.input_nodes,
            config: node.config.encode(),
            output_fields: node.output_fields.into(),
        }
    }
}
