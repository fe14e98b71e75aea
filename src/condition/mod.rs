//! Filter trees and the bridge to backend-native predicates.
//!
//! A [`FilterCond`] is the single filter representation used by view nodes,
//! global request filters and row/column security rules. It is turned into
//! backend syntax by a [`ConditionCompiler`], an injected collaborator. The
//! compiled form renders to either a DSL fragment or a SQL fragment:
//!
//! ```text
//! FilterCond ──[ConditionCompiler::compile]──▶ Compiled
//!                                                 │
//!                       ┌─────────────────────────┴──────────────┐
//!                       ▼                                        ▼
//!              to_dsl_fragment (JSON)                  to_sql_fragment (text)
//! ```
//!
//! [`BasicConditionCompiler`] is a reference compiler covering the common
//! operators.

mod basic;
mod rules;
mod validate;

pub use basic::BasicConditionCompiler;
pub use rules::{merge_row_column_rules, MergedRules};
pub use validate::{referenced_fields, validate_filter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{FieldSet, ViewType};

/// Fields that describe a document rather than its content.
pub const META_FIELD_ID: &str = "__id";
pub const META_FIELD_ROUTING: &str = "__routing";
/// Matches every field of a document in full-text operators.
pub const ALL_FIELDS: &str = "*";

/// A recursive filter tree: a leaf `field op value` or an `and`/`or` of children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCond {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_conditions: Vec<FilterCond>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FilterCond {
    /// A leaf comparing `field` with a constant.
    pub fn leaf(field: impl Into<String>, operation: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operation: operation.to_string(),
            value_from: VALUE_FROM_CONST.to_string(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A leaf whose operator takes no value (`exist`, `empty`, ...).
    pub fn unary(field: impl Into<String>, operation: &str) -> Self {
        Self {
            field: field.into(),
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    pub fn and(children: Vec<FilterCond>) -> Self {
        Self {
            operation: "and".to_string(),
            sub_conditions: children,
            ..Default::default()
        }
    }

    pub fn or(children: Vec<FilterCond>) -> Self {
        Self {
            operation: "or".to_string(),
            sub_conditions: children,
            ..Default::default()
        }
    }

    /// An empty filter constrains nothing and compiles to no clause.
    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
            && self.operation.is_empty()
            && self.sub_conditions.is_empty()
            && self.value.is_none()
    }
}

pub const VALUE_FROM_CONST: &str = "const";

/// Filter operators understood by the legality checks and the reference compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    And,
    Or,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    Prefix,
    NotPrefix,
    Regex,
    Range,
    OutRange,
    Between,
    Before,
    Exist,
    NotExist,
    Empty,
    NotEmpty,
    Null,
    NotNull,
    Match,
    MatchPhrase,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "and" => Operation::And,
            "or" => Operation::Or,
            "==" | "eq" => Operation::Eq,
            "!=" | "not_eq" => Operation::NotEq,
            ">" | "gt" => Operation::Gt,
            ">=" | "gte" => Operation::Gte,
            "<" | "lt" => Operation::Lt,
            "<=" | "lte" => Operation::Lte,
            "in" => Operation::In,
            "not_in" => Operation::NotIn,
            "like" => Operation::Like,
            "not_like" => Operation::NotLike,
            "prefix" => Operation::Prefix,
            "not_prefix" => Operation::NotPrefix,
            "regex" => Operation::Regex,
            "range" => Operation::Range,
            "out_range" => Operation::OutRange,
            "between" => Operation::Between,
            "before" => Operation::Before,
            "exist" => Operation::Exist,
            "not_exist" => Operation::NotExist,
            "empty" => Operation::Empty,
            "not_empty" => Operation::NotEmpty,
            "null" => Operation::Null,
            "not_null" => Operation::NotNull,
            "match" => Operation::Match,
            "match_phrase" => Operation::MatchPhrase,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Operation::And | Operation::Or)
    }

    /// Operators that test presence and take no value.
    pub fn takes_no_value(self) -> bool {
        matches!(
            self,
            Operation::Exist
                | Operation::NotExist
                | Operation::Empty
                | Operation::NotEmpty
                | Operation::Null
                | Operation::NotNull
        )
    }

    /// Operators whose value is a single scalar.
    pub fn takes_single_value(self) -> bool {
        matches!(
            self,
            Operation::Eq
                | Operation::NotEq
                | Operation::Gt
                | Operation::Gte
                | Operation::Lt
                | Operation::Lte
                | Operation::Like
                | Operation::NotLike
                | Operation::Prefix
                | Operation::NotPrefix
                | Operation::Regex
                | Operation::Match
                | Operation::MatchPhrase
        )
    }

    /// Operators whose value must be a string pattern.
    pub fn takes_pattern(self) -> bool {
        matches!(
            self,
            Operation::Like
                | Operation::NotLike
                | Operation::Prefix
                | Operation::NotPrefix
                | Operation::Regex
        )
    }

    /// Full-text operators that contribute to relevance.
    pub fn is_scoring(self) -> bool {
        matches!(self, Operation::Match | Operation::MatchPhrase)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("meta field '{0}' cannot be filtered")]
    MetaField(String),

    #[error("filter operation is required")]
    MissingOperation,

    #[error("unsupported filter operation '{0}'")]
    UnsupportedOperation(String),

    #[error("'{op}' takes at most {max} sub-conditions, got {count}")]
    TooManySubConditions { op: String, count: usize, max: usize },

    #[error("filter field is required for operation '{0}'")]
    MissingField(String),

    #[error("filter on '{field}' must take a constant value, got value_from '{value_from}'")]
    NonConstValue { field: String, value_from: String },

    #[error("invalid value for '{field}' {op}: {reason}")]
    InvalidValue {
        field: String,
        op: String,
        reason: String,
    },

    #[error("invalid regular expression for '{field}': {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("field '{0}' does not exist")]
    FieldNotFound(String),

    #[error("binary field '{0}' cannot be filtered")]
    BinaryField(String),

    #[error("field '*' only supports match and match_phrase, got '{0}'")]
    WildcardOperation(String),

    #[error("operation '{op}' cannot be rendered as {target}")]
    UnsupportedTarget { op: String, target: &'static str },
}

/// A filter compiled for one view, renderable to either backend.
pub trait CompiledCondition: Send + Sync + std::fmt::Debug {
    fn to_dsl_fragment(&self) -> Result<Value, ConditionError>;
    fn to_sql_fragment(&self) -> Result<String, ConditionError>;
}

/// Output of [`ConditionCompiler::compile`].
#[derive(Debug)]
pub struct Compiled {
    /// The filter contains full-text operators and must be placed where it scores.
    pub needs_scoring: bool,
    pub form: Box<dyn CompiledCondition>,
}

/// Compiles a filter tree against a view's fields.
pub trait ConditionCompiler: Send + Sync {
    /// Returns `None` for an empty filter.
    fn compile(
        &self,
        filter: &FilterCond,
        view_type: ViewType,
        fields: &FieldSet,
    ) -> Result<Option<Compiled>, ConditionError>;
}

/// Compile `filter` and render it as a DSL clause plus its scoring flag.
pub fn dsl_condition(
    compiler: &dyn ConditionCompiler,
    filter: Option<&FilterCond>,
    view_type: ViewType,
    fields: &FieldSet,
) -> Result<Option<(Value, bool)>, ConditionError> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return Ok(None);
    };
    match compiler.compile(filter, view_type, fields)? {
        Some(compiled) => Ok(Some((compiled.form.to_dsl_fragment()?, compiled.needs_scoring))),
        None => Ok(None),
    }
}

/// Compile `filter` and render it as a SQL boolean expression.
pub fn sql_condition(
    compiler: &dyn ConditionCompiler,
    filter: Option<&FilterCond>,
    view_type: ViewType,
    fields: &FieldSet,
) -> Result<Option<String>, ConditionError> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return Ok(None);
    };
    match compiler.compile(filter, view_type, fields)? {
        Some(compiled) => Ok(Some(compiled.form.to_sql_fragment()?)),
        None => Ok(None),
    }
}
