//! Reference condition compiler.

use serde_json::{json, Map, Value};

use super::{
    Compiled, CompiledCondition, ConditionCompiler, ConditionError, FilterCond, Operation,
    ALL_FIELDS,
};
use crate::model::{DataType, FeatureType, FieldSet, ViewType};
use crate::sql::quote::{escape_like, literal, quote_ident, quote_string};

/// Compiles filters into a small predicate tree rendered on demand.
///
/// Field references resolve against the supplied field set: atomic views
/// address fields by name, custom views by the source column.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConditionCompiler;

impl ConditionCompiler for BasicConditionCompiler {
    fn compile(
        &self,
        filter: &FilterCond,
        view_type: ViewType,
        fields: &FieldSet,
    ) -> Result<Option<Compiled>, ConditionError> {
        if filter.is_empty() {
            return Ok(None);
        }
        let node = Predicate::build(filter, view_type, fields)?;
        Ok(Some(Compiled {
            needs_scoring: node.needs_scoring(),
            form: Box::new(node),
        }))
    }
}

#[derive(Debug, Clone)]
struct Column {
    /// Name in the search backend.
    path: String,
    /// Name in SQL.
    column: String,
    data_type: DataType,
    keyword: bool,
}

impl Column {
    fn resolve(name: &str, view_type: ViewType, fields: &FieldSet) -> Result<Self, ConditionError> {
        if name == ALL_FIELDS {
            return Ok(Column {
                path: ALL_FIELDS.to_string(),
                column: ALL_FIELDS.to_string(),
                data_type: DataType::Unknown,
                keyword: false,
            });
        }
        let field = fields
            .get(name)
            .ok_or_else(|| ConditionError::FieldNotFound(name.to_string()))?;
        let path = match view_type {
            ViewType::Atomic => field.name.clone(),
            ViewType::Custom => field.source_name().to_string(),
        };
        Ok(Column {
            path,
            column: field.source_name().to_string(),
            data_type: field.data_type,
            keyword: field.has_feature(FeatureType::Keyword),
        })
    }

    /// Exact-match target: text fields compare on their keyword sub-field.
    fn exact_path(&self) -> String {
        if self.data_type.is_text() && self.keyword {
            format!("{}.keyword", self.path)
        } else {
            self.path.clone()
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Leaf {
        column: Column,
        op: Operation,
        op_name: String,
        value: Value,
    },
}

impl Predicate {
    fn build(filter: &FilterCond, view_type: ViewType, fields: &FieldSet) -> Result<Self, ConditionError> {
        let op = Operation::parse(&filter.operation)
            .ok_or_else(|| ConditionError::UnsupportedOperation(filter.operation.clone()))?;
        match op {
            Operation::And | Operation::Or => {
                let children = filter
                    .sub_conditions
                    .iter()
                    .filter(|c| !c.is_empty())
                    .map(|c| Predicate::build(c, view_type, fields))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if op == Operation::And {
                    Predicate::And(children)
                } else {
                    Predicate::Or(children)
                })
            }
            _ => Ok(Predicate::Leaf {
                column: Column::resolve(&filter.field, view_type, fields)?,
                op,
                op_name: filter.operation.clone(),
                value: filter.value.clone().unwrap_or(Value::Null),
            }),
        }
    }

    fn needs_scoring(&self) -> bool {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().any(Predicate::needs_scoring)
            }
            Predicate::Leaf { op, .. } => op.is_scoring(),
        }
    }

    fn dsl(&self) -> Result<Value, ConditionError> {
        match self {
            Predicate::And(children) => {
                let clauses = children.iter().map(Predicate::dsl).collect::<Result<Vec<_>, _>>()?;
                let key = if self.needs_scoring() { "must" } else { "filter" };
                Ok(json!({ "bool": { key: clauses } }))
            }
            Predicate::Or(children) => {
                let clauses = children.iter().map(Predicate::dsl).collect::<Result<Vec<_>, _>>()?;
                Ok(json!({ "bool": { "should": clauses, "minimum_should_match": 1 } }))
            }
            Predicate::Leaf {
                column,
                op,
                op_name,
                value,
            } => leaf_dsl(column, *op, op_name, value),
        }
    }

    fn sql(&self) -> Result<String, ConditionError> {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                let parts = children.iter().map(Predicate::sql).collect::<Result<Vec<_>, _>>()?;
                let joiner = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                match parts.len() {
                    0 => Ok("1 = 1".to_string()),
                    1 => Ok(parts.into_iter().next().unwrap_or_default()),
                    _ => Ok(format!("({})", parts.join(joiner))),
                }
            }
            Predicate::Leaf {
                column,
                op,
                op_name,
                value,
            } => leaf_sql(column, *op, op_name, value),
        }
    }
}

impl CompiledCondition for Predicate {
    fn to_dsl_fragment(&self) -> Result<Value, ConditionError> {
        self.dsl()
    }

    fn to_sql_fragment(&self) -> Result<String, ConditionError> {
        self.sql()
    }
}

fn single(path: String, value: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(path, value);
    Value::Object(inner)
}

fn must_not(clause: Value) -> Value {
    json!({ "bool": { "must_not": [clause] } })
}

fn bounds(value: &Value) -> (Value, Value) {
    let items = value.as_array().cloned().unwrap_or_default();
    let lower = items.first().cloned().unwrap_or(Value::Null);
    let upper = items.get(1).cloned().unwrap_or(Value::Null);
    (lower, upper)
}

fn before_offset(value: &Value) -> (String, String) {
    let (amount, unit) = bounds(value);
    let amount = amount.to_string();
    let unit = unit.as_str().unwrap_or("d").to_string();
    (amount, unit)
}

fn wildcard_pattern(s: &str) -> String {
    s.replace('\\', "\\\\").replace('*', "\\*").replace('?', "\\?")
}

fn leaf_dsl(column: &Column, op: Operation, op_name: &str, value: &Value) -> Result<Value, ConditionError> {
    let exact = column.exact_path();
    let path = column.path.clone();
    let text = value.as_str().unwrap_or_default();

    let clause = match op {
        Operation::Eq => json!({ "term": single(exact, value.clone()) }),
        Operation::NotEq => must_not(json!({ "term": single(exact, value.clone()) })),
        Operation::Gt => json!({ "range": single(path, json!({ "gt": value })) }),
        Operation::Gte => json!({ "range": single(path, json!({ "gte": value })) }),
        Operation::Lt => json!({ "range": single(path, json!({ "lt": value })) }),
        Operation::Lte => json!({ "range": single(path, json!({ "lte": value })) }),
        Operation::In => json!({ "terms": single(exact, value.clone()) }),
        Operation::NotIn => must_not(json!({ "terms": single(exact, value.clone()) })),
        Operation::Like => json!({
            "wildcard": single(exact, json!({ "value": format!("*{}*", wildcard_pattern(text)) }))
        }),
        Operation::NotLike => must_not(json!({
            "wildcard": single(exact, json!({ "value": format!("*{}*", wildcard_pattern(text)) }))
        })),
        Operation::Prefix => json!({ "prefix": single(exact, value.clone()) }),
        Operation::NotPrefix => must_not(json!({ "prefix": single(exact, value.clone()) })),
        Operation::Regex => json!({ "regexp": single(exact, value.clone()) }),
        Operation::Range | Operation::Between => {
            let (lower, upper) = bounds(value);
            json!({ "range": single(path, json!({ "gte": lower, "lte": upper })) })
        }
        Operation::OutRange => {
            let (lower, upper) = bounds(value);
            json!({ "bool": {
                "should": [
                    { "range": single(path.clone(), json!({ "lt": lower })) },
                    { "range": single(path, json!({ "gt": upper })) }
                ],
                "minimum_should_match": 1
            }})
        }
        Operation::Before => {
            let (amount, unit) = before_offset(value);
            json!({ "range": single(path, json!({ "lt": format!("now-{}{}", amount, unit) })) })
        }
        Operation::Exist | Operation::NotNull => json!({ "exists": { "field": path } }),
        Operation::NotExist | Operation::Null => must_not(json!({ "exists": { "field": path } })),
        Operation::Empty => json!({ "term": single(exact, json!("")) }),
        Operation::NotEmpty => json!({ "bool": {
            "filter": [{ "exists": { "field": path } }],
            "must_not": [{ "term": single(exact, json!("")) }]
        }}),
        Operation::Match | Operation::MatchPhrase if column.path == ALL_FIELDS => {
            let kind = if op == Operation::Match { "best_fields" } else { "phrase" };
            json!({ "multi_match": { "query": value, "fields": [ALL_FIELDS], "type": kind } })
        }
        Operation::Match => json!({ "match": single(path, value.clone()) }),
        Operation::MatchPhrase => json!({ "match_phrase": single(path, value.clone()) }),
        Operation::And | Operation::Or => {
            return Err(ConditionError::UnsupportedOperation(op_name.to_string()))
        }
    };
    Ok(clause)
}

fn sql_literal(column: &Column, op_name: &str, value: &Value) -> Result<String, ConditionError> {
    literal(value).ok_or_else(|| ConditionError::InvalidValue {
        field: column.column.clone(),
        op: op_name.to_string(),
        reason: "expected a scalar".to_string(),
    })
}

fn sql_list(column: &Column, op_name: &str, value: &Value) -> Result<String, ConditionError> {
    let items = value.as_array().cloned().unwrap_or_default();
    let rendered = items
        .iter()
        .map(|v| sql_literal(column, op_name, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join(", "))
}

fn sql_interval_unit(unit: &str) -> &'static str {
    match unit {
        "s" => "second",
        "m" => "minute",
        "h" => "hour",
        "w" => "week",
        "M" => "month",
        "y" => "year",
        _ => "day",
    }
}

fn leaf_sql(column: &Column, op: Operation, op_name: &str, value: &Value) -> Result<String, ConditionError> {
    if column.column == ALL_FIELDS {
        return Err(ConditionError::UnsupportedTarget {
            op: op_name.to_string(),
            target: "SQL",
        });
    }
    let col = quote_ident(&column.column);
    let text = value.as_str().unwrap_or_default();

    let sql = match op {
        Operation::Eq => format!("{} = {}", col, sql_literal(column, op_name, value)?),
        Operation::NotEq => format!("{} <> {}", col, sql_literal(column, op_name, value)?),
        Operation::Gt => format!("{} > {}", col, sql_literal(column, op_name, value)?),
        Operation::Gte => format!("{} >= {}", col, sql_literal(column, op_name, value)?),
        Operation::Lt => format!("{} < {}", col, sql_literal(column, op_name, value)?),
        Operation::Lte => format!("{} <= {}", col, sql_literal(column, op_name, value)?),
        Operation::In => format!("{} IN ({})", col, sql_list(column, op_name, value)?),
        Operation::NotIn => format!("{} NOT IN ({})", col, sql_list(column, op_name, value)?),
        Operation::Like => format!("{} LIKE {}", col, quote_string(&format!("%{}%", escape_like(text)))),
        Operation::NotLike => format!(
            "{} NOT LIKE {}",
            col,
            quote_string(&format!("%{}%", escape_like(text)))
        ),
        Operation::Prefix => format!("{} LIKE {}", col, quote_string(&format!("{}%", escape_like(text)))),
        Operation::NotPrefix => format!(
            "{} NOT LIKE {}",
            col,
            quote_string(&format!("{}%", escape_like(text)))
        ),
        Operation::Regex => format!("regexp_like({}, {})", col, quote_string(text)),
        Operation::Range | Operation::Between => {
            let (lower, upper) = bounds(value);
            format!(
                "{} BETWEEN {} AND {}",
                col,
                sql_literal(column, op_name, &lower)?,
                sql_literal(column, op_name, &upper)?
            )
        }
        Operation::OutRange => {
            let (lower, upper) = bounds(value);
            format!(
                "({} < {} OR {} > {})",
                col,
                sql_literal(column, op_name, &lower)?,
                col,
                sql_literal(column, op_name, &upper)?
            )
        }
        Operation::Before => {
            let (amount, unit) = before_offset(value);
            format!(
                "{} < date_add('{}', -{}, now())",
                col,
                sql_interval_unit(&unit),
                amount
            )
        }
        Operation::Exist | Operation::NotNull => format!("{} IS NOT NULL", col),
        Operation::NotExist | Operation::Null => format!("{} IS NULL", col),
        Operation::Empty => format!("{} = ''", col),
        Operation::NotEmpty => format!("({} IS NOT NULL AND {} <> '')", col, col),
        Operation::Match | Operation::MatchPhrase | Operation::And | Operation::Or => {
            return Err(ConditionError::UnsupportedTarget {
                op: op_name.to_string(),
                target: "SQL",
            })
        }
    };
    Ok(sql)
}
