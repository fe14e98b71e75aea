//! Legality checks for filter trees, run before a filter reaches a compiler.

use serde_json::Value;

use super::{
    ConditionError, FilterCond, Operation, ALL_FIELDS, META_FIELD_ID, META_FIELD_ROUTING,
    VALUE_FROM_CONST,
};
use crate::model::FieldSet;

/// Check a filter tree against the fields it will be evaluated on.
///
/// An empty filter is legal.
pub fn validate_filter(
    filter: &FilterCond,
    fields: &FieldSet,
    max_sub_conditions: usize,
) -> Result<(), ConditionError> {
    if filter.is_empty() {
        return Ok(());
    }
    check(filter, fields, max_sub_conditions)
}

fn check(
    filter: &FilterCond,
    fields: &FieldSet,
    max_sub_conditions: usize,
) -> Result<(), ConditionError> {
    if filter.field == META_FIELD_ID || filter.field == META_FIELD_ROUTING {
        return Err(ConditionError::MetaField(filter.field.clone()));
    }
    if filter.operation.is_empty() {
        return Err(ConditionError::MissingOperation);
    }
    let op = Operation::parse(&filter.operation)
        .ok_or_else(|| ConditionError::UnsupportedOperation(filter.operation.clone()))?;

    if op.is_logical() {
        if filter.sub_conditions.len() > max_sub_conditions {
            return Err(ConditionError::TooManySubConditions {
                op: filter.operation.clone(),
                count: filter.sub_conditions.len(),
                max: max_sub_conditions,
            });
        }
        for sub in &filter.sub_conditions {
            check(sub, fields, max_sub_conditions)?;
        }
        return Ok(());
    }

    if filter.field.is_empty() {
        return Err(ConditionError::MissingField(filter.operation.clone()));
    }

    if !op.takes_no_value() {
        if !filter.value_from.is_empty() && filter.value_from != VALUE_FROM_CONST {
            return Err(ConditionError::NonConstValue {
                field: filter.field.clone(),
                value_from: filter.value_from.clone(),
            });
        }
        check_value(filter, op)?;
    }

    if filter.field == ALL_FIELDS {
        if !op.is_scoring() {
            return Err(ConditionError::WildcardOperation(filter.operation.clone()));
        }
        return Ok(());
    }

    let field = fields
        .get(&filter.field)
        .ok_or_else(|| ConditionError::FieldNotFound(filter.field.clone()))?;
    if field.data_type.is_binary() {
        return Err(ConditionError::BinaryField(filter.field.clone()));
    }
    if matches!(op, Operation::Empty | Operation::NotEmpty) && !field.data_type.is_string() {
        return Err(invalid(filter, "only string fields can be tested for emptiness"));
    }
    Ok(())
}

fn check_value(filter: &FilterCond, op: Operation) -> Result<(), ConditionError> {
    let value = filter.value.as_ref().unwrap_or(&Value::Null);

    if op.takes_single_value() {
        if value.is_array() || value.is_object() {
            return Err(invalid(filter, "expected a single value"));
        }
        if value.is_null() {
            return Err(invalid(filter, "value is required"));
        }
    }

    if op.takes_pattern() {
        let Some(pattern) = value.as_str() else {
            return Err(invalid(filter, "expected a string"));
        };
        if op == Operation::Regex {
            regex::Regex::new(pattern).map_err(|source| ConditionError::InvalidRegex {
                field: filter.field.clone(),
                source,
            })?;
        }
    }

    match op {
        Operation::In | Operation::NotIn => match value.as_array() {
            Some(items) if !items.is_empty() => Ok(()),
            _ => Err(invalid(filter, "expected a non-empty array")),
        },
        Operation::Range | Operation::OutRange | Operation::Between => match value.as_array() {
            Some(items) if items.len() == 2 => Ok(()),
            _ => Err(invalid(filter, "expected an array of 2 bounds")),
        },
        Operation::Before => match value.as_array().map(Vec::as_slice) {
            Some([amount, unit]) if amount.is_number() && unit.is_string() => Ok(()),
            _ => Err(invalid(filter, "expected [amount, unit]")),
        },
        _ => Ok(()),
    }
}

fn invalid(filter: &FilterCond, reason: &str) -> ConditionError {
    ConditionError::InvalidValue {
        field: filter.field.clone(),
        op: filter.operation.clone(),
        reason: reason.to_string(),
    }
}

/// Every leaf field named in a filter tree, in first-seen order.
pub fn referenced_fields(filter: &FilterCond) -> Vec<&str> {
    let mut out = Vec::new();
    collect_fields(filter, &mut out);
    out
}

fn collect_fields<'a>(filter: &'a FilterCond, out: &mut Vec<&'a str>) {
    if !filter.field.is_empty() && !out.contains(&filter.field.as_str()) {
        out.push(filter.field.as_str());
    }
    for sub in &filter.sub_conditions {
        collect_fields(sub, out);
    }
}
