//! Reshaping of documents: dotted flattening and path-based projection.

use serde_json::{Map, Value};

use super::RowError;
use crate::model::{FieldSet, ViewField};

/// One normalized row.
pub type Row = Map<String, Value>;

/// Flatten nested objects into dotted keys.
///
/// Empty objects and arrays are kept as values. Arrays of objects are
/// expanded under the same key, so a scalar reached more than once becomes
/// an array of every value seen. With `keep`, only keys naming a field in
/// it are written.
pub fn flatten(doc: &Row, keep: Option<&FieldSet>) -> Row {
    let mut out = Row::new();
    for (key, value) in doc {
        assign(key.clone(), value, &mut out, keep);
    }
    out
}

fn assign(key: String, value: &Value, out: &mut Row, keep: Option<&FieldSet>) {
    let kept = |k: &str| keep.map_or(true, |fields| fields.contains(k));
    match value {
        Value::Object(map) if map.is_empty() => {
            if kept(&key) {
                out.insert(key, value.clone());
            }
        }
        Value::Object(map) => {
            for (sub, v) in map {
                assign(format!("{}.{}", key, sub), v, out, keep);
            }
        }
        Value::Array(items) => match items.first() {
            Some(Value::Object(_)) | Some(Value::Array(_)) => {
                for item in items {
                    assign(key.clone(), item, out, keep);
                }
            }
            _ => {
                if kept(&key) {
                    out.insert(key, value.clone());
                }
            }
        },
        scalar => match out.get_mut(&key) {
            None => {
                if kept(&key) {
                    out.insert(key, scalar.clone());
                }
            }
            Some(Value::Array(seen)) => seen.push(scalar.clone()),
            Some(seen) => {
                let first = seen.take();
                *seen = Value::Array(vec![first, scalar.clone()]);
            }
        },
    }
}

/// Copy each field from `doc` into a nested object at the field's path.
///
/// Arrays met along a path are fanned out; a field that resolves to a
/// single non-array value is written as a scalar, anything else as an
/// array. Fields absent from the document are skipped.
pub fn pick_fields<'f, I>(doc: &Row, fields: I) -> Result<Row, RowError>
where
    I: IntoIterator<Item = &'f ViewField>,
{
    let mut out = Row::new();
    for field in fields {
        let path = field.path();
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => continue,
        };
        let (values, is_array) = match doc.get(*head) {
            Some(Value::Null) | None => continue,
            Some(value) => values_at(value, rest),
        };
        set_path(&mut out, &path, values, is_array)?;
    }
    Ok(out)
}

fn values_at(current: &Value, path: &[&str]) -> (Vec<Value>, bool) {
    match current {
        Value::Null => (Vec::new(), false),
        Value::Array(items) if !path.is_empty() => {
            let values = items.iter().flat_map(|item| values_at(item, path).0).collect();
            (values, true)
        }
        Value::Object(map) => match path.split_first() {
            Some((head, rest)) => match map.get(*head) {
                Some(Value::Null) | None => (Vec::new(), false),
                Some(next) => values_at(next, rest),
            },
            None => (vec![current.clone()], false),
        },
        _ if !path.is_empty() => (Vec::new(), false),
        _ => leaves(current),
    }
}

fn leaves(value: &Value) -> (Vec<Value>, bool) {
    match value {
        Value::Null => (Vec::new(), false),
        Value::Array(items) => (items.iter().flat_map(|item| leaves(item).0).collect(), true),
        other => (vec![other.clone()], false),
    }
}

fn set_path(out: &mut Row, path: &[&str], mut values: Vec<Value>, is_array: bool) -> Result<(), RowError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };
    if values.is_empty() {
        return Ok(());
    }

    let mut current = out;
    for segment in parents {
        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Row::new()));
        current = match next {
            Value::Object(map) => map,
            _ => return Err(RowError::NotAnObject(segment.to_string())),
        };
    }

    let value = if values.len() == 1 && !is_array {
        values.remove(0)
    } else {
        Value::Array(values)
    };
    current.insert(last.to_string(), value);
    Ok(())
}
