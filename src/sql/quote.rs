//! Identifier and literal quoting for generated SQL.

use serde_json::Value;

/// Quote identifier with double quotes (ANSI style).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly qualified identifier (`lft.id` → `lft."id"`).
pub fn quote_qualified(qualifier: &str, ident: &str) -> String {
    format!("{}.{}", qualifier, quote_ident(ident))
}

/// Quote string with single quotes (standard SQL).
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a scalar JSON value as a SQL literal. Arrays and objects have no
/// literal form and yield `None`.
pub fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("NULL".to_string()),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(quote_string(s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern body.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
