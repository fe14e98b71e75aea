//! Node placeholders inside raw-SQL node expressions.
//!
//! A raw-SQL node refers to its inputs as `{{.node_id}}` or
//! `{{node "node_id"}}`; each placeholder is replaced by that input's SQL.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*(?:\.([A-Za-z0-9_\-]+)|node\s+"([^"]+)")\s*\}\}"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("placeholder references node '{0}' which is not an input")]
    UnknownNode(String),

    #[error("malformed placeholder near '{0}'")]
    Malformed(String),
}

fn captured_id<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Replace every placeholder with `resolve(node_id)`. Template text outside
/// the placeholders that still opens one is an error; the substituted SQL
/// is inserted as-is and never rescanned.
pub fn render<F>(template: &str, mut resolve: F) -> Result<String, TemplateError>
where
    F: FnMut(&str) -> Result<String, TemplateError>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &template[last..whole.start()];
        check_gap(template, last, gap)?;
        out.push_str(gap);
        out.push_str(&resolve(captured_id(&caps))?);
        last = whole.end();
    }
    let tail = &template[last..];
    check_gap(template, last, tail)?;
    out.push_str(tail);
    Ok(out)
}

fn check_gap(template: &str, offset: usize, gap: &str) -> Result<(), TemplateError> {
    match gap.find("{{") {
        Some(pos) => {
            let snippet: String = template[offset + pos..].chars().take(24).collect();
            Err(TemplateError::Malformed(snippet))
        }
        None => Ok(()),
    }
}
