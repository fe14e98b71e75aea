//! Row/column security rules merged into one filter and one field set.

use super::{validate_filter, FilterCond};
use crate::error::{ViewError, ViewResult};
use crate::model::{FieldSet, RowColumnRule};

/// The combined effect of a caller's row/column rules.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRules {
    /// OR of every non-empty row filter; `None` when no rule restricts rows.
    pub filter: Option<FilterCond>,
    /// Union of the fields the rules expose, in view order.
    pub fields: FieldSet,
}

/// Merge rules against the view fields. Every field a rule names must
/// exist on the view; every row filter must be legal.
pub fn merge_row_column_rules(
    rules: &[RowColumnRule],
    view_fields: &FieldSet,
    max_sub_conditions: usize,
) -> ViewResult<MergedRules> {
    let mut allowed: Vec<&str> = Vec::new();
    let mut filters = Vec::new();

    for rule in rules {
        for name in &rule.fields {
            if !view_fields.contains(name) {
                return Err(ViewError::InvalidQuery(format!(
                    "row/column rule '{}' references field '{}' which does not exist in the view",
                    rule.name, name
                )));
            }
            if !allowed.contains(&name.as_str()) {
                allowed.push(name);
            }
        }

        if let Some(filter) = rule.row_filters.as_ref().filter(|f| !f.is_empty()) {
            validate_filter(filter, view_fields, max_sub_conditions)?;
            filters.push(filter.clone());
        }
    }

    let filter = match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(FilterCond::or(filters)),
    };

    Ok(MergedRules {
        filter,
        fields: view_fields.narrowed_to(allowed),
    })
}
