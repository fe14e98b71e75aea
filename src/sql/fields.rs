//! Output-column extraction for raw-SQL nodes.
//!
//! The expression is parsed with sqlparser so aliases, qualified names and
//! star projections are recognised by grammar rather than by pattern.

use sqlparser::ast::{Expr, SelectItem, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};

use super::quote::quote_ident;
use super::template::{self, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum SqlFieldError {
    #[error("failed to parse SQL: {0}")]
    Parse(#[from] ParserError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("SQL expression is empty")]
    Empty,

    #[error("SQL expression is not a SELECT query")]
    NotAQuery,
}

/// One projected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlField {
    /// The projected expression; a bare column name when it is one.
    pub name: String,
    pub alias: Option<String>,
}

impl SqlField {
    /// The column name the result set exposes.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectFields {
    pub fields: Vec<SqlField>,
    pub has_star: bool,
}

/// Extract the projection of a raw-SQL node expression. Node placeholders
/// are replaced by quoted identifiers before parsing.
pub fn extract_select_fields(sql: &str) -> Result<SelectFields, SqlFieldError> {
    if sql.trim().is_empty() {
        return Err(SqlFieldError::Empty);
    }
    let sql = template::render(sql, |id| Ok(quote_ident(id)))?;

    let statements = Parser::parse_sql(&GenericDialect {}, &sql)?;
    let Some(Statement::Query(query)) = statements.first() else {
        return Err(SqlFieldError::NotAQuery);
    };
    let projection = projection(&query.body).ok_or(SqlFieldError::NotAQuery)?;

    let mut out = SelectFields::default();
    for item in projection {
        match item {
            SelectItem::UnnamedExpr(expr) => out.fields.push(SqlField {
                name: expr_name(expr),
                alias: None,
            }),
            SelectItem::ExprWithAlias { expr, alias } => out.fields.push(SqlField {
                name: expr_name(expr),
                alias: Some(alias.value.clone()),
            }),
            _ => out.has_star = true,
        }
    }
    Ok(out)
}

/// The projection of the left-most SELECT.
fn projection(body: &SetExpr) -> Option<&[SelectItem]> {
    match body {
        SetExpr::Select(select) => Some(select.projection.as_slice()),
        SetExpr::Query(query) => projection(&query.body),
        SetExpr::SetOperation { left, .. } => projection(left),
        _ => None,
    }
}

fn expr_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}
