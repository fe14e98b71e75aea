//! Text-level SQL rewriting: WHERE injection and LIMIT handling.
//!
//! These helpers work on SQL text that may come from a caller, so they never
//! assume it was generated here. Comments, string literals and quoted
//! identifiers are masked before any keyword is searched for.

use regex::Regex;
use std::sync::LazyLock;

static SELECT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bselect\b").unwrap());
static WHERE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").unwrap());
static CLAUSE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(group\s+by|order\s+by|having|limit)\b").unwrap()
});
static TRAILING_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blimit\s+\d+(?:\s*,\s*\d+|\s+offset\s+\d+)?\s*;?\s*$").unwrap()
});

#[derive(Clone, Copy)]
enum Scan {
    Code,
    LineComment,
    BlockComment,
    Quoted(char),
}

fn blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Replace comments and the bodies of quoted strings and identifiers with
/// spaces. The result has the same byte length, so offsets found in it are
/// valid in the original text.
pub fn mask_sql(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut state = Scan::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            Scan::Code => match (c, next) {
                ('-', Some('-')) => {
                    blank(&mut out, c);
                    blank(&mut out, '-');
                    state = Scan::LineComment;
                    i += 2;
                    continue;
                }
                ('/', Some('*')) => {
                    blank(&mut out, c);
                    blank(&mut out, '*');
                    state = Scan::BlockComment;
                    i += 2;
                    continue;
                }
                ('\'', _) | ('"', _) => {
                    out.push(c);
                    state = Scan::Quoted(c);
                }
                _ => out.push(c),
            },
            Scan::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = Scan::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            Scan::BlockComment => {
                if c == '*' && next == Some('/') {
                    blank(&mut out, c);
                    blank(&mut out, '/');
                    state = Scan::Code;
                    i += 2;
                    continue;
                }
                blank(&mut out, c);
            }
            Scan::Quoted(quote) => {
                if c == quote {
                    if next == Some(quote) {
                        blank(&mut out, c);
                        blank(&mut out, quote);
                        i += 2;
                        continue;
                    }
                    out.push(c);
                    state = Scan::Code;
                } else {
                    blank(&mut out, c);
                }
            }
        }
        i += 1;
    }
    out
}

/// Whether the statement already ends in a `LIMIT n`, `LIMIT n, m` or
/// `LIMIT n OFFSET m` clause. Trailing comments and semicolons are ignored.
pub fn has_limit(sql: &str) -> bool {
    TRAILING_LIMIT.is_match(&mask_sql(sql))
}

/// Append `LIMIT <limit>` unless the statement already has a trailing limit.
/// A trailing semicolon is dropped; trailing comments are kept after the limit.
pub fn add_limit_if_missing(sql: &str, limit: usize) -> String {
    add_page_if_missing(sql, limit, 0)
}

/// Like [`add_limit_if_missing`], with an `OFFSET` when `offset` is non-zero.
pub fn add_page_if_missing(sql: &str, limit: usize, offset: usize) -> String {
    let masked = mask_sql(sql);
    if TRAILING_LIMIT.is_match(&masked) {
        return sql.to_string();
    }

    let cut = masked
        .trim_end()
        .trim_end_matches(';')
        .trim_end()
        .len();
    let head = sql[..cut].trim_end();
    let tail: String = sql[cut..]
        .char_indices()
        .filter(|(i, _)| masked.as_bytes().get(cut + i) != Some(&b';'))
        .map(|(_, c)| c)
        .collect();
    let tail = tail.trim();

    let page = if offset > 0 {
        format!("LIMIT {} OFFSET {}", limit, offset)
    } else {
        format!("LIMIT {}", limit)
    };
    if tail.is_empty() {
        format!("{} {}", head, page)
    } else {
        format!("{} {} {}", head, page, tail)
    }
}

/// Injects WHERE predicates into an existing statement.
///
/// A single plain `SELECT` gets the predicates spliced in before its first
/// `GROUP BY`, `ORDER BY`, `HAVING` or `LIMIT` (AND-ed onto an existing
/// WHERE, which is parenthesised first). Anything with a nested `SELECT` is
/// wrapped as a subquery instead.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    base: String,
    conditions: Vec<String>,
}

impl SqlBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a predicate. Blank predicates are ignored.
    pub fn add_where(&mut self, condition: impl Into<String>) -> &mut Self {
        let condition = condition.into();
        if !condition.trim().is_empty() {
            self.conditions.push(condition.trim().to_string());
        }
        self
    }

    fn joined(&self, parenthesise: bool) -> String {
        if self.conditions.len() == 1 && !parenthesise {
            return self.conditions[0].clone();
        }
        self.conditions
            .iter()
            .map(|c| format!("({})", c))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn build(&self) -> String {
        if self.conditions.is_empty() {
            return self.base.clone();
        }

        let masked = mask_sql(&self.base);
        let cut = masked.trim_end().trim_end_matches(';').trim_end().len();
        let base = &self.base[..cut];
        let masked = &masked[..cut];

        let is_subquery = masked.trim_start().starts_with('(')
            || SELECT_KEYWORD.find_iter(masked).count() > 1;
        if is_subquery {
            return format!("SELECT * FROM ({}) AS subquery WHERE {}", base, self.joined(false));
        }

        match WHERE_KEYWORD.find(masked) {
            Some(where_kw) => {
                let boundary = CLAUSE_BOUNDARY
                    .find_at(masked, where_kw.end())
                    .map(|m| m.start())
                    .unwrap_or(base.len());
                let existing = base[where_kw.end()..boundary].trim();
                let rest = base[boundary..].trim();
                let spliced = format!(
                    "{}WHERE ({}) AND {}",
                    &base[..where_kw.start()],
                    existing,
                    self.joined(true)
                );
                if rest.is_empty() {
                    spliced
                } else {
                    format!("{} {}", spliced, rest)
                }
            }
            None => match CLAUSE_BOUNDARY.find(masked) {
                Some(boundary) => format!(
                    "{} WHERE {} {}",
                    base[..boundary.start()].trim_end(),
                    self.joined(false),
                    &base[boundary.start()..]
                ),
                None => format!("{} WHERE {}", base.trim_end(), self.joined(false)),
            },
        }
    }
}
