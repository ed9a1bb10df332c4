//! SQL-aware scanning: named parameter rewriting, positional placeholder
//! counting and keyword detection.
//!
//! All three walk the statement the same way: string literals, quoted
//! identifiers, line comments, block comments and (PostgreSQL) dollar-quoted
//! bodies are skipped as opaque regions; only the remaining code is inspected.

use crate::db::params::ParameterSource;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, SqlValue};

/// Longest accepted parameter name.
pub const MAX_PARAMETER_NAME_LEN: usize = 64;

/// A statement with named parameters rewritten to positional markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    /// Statement text in the engine's positional syntax.
    pub sql: String,
    /// Parameter names in marker order; repeats are listed once per use.
    pub names: Vec<String>,
}

impl ParsedSql {
    /// Resolve the positional values from a parameter source.
    pub fn bind(&self, source: &ParameterSource) -> DbResult<Vec<SqlValue>> {
        self.names
            .iter()
            .map(|name| {
                source.get(name).cloned().ok_or_else(|| {
                    DbError::execution(format!(
                        "No value supplied for named parameter ':{}'",
                        name
                    ))
                })
            })
            .collect()
    }
}

/// Rewrite `:name` parameters into the engine's positional markers.
///
/// Names match `[A-Za-z][A-Za-z0-9_]*`. `::` (PostgreSQL casts) is never a
/// parameter.
pub fn parse_named(sql: &str, db: DatabaseType) -> DbResult<ParsedSql> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i, db) {
            i = end;
            continue;
        }
        if bytes[i] == b':' {
            if bytes.get(i + 1) == Some(&b':') {
                i += 2;
                continue;
            }
            if bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
                let start = i + 1;
                let end = ident_end(bytes, start);
                let name = &sql[start..end];
                if name.len() > MAX_PARAMETER_NAME_LEN {
                    return Err(DbError::execution(format!(
                        "Parameter name '{}...' exceeds {} characters",
                        &name[..16],
                        MAX_PARAMETER_NAME_LEN
                    )));
                }
                out.push_str(&sql[copied..i]);
                names.push(name.to_string());
                out.push_str(&db.placeholder(names.len()));
                copied = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&sql[copied..]);

    Ok(ParsedSql { sql: out, names })
}

/// Number of positional parameters a statement expects.
///
/// `?` markers for SQLite and MySQL (`?NNN` counts as position NNN on SQLite),
/// the highest `$n` for PostgreSQL.
pub fn count_placeholders(sql: &str, db: DatabaseType) -> usize {
    let bytes = sql.as_bytes();
    let mut sequential = 0;
    let mut highest = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i, db) {
            i = end;
            continue;
        }
        match (db, bytes[i]) {
            (DatabaseType::PostgreSQL, b'$') => {
                let (n, end) = read_number(sql, i + 1);
                if let Some(n) = n {
                    highest = highest.max(n);
                }
                i = end.max(i + 1);
                continue;
            }
            (DatabaseType::SQLite, b'?') => {
                let (n, end) = read_number(sql, i + 1);
                let position = n.unwrap_or_else(|| {
                    sequential += 1;
                    sequential
                });
                highest = highest.max(position);
                i = end;
                continue;
            }
            (DatabaseType::MySQL, b'?') => {
                sequential += 1;
                highest = sequential;
            }
            _ => {}
        }
        i += 1;
    }
    highest
}

/// Fail when the number of supplied values differs from the markers present.
pub fn check_placeholder_count(sql: &str, db: DatabaseType, supplied: usize) -> DbResult<()> {
    let expected = count_placeholders(sql, db);
    if expected == supplied {
        Ok(())
    } else {
        Err(DbError::execution(format!(
            "Statement expects {} parameter(s) but {} were supplied",
            expected, supplied
        )))
    }
}

/// Whether `keyword` appears as a whole word in the code part of `sql`.
pub fn contains_keyword(sql: &str, db: DatabaseType, keyword: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i, db) {
            i = end;
            continue;
        }
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let end = ident_end(bytes, i);
            if sql[i..end].eq_ignore_ascii_case(keyword) {
                return true;
            }
            i = end;
            continue;
        }
        i += 1;
    }
    false
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}

fn read_number(sql: &str, start: usize) -> (Option<usize>, usize) {
    let bytes = sql.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return (None, start);
    }
    (sql[start..end].parse().ok(), end)
}

/// If an opaque region starts at `i`, the index just past it.
fn skip_opaque(bytes: &[u8], i: usize, db: DatabaseType) -> Option<usize> {
    let mysql = db == DatabaseType::MySQL;
    match bytes[i] {
        b'\'' => Some(skip_quoted(bytes, i, b'\'', mysql)),
        b'"' => Some(skip_quoted(bytes, i, b'"', mysql)),
        b'`' if mysql => Some(skip_quoted(bytes, i, b'`', false)),
        b'[' if db == DatabaseType::SQLite => Some(skip_until(bytes, i + 1, b"]")),
        b'-' if bytes.get(i + 1) == Some(&b'-') => Some(skip_until_newline(bytes, i + 2)),
        b'#' if mysql => Some(skip_until_newline(bytes, i + 1)),
        b'/' if bytes.get(i + 1) == Some(&b'*') => Some(skip_until(bytes, i + 2, b"*/")),
        b'$' if db == DatabaseType::PostgreSQL => skip_dollar_quoted(bytes, i),
        _ => None,
    }
}

/// Quoted region; a doubled quote is an escaped quote. Unterminated regions
/// run to the end of the statement.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_until_newline(bytes: &[u8], from: usize) -> usize {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

fn skip_until(bytes: &[u8], from: usize, terminator: &[u8]) -> usize {
    let from = from.min(bytes.len());
    bytes[from..]
        .windows(terminator.len())
        .position(|w| w == terminator)
        .map(|p| from + p + terminator.len())
        .unwrap_or(bytes.len())
}

/// `$$...$$` or `$tag$...$tag$`. `$1` is not a dollar quote.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if j < bytes.len() && (bytes[j].is_ascii_alphabetic() || bytes[j] == b'_') {
        j = ident_end(bytes, j);
    }
    if bytes.get(j) != Some(&b'$') {
        return None;
    }
    let tag = &bytes[start..=j];
    Some(skip_until(bytes, j + 1, tag))
}
