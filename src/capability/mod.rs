//! Statement Policy for Generated SQL
//!
//! Generated SQL is untrusted text. Before it reaches the database, this module
//! checks it against the configured `ExecutionPolicy`:
//! - Empty statements are rejected (the model produced nothing usable)
//! - Multi-statement text is always rejected (a single trailing `;` is fine)
//! - In read-only mode (the default), only read statements are permitted
//!
//! # Validation Strategy
//! - Engine-specific pattern matching (no shared SQL helpers)
//! - Conservative approach (fail-safe defaults)
//! - Quoted text and comments are lexed the way the engine lexes them, and
//!   forms whose reading depends on server settings are rejected

use serde::{Deserialize, Serialize};

use crate::engine::DatabaseType;
use crate::error::{AskError, Result};

/// Execution constraints applied to every generated statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Only permit read statements
    /// Default: true
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// Maximum number of rows to return (None means no limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,

    /// Statement timeout in milliseconds (None means no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

const fn default_read_only() -> bool {
    true
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self { read_only: true, max_rows: None, timeout_ms: None }
    }
}

impl ExecutionPolicy {
    /// Policy that executes any single statement, as the connected user permits
    #[must_use]
    pub fn unrestricted() -> Self {
        Self { read_only: false, ..Self::default() }
    }
}

/// Validate a generated statement against the policy
///
/// # Returns
/// * `Ok(())` if the statement may be executed
/// * `Err(GenerationFailed)` if the statement is empty
/// * `Err(CapabilityViolation)` if it is multi-statement, cannot be read unambiguously,
///   or is not read-only under a read-only policy
pub fn validate_statement(
    sql: &str,
    policy: &ExecutionPolicy,
    engine: DatabaseType,
) -> Result<()> {
    let processed = preprocess_sql(sql, engine)?;

    if !policy.read_only || is_read_only(&processed, engine) {
        Ok(())
    } else {
        Err(AskError::capability_violation(format!(
            "Only read-only statements are permitted. Refused to execute:\n\n{}",
            sql.trim()
        )))
    }
}

/// Reduce to code, reject empty and multi-statement text, normalize to uppercase
fn preprocess_sql(sql: &str, engine: DatabaseType) -> Result<String> {
    let code = scan_statement(sql, engine)?;
    let without_trailing = code.trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    if without_trailing.is_empty() {
        return Err(AskError::generation_failed("model produced an empty statement"));
    }
    if without_trailing.contains(';') {
        return Err(AskError::capability_violation(
            "Multi-statement queries are not permitted",
        ));
    }

    Ok(without_trailing.to_uppercase())
}

/// Code text of a statement as the engine's lexer sees it
///
/// Comments are dropped, quoted text is emptied (`'France'` becomes `''`) and
/// whitespace runs collapse to one space. Comment rules follow the engine:
/// - `/* ... */` everywhere; MySQL executable comments (`/*!`, `/*M!`, `/*+`) are refused
/// - `--` to end of line; on MySQL only when followed by whitespace (`5--1` is arithmetic)
/// - `#` to end of line on MySQL
fn scan_statement(sql: &str, engine: DatabaseType) -> Result<String> {
    let mysql = engine == DatabaseType::MySQL;
    let chars: Vec<char> = sql.chars().collect();
    let at = |i: usize| chars.get(i).copied();

    let mut code = String::with_capacity(sql.len());
    let mut i = 0;

    while let Some(ch) = at(i) {
        match (ch, at(i + 1)) {
            ('\'' | '"' | '`', _) => {
                i = skip_quoted(&chars, i + 1, ch, mysql)?;
                code.push(ch);
                code.push(ch);
            }
            ('[', _) if !mysql => {
                i = skip_quoted(&chars, i + 1, ']', false)?;
                code.push_str("[]");
            }
            ('-', Some('-'))
                if !mysql || at(i + 2).map_or(true, |c| c.is_whitespace() || c.is_control()) =>
            {
                i = skip_line(&chars, i + 2);
                code.push(' ');
            }
            ('#', _) if mysql => {
                i = skip_line(&chars, i + 1);
                code.push(' ');
            }
            ('/', Some('*')) => {
                let executable = matches!(
                    (at(i + 2), at(i + 3)),
                    (Some('!' | '+'), _) | (Some('M'), Some('!'))
                );
                if mysql && executable {
                    return Err(AskError::capability_violation(
                        "Executable comments are not permitted",
                    ));
                }
                i = skip_block_comment(&chars, i + 2);
                code.push(' ');
            }
            _ => {
                code.push(ch);
                i += 1;
            }
        }
    }

    Ok(code.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Index just past the closing quote, starting inside the quoted text
///
/// A doubled quote is an escaped quote. On MySQL a backslash escapes the next
/// character unless `NO_BACKSLASH_ESCAPES` is set, so a backslash before a quote
/// character has two readings and is refused.
fn skip_quoted(chars: &[char], mut i: usize, close: char, mysql: bool) -> Result<usize> {
    while let Some(&ch) = chars.get(i) {
        if ch == close {
            if close != ']' && chars.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }

        if mysql && ch == '\\' {
            if matches!(chars.get(i + 1), Some('\'' | '"' | '`')) {
                return Err(AskError::capability_violation(
                    "Backslash-escaped quotes are not permitted; double the quote instead",
                ));
            }
            i += 2;
            continue;
        }

        i += 1;
    }

    Err(AskError::capability_violation("Unterminated quoted text"))
}

/// Index just past the end of the current line
fn skip_line(chars: &[char], from: usize) -> usize {
    chars[from..].iter().position(|&c| c == '\n').map_or(chars.len(), |p| from + p + 1)
}

/// Index just past the closing `*/`, or the end of input
fn skip_block_comment(chars: &[char], from: usize) -> usize {
    chars[from..].windows(2).position(|w| w == ['*', '/']).map_or(chars.len(), |p| from + p + 2)
}

/// First keyword of the statement
fn leading_keyword(sql: &str) -> &str {
    sql.split(|c: char| c.is_whitespace() || c == '(').find(|w| !w.is_empty()).unwrap_or("")
}

fn is_read_only(sql: &str, engine: DatabaseType) -> bool {
    match engine {
        DatabaseType::MySQL => is_read_only_mysql(sql),
        DatabaseType::SQLite => is_read_only_sqlite(sql),
    }
}

// MySQL read-only check
fn is_read_only_mysql(sql: &str) -> bool {
    match leading_keyword(sql) {
        // SELECT ... INTO OUTFILE writes to the server filesystem
        "SELECT" => !sql.contains("INTO OUTFILE") && !sql.contains("INTO DUMPFILE"),
        "SHOW" | "DESCRIBE" | "DESC" => true,
        "WITH" => sql.contains("SELECT") && !writes_in_cte(sql),
        // EXPLAIN ANALYZE runs the statement it explains
        "EXPLAIN" => {
            let rest = sql.trim_start_matches("EXPLAIN").trim_start();
            is_read_only_mysql(rest.strip_prefix("ANALYZE").unwrap_or(rest))
        }
        _ => false,
    }
}

// SQLite read-only check
fn is_read_only_sqlite(sql: &str) -> bool {
    match leading_keyword(sql) {
        "SELECT" | "EXPLAIN" => true,
        "WITH" => sql.contains("SELECT") && !writes_in_cte(sql),
        // Only the query form of PRAGMA, never assignment
        "PRAGMA" => !sql.contains('='),
        _ => false,
    }
}

/// CTEs may wrap a data-modifying statement
fn writes_in_cte(sql: &str) -> bool {
    sql.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|w| matches!(w, "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "MERGE"))
}
