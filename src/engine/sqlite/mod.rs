//! `SQLite` Database Engine Implementation
//!
//! This module implements the `Session` trait for `SQLite` database files.
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`); the file must already exist
//! - Schema introspection via `SQLite` system tables and PRAGMAs
//! - Verbatim statement execution with row limits
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - The connection sits behind a `std::sync::Mutex` and is never held across an await
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via `busy_timeout`

use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::capability::ExecutionPolicy;
use crate::engine::{
    ColumnInfo, ConnectionProfile, ForeignKeyInfo, QueryResult, Row, SchemaInfo, Session,
    TableInfo,
};
use crate::error::{AskError, Result};

/// An open `SQLite` session
pub struct SqliteSession {
    conn: Mutex<Connection>,
}

impl SqliteSession {
    /// Open an existing database file for the profile
    pub fn open(profile: &ConnectionProfile) -> Result<Self> {
        let file = profile
            .file
            .as_ref()
            .ok_or_else(|| AskError::client_input("SQLite requires 'file' parameter"))?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(file, flags).map_err(|e| {
            AskError::connection_failed(format!("Failed to open SQLite database: {e}"))
        })?;

        // Opening is lazy; touch the catalog so a non-database file fails here
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| {
                AskError::connection_failed(format!("Failed to open SQLite database: {e}"))
            })?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AskError::execution_failed("SQLite session lock poisoned"))
    }
}

impl Session for SqliteSession {
    async fn introspect(&self) -> Result<SchemaInfo> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| AskError::connection_failed(format!("Failed to query tables: {e}")))?;

        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(|e| {
                AskError::connection_failed(format!("Failed to fetch table names: {e}"))
            })?;

        let tables = table_names
            .iter()
            .map(|name| introspect_table(&conn, name))
            .collect::<Result<Vec<_>>>()?;

        Ok(SchemaInfo { tables })
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let conn = self.lock()?;
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_ident(table));
        execute_query(&conn, &sql, Some(limit))
    }

    async fn execute(&self, sql: &str, policy: &ExecutionPolicy) -> Result<QueryResult> {
        let conn = self.lock()?;

        if let Some(timeout_ms) = policy.timeout_ms {
            conn.busy_timeout(std::time::Duration::from_millis(timeout_ms)).map_err(|e| {
                AskError::execution_failed(format!("Failed to set timeout: {e}"))
            })?;
        }

        execute_query(&conn, sql, policy.max_rows)
    }

    async fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.close().map_err(|(_, e)| {
            AskError::connection_failed(format!("Failed to close SQLite database: {e}"))
        })
    }
}

/// Quote an identifier with double quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Introspect a single table and return `TableInfo`
fn introspect_table(conn: &Connection, table_name: &str) -> Result<TableInfo> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table_name)))
        .map_err(|e| {
            AskError::connection_failed(format!(
                "Failed to prepare table_info for {table_name}: {e}"
            ))
        })?;

    // (pk position, column)
    let described: Vec<(i32, ColumnInfo)> = stmt
        .query_map([], |row| {
            let pk: i32 = row.get(5)?;
            Ok((
                pk,
                ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    nullable: row.get::<_, i32>(3)? == 0,
                },
            ))
        })
        .and_then(|rows| rows.collect())
        .map_err(|e| {
            AskError::connection_failed(format!("Failed to query columns for {table_name}: {e}"))
        })?;

    let mut pk_columns: Vec<(i32, String)> = described
        .iter()
        .filter(|(pk, _)| *pk > 0)
        .map(|(pk, col)| (*pk, col.name.clone()))
        .collect();
    pk_columns.sort_by_key(|(pk, _)| *pk);
    let primary_key = pk_columns.into_iter().map(|(_, name)| name).collect();

    let columns = described.into_iter().map(|(_, col)| col).collect();

    let mut fk_stmt = conn
        .prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table_name)))
        .map_err(|e| {
            AskError::connection_failed(format!(
                "Failed to prepare foreign_key_list for {table_name}: {e}"
            ))
        })?;

    let fk_rows: Vec<(i32, String, String, String)> = fk_stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(2)?, row.get(3)?, row.get(4)?)))
        .and_then(|rows| rows.collect())
        .map_err(|e| {
            AskError::connection_failed(format!(
                "Failed to query foreign keys for {table_name}: {e}"
            ))
        })?;

    // Group by constraint id
    let mut fk_map: BTreeMap<i32, ForeignKeyInfo> = BTreeMap::new();
    for (id, referenced_table, from_col, to_col) in fk_rows {
        let fk = fk_map.entry(id).or_insert_with(|| ForeignKeyInfo {
            columns: Vec::new(),
            referenced_table,
            referenced_columns: Vec::new(),
        });
        fk.columns.push(from_col);
        fk.referenced_columns.push(to_col);
    }

    Ok(TableInfo {
        name: table_name.to_string(),
        columns,
        primary_key,
        foreign_keys: fk_map.into_values().collect(),
    })
}

/// Execute a statement and return `QueryResult`
fn execute_query(conn: &Connection, query: &str, max_rows: Option<usize>) -> Result<QueryResult> {
    let mut stmt = conn.prepare(query).map_err(|e| AskError::execution_failed(e.to_string()))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    if column_names.is_empty() {
        // Statement returns no rows (INSERT, UPDATE, DELETE, DDL)
        let changed = stmt.execute([]).map_err(|e| AskError::execution_failed(e.to_string()))?;
        return Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(changed as u64),
        });
    }

    let limit = max_rows.unwrap_or(usize::MAX);
    let mut rows = stmt.query([]).map_err(|e| AskError::execution_failed(e.to_string()))?;
    let mut rows_data = Vec::new();

    while rows_data.len() < limit {
        let Some(row) = rows.next().map_err(|e| AskError::execution_failed(e.to_string()))?
        else {
            break;
        };
        rows_data.push(row_to_json(&column_names, row)?);
    }

    Ok(QueryResult { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a `SQLite` row to a JSON-safe map
fn row_to_json(column_names: &[String], row: &rusqlite::Row<'_>) -> Result<Row> {
    use rusqlite::types::ValueRef;

    let mut map = Row::new();
    for (idx, name) in column_names.iter().enumerate() {
        let value_ref = row.get_ref(idx).map_err(|e| AskError::execution_failed(e.to_string()))?;

        let value = match value_ref {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Integer(i) => serde_json::Value::from(i),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            ValueRef::Text(bytes) => {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            ValueRef::Blob(bytes) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        };
        map.insert(name.clone(), value);
    }

    Ok(map)
}
