//! MySQL Database Engine Implementation
//!
//! This module implements the `Session` trait for MySQL databases (including MariaDB and TiDB).
//!
//! # Features
//! - Client-server connections via TCP, TLS-verified for managed hosts
//! - Schema introspection via information_schema
//! - Verbatim statement execution with row limits and timeouts
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - One `Conn` per session; statements are serialized on it
//! - Text-protocol values are re-typed from the column metadata
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via tokio::time::timeout

use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, OptsBuilder, Row as MyRow, SslOpts, Value};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::capability::ExecutionPolicy;
use crate::engine::{
    ColumnInfo, ConnectionProfile, ForeignKeyInfo, QueryResult, Row, SchemaInfo, Session,
    TableInfo,
};
use crate::error::{AskError, Result};

/// An open MySQL session
pub struct MySqlSession {
    conn: Mutex<Conn>,
    database: String,
}

impl MySqlSession {
    /// Open a connection for the profile
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        let opts = build_mysql_opts(profile);

        let conn = Conn::new(opts).await.map_err(|e| {
            AskError::connection_failed(format!("Failed to connect to MySQL: {e}"))
        })?;

        tracing::debug!(
            host = %profile.host,
            port = profile.port,
            tls = profile.tls_required,
            "mysql session opened"
        );

        Ok(Self { conn: Mutex::new(conn), database: profile.database.clone() })
    }
}

impl Session for MySqlSession {
    async fn introspect(&self) -> Result<SchemaInfo> {
        let mut conn = self.conn.lock().await;
        let tables = introspect_all_tables(&mut conn, &self.database).await?;
        Ok(SchemaInfo { tables })
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_ident(table));
        let mut conn = self.conn.lock().await;
        run_statement(&mut conn, &sql, Some(limit)).await
    }

    async fn execute(&self, sql: &str, policy: &ExecutionPolicy) -> Result<QueryResult> {
        let mut conn = self.conn.lock().await;

        if let Some(timeout_ms) = policy.timeout_ms {
            tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                run_statement(&mut conn, sql, policy.max_rows),
            )
            .await
            .map_err(|_| {
                AskError::execution_failed(format!("Query exceeded timeout of {timeout_ms}ms"))
            })?
        } else {
            run_statement(&mut conn, sql, policy.max_rows).await
        }
    }

    async fn close(self) -> Result<()> {
        self.conn.into_inner().disconnect().await.map_err(|e| {
            AskError::connection_failed(format!("Failed to disconnect: {e}"))
        })
    }
}

/// Build MySQL connection options from a validated profile
fn build_mysql_opts(profile: &ConnectionProfile) -> OptsBuilder {
    let opts = OptsBuilder::default()
        .ip_or_hostname(profile.host.as_str())
        .tcp_port(profile.port)
        .user(Some(profile.user.as_str()))
        .pass(Some(profile.password.as_str()))
        .db_name(Some(profile.database.as_str()));

    if !profile.tls_required {
        return opts;
    }

    let mut ssl = SslOpts::default();
    if let Some(ca_cert) = &profile.ca_cert {
        ssl = ssl.with_root_certs(vec![ca_cert.clone().into()]);
    }
    opts.ssl_opts(Some(ssl))
}

/// Quote an identifier with backticks
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Introspect all tables in the database
async fn introspect_all_tables(conn: &mut Conn, schema: &str) -> Result<Vec<TableInfo>> {
    let query = "SELECT table_name
                 FROM information_schema.tables
                 WHERE table_schema = ?
                 AND table_type = 'BASE TABLE'
                 ORDER BY table_name";

    let table_names: Vec<String> = conn.exec(query, (schema,)).await.map_err(|e| {
        AskError::connection_failed(format!("Failed to query tables: {e}"))
    })?;

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        let columns = introspect_columns(conn, schema, &table_name).await?;
        let primary_key = introspect_primary_key(conn, schema, &table_name).await?;
        let foreign_keys = introspect_foreign_keys(conn, schema, &table_name).await?;
        tables.push(TableInfo { name: table_name, columns, primary_key, foreign_keys });
    }

    Ok(tables)
}

/// Introspect table columns
async fn introspect_columns(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ColumnInfo>> {
    let query = "SELECT column_name, column_type, is_nullable
                 FROM information_schema.columns
                 WHERE table_schema = ? AND table_name = ?
                 ORDER BY ordinal_position";

    let rows: Vec<(String, String, String)> =
        conn.exec(query, (schema, table_name)).await.map_err(|e| {
            AskError::connection_failed(format!(
                "Failed to query columns for {schema}.{table_name}: {e}"
            ))
        })?;

    Ok(rows
        .into_iter()
        .map(|(name, data_type, is_nullable)| ColumnInfo {
            name,
            data_type: data_type.to_uppercase(),
            nullable: is_nullable == "YES",
        })
        .collect())
}

/// Introspect primary key
async fn introspect_primary_key(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<String>> {
    let query = "SELECT column_name
                 FROM information_schema.key_column_usage
                 WHERE table_schema = ?
                 AND table_name = ?
                 AND constraint_name = 'PRIMARY'
                 ORDER BY ordinal_position";

    conn.exec(query, (schema, table_name)).await.map_err(|e| {
        AskError::connection_failed(format!(
            "Failed to query primary key for {schema}.{table_name}: {e}"
        ))
    })
}

/// Introspect foreign keys, grouped by constraint in ordinal order
async fn introspect_foreign_keys(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let query = "SELECT
                    kcu.constraint_name,
                    kcu.column_name,
                    kcu.referenced_table_name,
                    kcu.referenced_column_name
                 FROM information_schema.key_column_usage kcu
                 WHERE kcu.table_schema = ?
                 AND kcu.table_name = ?
                 AND kcu.referenced_table_name IS NOT NULL
                 ORDER BY kcu.constraint_name, kcu.ordinal_position";

    let rows: Vec<(String, String, String, String)> =
        conn.exec(query, (schema, table_name)).await.map_err(|e| {
            AskError::connection_failed(format!(
                "Failed to query foreign keys for {schema}.{table_name}: {e}"
            ))
        })?;

    let mut foreign_keys: Vec<(String, ForeignKeyInfo)> = Vec::new();
    for (constraint, column, referenced_table, referenced_column) in rows {
        match foreign_keys.last_mut() {
            Some((name, fk)) if *name == constraint => {
                fk.columns.push(column);
                fk.referenced_columns.push(referenced_column);
            }
            _ => foreign_keys.push((
                constraint,
                ForeignKeyInfo {
                    columns: vec![column],
                    referenced_table,
                    referenced_columns: vec![referenced_column],
                },
            )),
        }
    }

    Ok(foreign_keys.into_iter().map(|(_, fk)| fk).collect())
}

/// Run one statement and read its first result set, up to `max_rows` rows
///
/// Rows past the limit are discarded by `drop_result` without being decoded.
async fn run_statement(
    conn: &mut Conn,
    sql: &str,
    max_rows: Option<usize>,
) -> Result<QueryResult> {
    let mut result = conn
        .query_iter(sql)
        .await
        .map_err(|e| AskError::execution_failed(e.to_string()))?;

    let column_meta: Vec<(String, ColumnType)> = result
        .columns_ref()
        .iter()
        .map(|col| (col.name_str().to_string(), col.column_type()))
        .collect();

    let limit = max_rows.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    while rows.len() < limit {
        let next: Option<MyRow> =
            result.next().await.map_err(|e| AskError::execution_failed(e.to_string()))?;
        let Some(row) = next else {
            break;
        };
        rows.push(row_to_json(&row, &column_meta));
    }
    let rows_affected = result.affected_rows();

    result.drop_result().await.map_err(|e| AskError::execution_failed(e.to_string()))?;

    if column_meta.is_empty() {
        return Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        });
    }

    Ok(QueryResult {
        columns: column_meta.into_iter().map(|(name, _)| name).collect(),
        rows,
        rows_affected: None,
    })
}

/// Convert a MySQL row to a JSON-safe map
fn row_to_json(row: &MyRow, column_meta: &[(String, ColumnType)]) -> Row {
    column_meta
        .iter()
        .enumerate()
        .map(|(idx, (name, column_type))| {
            let value = row.as_ref(idx).map_or(serde_json::Value::Null, |v| {
                value_to_json(v, *column_type)
            });
            (name.clone(), value)
        })
        .collect()
}

/// Convert a MySQL value to JSON
///
/// The text protocol delivers every value as bytes; numeric columns are parsed back
/// into JSON numbers. DECIMAL stays a string to keep its precision.
fn value_to_json(value: &Value, column_type: ColumnType) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => {
            let Ok(text) = std::str::from_utf8(bytes) else {
                use base64::Engine;
                return serde_json::Value::String(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                );
            };

            match column_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_YEAR => text
                    .parse::<i64>()
                    .map(serde_json::Value::from)
                    .or_else(|_| text.parse::<u64>().map(serde_json::Value::from))
                    .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map_or_else(
                        || serde_json::Value::String(text.to_string()),
                        serde_json::Value::Number,
                    ),
                _ => serde_json::Value::String(text.to_string()),
            }
        }

        Value::Int(i) => serde_json::Value::from(*i),

        Value::UInt(u) => serde_json::Value::from(*u),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),

        Value::Time(is_negative, days, hours, minutes, seconds, microseconds) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{microseconds:06}"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use crate::engine::ConnectRequest;
    use serde_json::json;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Customer"), "`Customer`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_text_protocol_integers_become_numbers() {
        let value = Value::Bytes(b"59".to_vec());
        assert_eq!(value_to_json(&value, ColumnType::MYSQL_TYPE_LONGLONG), json!(59));

        let value = Value::Bytes(b"18446744073709551615".to_vec());
        assert_eq!(
            value_to_json(&value, ColumnType::MYSQL_TYPE_LONGLONG),
            json!(18_446_744_073_709_551_615_u64)
        );
    }

    #[test]
    fn test_text_protocol_doubles_and_decimals() {
        let value = Value::Bytes(b"0.99".to_vec());
        assert_eq!(value_to_json(&value, ColumnType::MYSQL_TYPE_DOUBLE), json!(0.99));
        assert_eq!(value_to_json(&value, ColumnType::MYSQL_TYPE_NEWDECIMAL), json!("0.99"));
    }

    #[test]
    fn test_strings_and_nulls() {
        let value = Value::Bytes(b"France".to_vec());
        assert_eq!(value_to_json(&value, ColumnType::MYSQL_TYPE_VAR_STRING), json!("France"));
        assert_eq!(value_to_json(&Value::NULL, ColumnType::MYSQL_TYPE_LONG), json!(null));
    }

    #[test]
    fn test_binary_bytes_are_base64() {
        let value = Value::Bytes(vec![0xff, 0xfe, 0x00]);
        assert_eq!(value_to_json(&value, ColumnType::MYSQL_TYPE_BLOB), json!("//4A"));
    }

    #[test]
    fn test_binary_protocol_temporal_values() {
        let date = Value::Date(2024, 3, 9, 14, 5, 0, 0);
        assert_eq!(
            value_to_json(&date, ColumnType::MYSQL_TYPE_DATETIME),
            json!("2024-03-09T14:05:00.000000")
        );

        let time = Value::Time(true, 1, 2, 3, 4, 5);
        assert_eq!(value_to_json(&time, ColumnType::MYSQL_TYPE_TIME), json!("-26:03:04.000005"));
    }

    // Requires a running MySQL instance:
    // ASKDB_TEST_MYSQL_HOST=localhost ASKDB_TEST_MYSQL_PASSWORD=... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_open_introspect_close() {
        let request = ConnectRequest {
            host: std::env::var("ASKDB_TEST_MYSQL_HOST").ok(),
            user: Some("root".to_string()),
            password: std::env::var("ASKDB_TEST_MYSQL_PASSWORD").ok(),
            database: Some("Chinook".to_string()),
            ..ConnectRequest::default()
        };
        let profile = ConnectionProfile::from_request(&request, &TlsConfig::default()).unwrap();

        let session = MySqlSession::open(&profile).await.unwrap();
        let schema = session.introspect().await.unwrap();
        assert!(schema.tables.iter().any(|t| t.name == "Customer"));

        let result = session
            .execute("SELECT COUNT(*) AS n FROM Customer", &ExecutionPolicy::default())
            .await
            .unwrap();
        assert!(result.rows[0]["n"].is_number());

        let policy = ExecutionPolicy { max_rows: Some(2), ..ExecutionPolicy::default() };
        let result = session.execute("SELECT CustomerId FROM Customer", &policy).await.unwrap();
        assert_eq!(result.rows.len(), 2);

        // The unread rows were drained, so the session is usable again
        let result = session
            .execute("SELECT 1 AS one", &ExecutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(result.rows[0]["one"], json!(1));

        session.close().await.unwrap();
    }
}
