//! Database Engine Traits and Core Types
//!
//! This module defines the core abstractions for database engines.
//! Each engine (`MySQL`, `SQLite`) provides a `Connector` that opens a long-lived `Session`.
//!
//! # Stateful Design
//! A `Session` is an open handle owned by the connection manager. It is created by
//! `Connector::open`, used by any number of pipeline runs, and released exactly once
//! through `Session::close`.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! No shared SQL helpers or cross-engine abstractions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;

use crate::capability::ExecutionPolicy;
use crate::config::TlsConfig;
use crate::error::{AskError, Result};

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Default `MySQL` port used when a connect request omits one
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Supported database engine types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `MySQL` database (includes `MariaDB` and `TiDB`)
    #[default]
    MySQL,
    /// `SQLite` database file
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inbound connect request, as delivered by the HTTP, MCP and CLI surfaces
///
/// Every field is optional at the wire level so that validation can report all
/// missing fields at once instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConnectRequest {
    /// Database engine (defaults to mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<DatabaseType>,

    /// Hostname (mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port (mysql, defaults to 3306)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (sqlite)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Validated connection profile
///
/// Built once from a `ConnectRequest`, immutable afterwards, replaced wholesale on the
/// next connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProfile {
    pub engine: DatabaseType,
    pub host: String,
    pub port: u16,
    pub user: String,

    /// WARNING: Sensitive data, never serialized or logged
    #[serde(skip)]
    pub password: String,

    pub database: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Whether the session must be TLS-verified
    pub tls_required: bool,

    /// Trust anchor for verified TLS sessions (None means built-in roots)
    #[serde(skip)]
    pub ca_cert: Option<PathBuf>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl ConnectionProfile {
    /// Validate a connect request and apply the managed-provider TLS policy
    ///
    /// Fails with `ClientInput` naming every missing field.
    pub fn from_request(request: &ConnectRequest, tls: &TlsConfig) -> Result<Self> {
        let engine = request.engine.unwrap_or_default();

        match engine {
            DatabaseType::MySQL => {
                let host = non_empty(request.host.as_ref());
                let user = non_empty(request.user.as_ref());
                // Passwords are not trimmed, only checked for emptiness
                let password = request.password.clone().filter(|p| !p.is_empty());
                let database = non_empty(request.database.as_ref());

                let missing: Vec<&str> = [
                    ("host", host.is_none()),
                    ("user", user.is_none()),
                    ("password", password.is_none()),
                    ("database", database.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();

                let (Some(host), Some(user), Some(password), Some(database)) =
                    (host, user, password, database)
                else {
                    return Err(AskError::client_input(format!(
                        "Missing required connection fields: {}",
                        missing.join(", ")
                    )));
                };

                let managed = tls.is_managed_host(&host);
                let port = if managed {
                    tls.managed_port
                } else {
                    request.port.unwrap_or(DEFAULT_MYSQL_PORT)
                };

                Ok(Self {
                    engine,
                    host,
                    port,
                    user,
                    password,
                    database,
                    file: None,
                    tls_required: managed,
                    ca_cert: if managed { tls.ca_cert.clone() } else { None },
                })
            }
            DatabaseType::SQLite => {
                let file = request
                    .file
                    .clone()
                    .filter(|f| !f.as_os_str().is_empty())
                    .ok_or_else(|| {
                        AskError::client_input("Missing required connection fields: file")
                    })?;

                let database = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("sqlite")
                    .to_string();

                Ok(Self {
                    engine,
                    host: String::new(),
                    port: 0,
                    user: String::new(),
                    password: String::new(),
                    database,
                    file: Some(file),
                    tls_required: false,
                    ca_cert: None,
                })
            }
        }
    }
}

/// Schema introspection result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub tables: Vec<TableInfo>,
}

/// Table information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,

    pub columns: Vec<ColumnInfo>,

    /// Primary key columns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Column information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Column data type (engine-specific)
    pub data_type: String,

    pub nullable: bool,
}

/// Foreign key information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Column names in this table
    pub columns: Vec<String>,

    pub referenced_table: String,

    pub referenced_columns: Vec<String>,
}

/// A result row: column name to JSON-safe value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Query execution result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,

    /// Result rows (each row is a map of column name to value)
    pub rows: Vec<Row>,

    /// Number of rows affected (for statements that do not return rows)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

/// Opens sessions for validated profiles
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open an authenticated session for the profile
    ///
    /// Errors are reported as `ConnectionFailed` with the driver message.
    fn open(
        &self,
        profile: &ConnectionProfile,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An open database session
pub trait Session: Send + Sync + 'static {
    /// Introspect tables, columns and keys of the connected database
    fn introspect(&self) -> impl Future<Output = Result<SchemaInfo>> + Send;

    /// Fetch up to `limit` rows from a table for schema context
    fn sample_rows(
        &self,
        table: &str,
        limit: usize,
    ) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Execute a statement verbatim
    ///
    /// Statement policy is applied by the caller; the engine only enforces
    /// `max_rows` and `timeout_ms`.
    fn execute(
        &self,
        sql: &str,
        policy: &ExecutionPolicy,
    ) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Release the session
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Session for whichever engine the profile names
pub enum EngineSession {
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlSession),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteSession),
}

/// Connector that dispatches on `ConnectionProfile::engine`
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConnector;

impl Connector for EngineConnector {
    type Session = EngineSession;

    async fn open(&self, profile: &ConnectionProfile) -> Result<EngineSession> {
        match profile.engine {
            #[cfg(feature = "mysql")]
            DatabaseType::MySQL => {
                Ok(EngineSession::MySql(mysql::MySqlSession::open(profile).await?))
            }
            #[cfg(feature = "sqlite")]
            DatabaseType::SQLite => {
                Ok(EngineSession::Sqlite(sqlite::SqliteSession::open(profile)?))
            }
            #[allow(unreachable_patterns)]
            other => Err(AskError::connection_failed(format!(
                "Engine '{other}' is not enabled in this build"
            ))),
        }
    }
}

impl Session for EngineSession {
    async fn introspect(&self) -> Result<SchemaInfo> {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(s) => s.introspect().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.introspect().await,
        }
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(s) => s.sample_rows(table, limit).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.sample_rows(table, limit).await,
        }
    }

    async fn execute(&self, sql: &str, policy: &ExecutionPolicy) -> Result<QueryResult> {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(s) => s.execute(sql, policy).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.execute(sql, policy).await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(s) => s.close().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.close().await,
        }
    }
}
