//! Connection Manager
//!
//! Owns the single active database session together with its profile and schema
//! description. All three live in one `Option` behind a `tokio::sync::RwLock`, so
//! they are always set and cleared together.
//!
//! # Locking
//! - `connect` opens and introspects the new session before taking any lock, then
//!   swaps it in under the write lock.
//! - `lease` hands out a read guard. A pipeline run holds it until its statement has
//!   executed, so a concurrent connect or disconnect waits for in-flight statements.

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::config::TlsConfig;
use crate::engine::{ConnectRequest, ConnectionProfile, Connector, DatabaseType, Session};
use crate::error::{AskError, Result};
use crate::schema::{self, SchemaDescription};

/// A connected session with the profile it was opened for and its schema description
pub struct ActiveConnection<S> {
    profile: ConnectionProfile,
    session: S,
    schema: SchemaDescription,
    tables: usize,
}

/// Read access to the active connection
///
/// While any lease is alive, connect and disconnect block.
pub struct ConnectionLease<'a, S> {
    guard: RwLockReadGuard<'a, ActiveConnection<S>>,
}

impl<S> ConnectionLease<'_, S> {
    #[must_use]
    pub fn session(&self) -> &S {
        &self.guard.session
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaDescription {
        &self.guard.schema
    }

    #[must_use]
    pub fn profile(&self) -> &ConnectionProfile {
        &self.guard.profile
    }
}

/// Snapshot of the connection state, safe for client output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<DatabaseType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Whether the session is TLS-verified
    pub tls: bool,

    /// Number of tables in the schema description
    pub tables: usize,
}

/// Single-slot connection manager
pub struct ConnectionManager<C: Connector> {
    connector: C,
    tls: TlsConfig,
    sample_rows: usize,
    active: RwLock<Option<ActiveConnection<C::Session>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, tls: TlsConfig, sample_rows: usize) -> Self {
        Self { connector, tls, sample_rows, active: RwLock::new(None) }
    }

    /// Connect to the database described by `request`, replacing any active connection
    ///
    /// On any failure the previously active connection stays in place.
    pub async fn connect(&self, request: &ConnectRequest) -> Result<String> {
        let profile = ConnectionProfile::from_request(request, &self.tls)?;

        tracing::info!(
            engine = %profile.engine,
            host = %profile.host,
            port = profile.port,
            database = %profile.database,
            tls = profile.tls_required,
            "connecting"
        );

        let session = match self.connector.open(&profile).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(database = %profile.database, error = %e, "connect failed");
                return Err(into_connection_error(e));
            }
        };

        let (schema, tables) = match schema::describe(&session, self.sample_rows).await {
            Ok(described) => described,
            Err(e) => {
                tracing::warn!(
                    database = %profile.database,
                    error = %e,
                    "schema introspection failed"
                );
                if let Err(close_err) = session.close().await {
                    tracing::warn!(error = %close_err, "failed to close half-opened session");
                }
                return Err(into_connection_error(e));
            }
        };

        let message = format!("Connected to database '{}' successfully", profile.database);
        let database = profile.database.clone();

        let mut slot = self.active.write().await;
        let previous = slot.replace(ActiveConnection { profile, session, schema, tables });
        if let Some(previous) = previous {
            close_session(previous).await;
        }
        drop(slot);

        tracing::info!(database = %database, tables, "connected");
        Ok(message)
    }

    /// Close the active connection
    pub async fn disconnect(&self) -> Result<String> {
        let mut slot = self.active.write().await;
        let previous = slot.take().ok_or(AskError::NoActiveConnection)?;

        let message = format!("Disconnected from database '{}'", previous.profile.database);
        close_session(previous).await;
        drop(slot);

        tracing::info!("{message}");
        Ok(message)
    }

    pub async fn status(&self) -> ConnectionStatus {
        let slot = self.active.read().await;
        slot.as_ref().map_or_else(ConnectionStatus::default, |active| ConnectionStatus {
            connected: true,
            engine: Some(active.profile.engine),
            host: Some(active.profile.host.clone()).filter(|h| !h.is_empty()),
            port: Some(active.profile.port).filter(|p| *p != 0),
            database: Some(active.profile.database.clone()),
            tls: active.profile.tls_required,
            tables: active.tables,
        })
    }

    /// Take a read lease on the active connection
    pub async fn lease(&self) -> Result<ConnectionLease<'_, C::Session>> {
        let slot = self.active.read().await;
        RwLockReadGuard::try_map(slot, Option::as_ref)
            .map(|guard| ConnectionLease { guard })
            .map_err(|_| AskError::NoActiveConnection)
    }
}

async fn close_session<S: Session>(active: ActiveConnection<S>) {
    let database = active.profile.database;
    if let Err(e) = active.session.close().await {
        tracing::warn!(database = %database, error = %e, "failed to close previous session");
    }
}

fn into_connection_error(err: AskError) -> AskError {
    match err {
        AskError::ConnectionFailed(_) => err,
        other => AskError::connection_failed(other.message()),
    }
}
