//! askdb - Ask natural-language questions of a live SQL database
//!
//! A question is turned into one SQL statement by a language model, the statement is
//! run against the single active connection, and the rows are turned back into a
//! natural-language answer by a second model call.
//!
//! # Architecture
//! The HTTP server, the MCP server and the CLI are thin wrappers around the same
//! [`Pipeline`] and [`ConnectionManager`].
//!
//! # Module Organization
//! - [`error`] - Error types and codes
//! - [`config`] - Configuration loading
//! - [`engine`] - Database connector and session traits, `MySQL` and `SQLite` engines
//! - [`schema`] - Schema description rendering
//! - [`connection`] - The single active connection
//! - [`prompt`] - Instruction templates
//! - [`extract`] - SQL extraction from model output
//! - [`capability`] - Statement policy
//! - [`llm`] - Text generation client
//! - [`pipeline`] - Question-to-answer orchestration
//! - [`output`] - JSON output types
//! - [`server`] - HTTP surface
//! - [`mcp`] - MCP stdio surface

pub mod capability;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod server;

pub use capability::{validate_statement, ExecutionPolicy};
pub use config::{load_with_precedence, AppConfig, LlmConfig, StoredConnection, TlsConfig};
pub use connection::{ConnectionLease, ConnectionManager, ConnectionStatus};
pub use engine::{
    ColumnInfo, ConnectRequest, ConnectionProfile, Connector, DatabaseType, EngineConnector,
    EngineSession, ForeignKeyInfo, QueryResult, Row, SchemaInfo, Session, TableInfo,
};
pub use error::{AskError, Result};
pub use extract::{extract_sql, GeneratedQuery};
pub use llm::{ChatCompletionsClient, LlmError, TextGenerator};
pub use output::{ErrorBody, ErrorEnvelope, ErrorInfo, MessageResponse, Metadata, SuccessEnvelope};
pub use pipeline::{AnswerRecord, Pipeline, Stage};
pub use prompt::PromptTemplate;
pub use schema::SchemaDescription;

/// Pipeline over the compiled-in engines and the chat-completions client
pub type AppPipeline = Pipeline<EngineConnector, ChatCompletionsClient>;
