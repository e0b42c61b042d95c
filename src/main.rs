//! askdb CLI Entry Point
//!
//! Subcommands:
//! - `serve` - HTTP server over one shared connection
//! - `mcp` - MCP server on stdio
//! - `ask` - One-shot connect, ask and disconnect
//! - `status` - Connection status of a running HTTP server
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use askdb::mcp::McpServer;
use askdb::{
    load_with_precedence, AppConfig, AppPipeline, AskError, ChatCompletionsClient, ConnectRequest,
    ConnectionManager, ConnectionStatus, DatabaseType, EngineConnector, ErrorEnvelope, Metadata,
    Pipeline, SuccessEnvelope,
};

/// askdb - Ask natural-language questions of a live SQL database
#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask natural-language questions of a live SQL database")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to .askdb/config.json, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Start the MCP server on stdio
    Mcp,

    /// Connect, answer one question and disconnect
    Ask {
        /// The question to answer
        #[arg(long, short)]
        question: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Show the connection status of a running server
    Status {
        /// Server base URL (defaults to http://<server.bind>)
        #[arg(long)]
        url: Option<String>,
    },
}

/// Connection parameters for one-shot commands
///
/// When neither `--host` nor `--file` is given, `startup_connection` from the
/// configuration is used.
#[derive(clap::Args)]
struct ConnectionArgs {
    /// Database engine
    #[arg(long, value_parser = parse_engine)]
    engine: Option<DatabaseType>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    database: Option<String>,

    /// Database file (sqlite)
    #[arg(long, conflicts_with = "host")]
    file: Option<PathBuf>,
}

fn parse_engine(value: &str) -> Result<DatabaseType, String> {
    match value.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" | "tidb" => Ok(DatabaseType::MySQL),
        "sqlite" => Ok(DatabaseType::SQLite),
        other => Err(format!("unsupported engine '{other}' (expected mysql or sqlite)")),
    }
}

impl ConnectionArgs {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.file.is_none()
    }

    fn into_request(self) -> anyhow::Result<ConnectRequest> {
        let engine = match (self.engine, &self.file) {
            (Some(engine), _) => engine,
            (None, Some(_)) => DatabaseType::SQLite,
            (None, None) => DatabaseType::MySQL,
        };

        let password = match (engine, self.password) {
            (DatabaseType::MySQL, None) => Some(
                dialoguer::Password::new()
                    .with_prompt("Database password")
                    .interact()
                    .context("Failed to read password")?,
            ),
            (_, password) => password,
        };

        Ok(ConnectRequest {
            engine: Some(engine),
            host: self.host,
            port: self.port,
            user: self.user,
            password,
            database: self.database,
            file: self.file,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    askdb::logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let err = e
                .downcast_ref::<AskError>()
                .cloned()
                .unwrap_or_else(|| AskError::config_error(format!("{e:#}")));
            tracing::error!(code = err.error_code(), "{}", err.message());
            print_json(&ErrorEnvelope::from_error("askdb", &err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_with_precedence(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            let pipeline = build_pipeline(&config)?;
            connect_at_startup(&pipeline, &config).await;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            askdb::server::serve(pipeline, &bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mcp => {
            let pipeline = build_pipeline(&config)?;
            connect_at_startup(&pipeline, &config).await;
            McpServer::new(pipeline).serve().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ask { question, connection } => ask_once(&config, &question, connection).await,
        Commands::Status { url } => {
            let base = url.unwrap_or_else(|| format!("http://{}", config.server.bind));
            let status = fetch_status(&base).await?;
            print_json(&SuccessEnvelope::new("status", status, Metadata::new(0)));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<Arc<AppPipeline>> {
    let generator = ChatCompletionsClient::from_config(&config.llm)?;
    tracing::debug!(model = generator.model(), "text generator configured");

    let manager = Arc::new(ConnectionManager::new(
        EngineConnector,
        config.tls.clone(),
        config.schema.sample_rows,
    ));
    Ok(Arc::new(Pipeline::new(manager, generator, config.execution.clone())))
}

/// Connect the configured startup profile, if any; failures are logged, not fatal
async fn connect_at_startup(pipeline: &AppPipeline, config: &AppConfig) {
    let Some(stored) = &config.startup_connection else {
        return;
    };

    let result = match stored.resolve() {
        Ok(request) => pipeline.connections().connect(&request).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::warn!(
            code = e.error_code(),
            error = %e,
            "startup connection failed, continuing without a connection"
        );
    }
}

async fn ask_once(
    config: &AppConfig,
    question: &str,
    connection: ConnectionArgs,
) -> anyhow::Result<ExitCode> {
    let request = if connection.is_empty() {
        config
            .startup_connection
            .as_ref()
            .ok_or_else(|| {
                AskError::client_input(
                    "No connection given: pass --host or --file, or configure startup_connection",
                )
            })?
            .resolve()?
    } else {
        connection.into_request()?
    };

    let pipeline = build_pipeline(config)?;
    pipeline.connections().connect(&request).await?;

    let started = Instant::now();
    let outcome = pipeline.ask(question).await;
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Err(e) = pipeline.connections().disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }

    match outcome {
        Ok(record) => {
            let rows = record.sql_result.len();
            print_json(&SuccessEnvelope::new("ask", record, Metadata::with_rows(elapsed, rows)));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&ErrorEnvelope::from_error("ask", &e));
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn fetch_status(base: &str) -> anyhow::Result<ConnectionStatus> {
    let url = format!("{}/status", base.trim_end_matches('/'));
    let response = reqwest::get(&url).await.with_context(|| format!("Failed to reach {url}"))?;
    let status = response
        .error_for_status()
        .with_context(|| format!("Server at {url} returned an error"))?
        .json()
        .await
        .context("Invalid status response")?;
    Ok(status)
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}
