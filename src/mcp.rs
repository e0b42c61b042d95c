//! MCP (Model Context Protocol) Server
//!
//! Manual JSON-RPC 2.0 over stdio, one request per line.
//!
//! # MCP Tools
//!
//! - `connect` - Connect to a database, replacing any active connection
//! - `disconnect` - Close the active connection
//! - `ask` - Answer a natural-language question against the active connection
//! - `status` - Report the active connection
//!
//! Unlike a one-shot CLI call, the server keeps its connection between tool calls.
//! Tool failures are reported as tool results with `isError: true` carrying an
//! error envelope; JSON-RPC errors are reserved for protocol problems.
//!
//! # Usage
//!
//! Start the MCP server with: `askdb mcp`
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "askdb": {
//!       "command": "askdb",
//!       "args": ["mcp"]
//!     }
//!   }
//! }
//! ```

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::{ConnectRequest, Connector};
use crate::error::AskError;
use crate::llm::TextGenerator;
use crate::output::{ErrorEnvelope, Metadata, MessageResponse, SuccessEnvelope};
use crate::pipeline::Pipeline;

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(JsonRpcError { code, message }) }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    text: String,
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    fn from_json(data: &impl Serialize, is_error: bool) -> Result<Value> {
        let text = serde_json::to_string_pretty(data)?;
        let result = Self { content: vec![TextContent { content_type: "text", text }], is_error };
        Ok(serde_json::to_value(result)?)
    }
}

/// Arguments of the `ask` tool
#[derive(Debug, Deserialize, JsonSchema)]
struct AskArgs {
    /// Natural-language question about the connected database
    question: String,
}

/// Arguments of the `disconnect` and `status` tools
#[derive(Debug, Default, Deserialize, JsonSchema)]
struct NoArgs {}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server over a shared pipeline
pub struct McpServer<C: Connector, G: TextGenerator> {
    pipeline: Arc<Pipeline<C, G>>,
}

impl<C: Connector, G: TextGenerator> McpServer<C, G> {
    pub fn new(pipeline: Arc<Pipeline<C, G>>) -> Self {
        Self { pipeline }
    }

    /// Run the server loop until stdin closes
    ///
    /// Each request is a single line of JSON; each response is written as a single line.
    #[allow(clippy::future_not_send)]
    pub async fn serve(&self) -> Result<()> {
        let stdin = io::stdin();
        let reader = stdin.lock();
        let mut stdout = io::stdout();

        for line in reader.lines() {
            let line = line?;
            if let Some(response) = self.handle_line(&line).await? {
                writeln!(stdout, "{response}")?;
                stdout.flush()?;
            }
        }

        tracing::info!("stdin closed, MCP server exiting");
        Ok(())
    }

    /// Handle one line of input, returning the serialized response
    ///
    /// Blank lines and notifications (requests without an id) produce no response.
    pub async fn handle_line(&self, line: &str) -> Result<Option<String>> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) if request.id.is_none() => {
                tracing::debug!(method = %request.method, "ignoring notification");
                return Ok(None);
            }
            Ok(request) => self.handle_request(request).await,
            Err(e) => JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}")),
        };

        Ok(Some(serde_json::to_string(&response)?))
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => Ok(handle_initialize()),
            "tools/list" => handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            other => {
                return JsonRpcResponse::error(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("Unknown method: {other}"),
                )
            }
        };

        match result {
            Ok(value) => JsonRpcResponse::result(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, INVALID_PARAMS, e.to_string()),
        }
    }

    /// Route a tools/call request to the tool implementation
    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
        let arguments = match params.get("arguments") {
            Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
            Some(args) => args.clone(),
        };

        tracing::info!(tool = name, "tool call");
        let started = Instant::now();

        let outcome = match name {
            "connect" => {
                let request: ConnectRequest = parse_args(arguments)?;
                self.pipeline
                    .connections()
                    .connect(&request)
                    .await
                    .map(|message| (to_value(&MessageResponse::new(message)), None))
            }
            "disconnect" => self
                .pipeline
                .connections()
                .disconnect()
                .await
                .map(|message| (to_value(&MessageResponse::new(message)), None)),
            "ask" => {
                let args: AskArgs = parse_args(arguments)?;
                self.pipeline.ask(&args.question).await.map(|record| {
                    let rows = record.sql_result.len();
                    (to_value(&record), Some(rows))
                })
            }
            "status" => {
                let status = self.pipeline.connections().status().await;
                Ok((to_value(&status), None))
            }
            _ => return Err(anyhow!("Unknown tool: {name}")),
        };

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok((data, rows)) => {
                let meta = rows
                    .map_or_else(|| Metadata::new(elapsed), |r| Metadata::with_rows(elapsed, r));
                CallToolResult::from_json(&SuccessEnvelope::new(name, data?, meta), false)
            }
            Err(e) => CallToolResult::from_json(&ErrorEnvelope::from_error(name, &e), true),
        }
    }
}

fn to_value(data: &impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(data)?)
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| anyhow!(AskError::client_input(format!("Invalid tool arguments: {e}"))))
}

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

fn handle_initialize() -> Value {
    serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "askdb",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn input_schema<T: JsonSchema>() -> Result<Value> {
    Ok(serde_json::to_value(schemars::schema_for!(T))?)
}

/// Returns the list of available MCP tools with their schemas
fn handle_list_tools() -> Result<Value> {
    Ok(serde_json::json!({
        "tools": [
            {
                "name": "connect",
                "description": "Connect to a database. Replaces the active connection only if the new one succeeds. MySQL needs host, user, password and database (port defaults to 3306); SQLite needs engine='sqlite' and file. Never invent credentials: ask the user for them. The schema is read once on connect and used for every later 'ask'.",
                "inputSchema": input_schema::<ConnectRequest>()?
            },
            {
                "name": "disconnect",
                "description": "Close the active database connection.",
                "inputSchema": input_schema::<NoArgs>()?
            },
            {
                "name": "ask",
                "description": "Answer a natural-language question about the connected database. Generates one SQL statement, runs it and returns {answer, sql, sql_result}. Only read-only statements run unless the server is configured otherwise. Possible error codes: NO_ACTIVE_CONNECTION, GENERATION_FAILED, CAPABILITY_VIOLATION, EXECUTION_FAILED, SYNTHESIS_FAILED.",
                "inputSchema": input_schema::<AskArgs>()?
            },
            {
                "name": "status",
                "description": "Report whether a database is connected, and which one.",
                "inputSchema": input_schema::<NoArgs>()?
            }
        ]
    }))
}
