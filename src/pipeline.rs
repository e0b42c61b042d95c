//! Pipeline Orchestrator
//!
//! Runs one question through the stages, strictly in order:
//! `AwaitingConnection → Generating → Extracting → Executing → Synthesizing → Done`.
//! The first failing stage ends the run; nothing is retried.
//!
//! The connection lease is taken before generation and released as soon as the
//! statement has executed, so a reconnect never waits on answer synthesis.

use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

use crate::capability::{validate_statement, ExecutionPolicy};
use crate::connection::ConnectionManager;
use crate::engine::{Connector, QueryResult, Row, Session};
use crate::error::{AskError, Result};
use crate::extract::GeneratedQuery;
use crate::llm::TextGenerator;
use crate::prompt::{PromptTemplate, ANSWER_SYNTHESIS, SQL_GENERATION, SQL_STOP_SEQUENCE};

/// Pipeline stage, recorded in tracing on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingConnection,
    Generating,
    Extracting,
    Executing,
    Synthesizing,
    Done,
    Errored,
}

impl Stage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingConnection => "awaiting_connection",
            Self::Generating => "generating",
            Self::Extracting => "extracting",
            Self::Executing => "executing",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRecord {
    pub answer: String,

    /// The statement that was executed
    pub sql: String,

    pub sql_result: Vec<Row>,
}

/// Question-to-answer pipeline over a shared connection manager
pub struct Pipeline<C: Connector, G: TextGenerator> {
    connections: Arc<ConnectionManager<C>>,
    generator: G,
    policy: ExecutionPolicy,
}

impl<C: Connector, G: TextGenerator> Pipeline<C, G> {
    pub fn new(
        connections: Arc<ConnectionManager<C>>,
        generator: G,
        policy: ExecutionPolicy,
    ) -> Self {
        Self { connections, generator, policy }
    }

    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager<C>> {
        &self.connections
    }

    /// Answer a natural-language question against the active connection
    pub async fn ask(&self, question: &str) -> Result<AnswerRecord> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::client_input("No question provided"));
        }

        let span = tracing::info_span!("ask", question_len = question.len());
        async {
            let mut stage = Stage::AwaitingConnection;
            let result = self.run(question, &mut stage).await;

            match &result {
                Ok(record) => {
                    advance(&mut stage, Stage::Done);
                    tracing::info!(sql = %record.sql, rows = record.sql_result.len(), "answered");
                }
                Err(e) => {
                    tracing::warn!(
                        stage = stage.as_str(),
                        code = e.error_code(),
                        error = %e,
                        "ask failed"
                    );
                    advance(&mut stage, Stage::Errored);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, question: &str, stage: &mut Stage) -> Result<AnswerRecord> {
        let lease = self.connections.lease().await?;
        let engine = lease.profile().engine;
        let schema = lease.schema().clone();

        advance(stage, Stage::Generating);
        let raw = self
            .run_chain(
                &SQL_GENERATION,
                &[("schema", schema.as_str()), ("question", question)],
                &[SQL_STOP_SEQUENCE],
                AskError::GenerationFailed,
            )
            .await?;

        advance(stage, Stage::Extracting);
        let generated = GeneratedQuery::from_raw(raw);
        tracing::debug!(sql = %generated.statement, "extracted statement");
        validate_statement(&generated.statement, &self.policy, engine)?;

        advance(stage, Stage::Executing);
        let result = lease.session().execute(&generated.statement, &self.policy).await?;
        drop(lease);

        advance(stage, Stage::Synthesizing);
        let response = render_response(&result)?;
        let answer = self
            .run_chain(
                &ANSWER_SYNTHESIS,
                &[
                    ("schema", schema.as_str()),
                    ("question", question),
                    ("query", generated.statement.as_str()),
                    ("response", response.as_str()),
                ],
                &[],
                AskError::SynthesisFailed,
            )
            .await?;

        Ok(AnswerRecord { answer, sql: generated.statement, sql_result: result.rows })
    }

    /// Render a template and send it to the text generator
    async fn run_chain(
        &self,
        template: &PromptTemplate,
        vars: &[(&str, &str)],
        stop: &[&str],
        on_failure: fn(String) -> AskError,
    ) -> Result<String> {
        let prompt = template.render(vars)?;
        self.generator
            .generate(&prompt, stop)
            .await
            .map_err(|e| on_failure(e.to_string()))
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = stage.as_str(), to = next.as_str(), "stage");
    *stage = next;
}

/// JSON text of the execution result as shown to the synthesis model
fn render_response(result: &QueryResult) -> Result<String> {
    let rendered = match result.rows_affected {
        Some(affected) if result.columns.is_empty() => {
            serde_json::to_string(&serde_json::json!({ "rows_affected": affected }))
        }
        _ => serde_json::to_string(&result.rows),
    };
    rendered.map_err(|e| AskError::synthesis_failed(format!("Failed to render result: {e}")))
}
