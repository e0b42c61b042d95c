//! HTTP Server
//!
//! Routes:
//! - `POST /connect` `{host, port?, user, password, database, engine?, file?}` → `{message}`
//! - `POST /disconnect` → `{message}`
//! - `POST /ask` `{question}` → `{answer, sql, sql_result}`
//! - `GET /status` → connection status
//!
//! Every failure is answered with `{error, code}` and the status from `AskError::http_status`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::connection::ConnectionStatus;
use crate::engine::{ConnectRequest, Connector};
use crate::error::AskError;
use crate::llm::TextGenerator;
use crate::output::{ErrorBody, MessageResponse};
use crate::pipeline::{AnswerRecord, Pipeline};

/// Body of `POST /ask`
#[derive(Debug, Default, Deserialize)]
pub struct AskBody {
    #[serde(default)]
    pub question: Option<String>,
}

/// `AskError` rendered as an HTTP response
pub struct ApiError(AskError);

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AskError::client_input(format!("Invalid request body: {}", rejection.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router over a shared pipeline
pub fn router<C, G>(pipeline: Arc<Pipeline<C, G>>) -> Router
where
    C: Connector + 'static,
    G: TextGenerator + 'static,
{
    Router::new()
        .route("/connect", post(connect::<C, G>))
        .route("/disconnect", post(disconnect::<C, G>))
        .route("/ask", post(ask::<C, G>))
        .route("/status", get(status::<C, G>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// Bind and serve until Ctrl-C
pub async fn serve<C, G>(pipeline: Arc<Pipeline<C, G>>, bind: &str) -> anyhow::Result<()>
where
    C: Connector + 'static,
    G: TextGenerator + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn connect<C: Connector, G: TextGenerator>(
    State(pipeline): State<Arc<Pipeline<C, G>>>,
    payload: std::result::Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let message = pipeline.connections().connect(&request).await?;
    Ok(Json(MessageResponse::new(message)))
}

async fn disconnect<C: Connector, G: TextGenerator>(
    State(pipeline): State<Arc<Pipeline<C, G>>>,
) -> ApiResult<MessageResponse> {
    let message = pipeline.connections().disconnect().await?;
    Ok(Json(MessageResponse::new(message)))
}

async fn ask<C: Connector, G: TextGenerator>(
    State(pipeline): State<Arc<Pipeline<C, G>>>,
    payload: std::result::Result<Json<AskBody>, JsonRejection>,
) -> ApiResult<AnswerRecord> {
    let Json(body) = payload?;
    let record = pipeline.ask(body.question.as_deref().unwrap_or_default()).await?;
    Ok(Json(record))
}

async fn status<C: Connector, G: TextGenerator>(
    State(pipeline): State<Arc<Pipeline<C, G>>>,
) -> Json<ConnectionStatus> {
    Json(pipeline.connections().status().await)
}
