//! HTTP surface tests over a real SQLite database

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use askdb::ExecutionPolicy;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{create_store_db, pipeline, FakeModel};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_connect_and_ask_over_http() {
    let db = create_store_db();
    let model = Arc::new(FakeModel::replying(
        "SELECT Country, COUNT(*) AS customers FROM Customer \
         GROUP BY Country ORDER BY customers DESC, Country LIMIT 1",
    ));
    let app = askdb::server::router(Arc::new(pipeline(model, ExecutionPolicy::default())));

    let (status, body) = post(&app, "/connect", json!({"engine": "sqlite", "file": db})).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) =
        post(&app, "/ask", json!({"question": "Which country has the most customers?"})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sql_result"], json!([{"Country": "France", "customers": 2}]));
    assert_eq!(body["answer"], r#"The result is [{"Country":"France","customers":2}]."#);
}

#[tokio::test]
async fn test_connect_to_missing_file() {
    let model = Arc::new(FakeModel::replying("SELECT 1"));
    let app = askdb::server::router(Arc::new(pipeline(model, ExecutionPolicy::default())));

    let missing = std::env::temp_dir().join("askdb_http_missing.db");
    let (status, body) = post(&app, "/connect", json!({"engine": "sqlite", "file": missing})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "CONNECTION_FAILED");
}

#[tokio::test]
async fn test_sqlite_connect_without_file() {
    let model = Arc::new(FakeModel::replying("SELECT 1"));
    let app = askdb::server::router(Arc::new(pipeline(model, ExecutionPolicy::default())));

    let (status, body) = post(&app, "/connect", json!({"engine": "sqlite"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "Missing required connection fields: file", "code": "CLIENT_INPUT"})
    );
}
