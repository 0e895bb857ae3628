//! HTTP surface
//!
//! ```text
//! POST /api/agents/:role/chat        chat turn, text/plain chunked reply
//! GET  /api/agents/:role/chat?id=    stored conversation as JSON
//! GET  /health                       liveness
//! GET  /metrics                      Prometheus text exposition
//! ```
//!
//! The inbound `Cookie` header becomes the request's [`AuthContext`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::metrics::{self, HTTP_REQUESTS};
use crate::runtime::{AgentRuntime, ChatRequest, RuntimeError, ValidationError};

/// Route of the chat endpoints
pub const CHAT_PATH: &str = "/api/agents/:role/chat";
/// Header carrying the run's trace id back to the caller
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Build the service router
pub fn create_router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route(CHAT_PATH, get(history).post(chat))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .with_state(runtime)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    id: Option<String>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    agents: Vec<String>,
}

fn auth_from(headers: &HeaderMap) -> Option<AuthContext> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(AuthContext::from_cookie_header)
}

fn record(route: &str, response: &Response) {
    HTTP_REQUESTS
        .with_label_values(&[route, response.status().as_str()])
        .inc();
}

/// Start a chat turn
///
/// The body is parsed by hand so malformed JSON is a 400 with the same error
/// shape as every other rejection.
async fn chat(
    State(runtime): State<Arc<AgentRuntime>>,
    Path(role): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let response = match serde_json::from_slice::<ChatRequest>(&body) {
        Err(e) => RuntimeError::from(ValidationError::Malformed(e.to_string())).into_response(),
        Ok(request) => match runtime.chat(&role, request, auth_from(&headers)).await {
            Ok(reply) => {
                let mut response = (
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    Body::from_stream(reply.stream),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&reply.trace_id) {
                    response.headers_mut().insert(TRACE_ID_HEADER, value);
                }
                response
            }
            Err(e) => e.into_response(),
        },
    };
    record("chat", &response);
    response
}

/// Stored conversation for `?id=`
async fn history(
    State(runtime): State<Arc<AgentRuntime>>,
    Path(role): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Response {
    let auth = auth_from(&headers);
    let response = match query.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        None => RuntimeError::from(ValidationError::MissingQueryId).into_response(),
        Some(id) => match runtime.history(&role, id, auth.as_ref()).await {
            Ok(history) => Json(history).into_response(),
            Err(e) => e.into_response(),
        },
    };
    record("history", &response);
    response
}

async fn health(State(runtime): State<Arc<AgentRuntime>>) -> impl IntoResponse {
    let mut agents: Vec<String> = runtime
        .profiles()
        .iter()
        .map(|profile| profile.role.clone())
        .collect();
    agents.sort();
    Json(Health {
        status: "ok",
        agents,
    })
}

async fn prometheus_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
