//! Memodi HTTP API
//!
//! Each endpoint is a thin axum handler around a pure inner function that
//! builds a `SimRequest`, runs it through the router and maps the response
//! to a status code. The inner functions are tested without axum dispatch.
//!
//! Endpoints:
//! - GET    /health  : liveness plus model/scoring status
//! - GET    /version  : server version info
//! - POST   /sessions  : create a session and generate its case
//! - GET    /sessions/:id  : session state and transcript
//! - DELETE /sessions/:id  : drop a session
//! - POST   /sessions/:id/messages  : relay one user turn
//! - POST   /sessions/:id/reset  : new patient: back to unconfigured
//! - POST   /sessions/:id/case  : generate a case on a reset session

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::protocol::{CaseRequest, ErrorKind, SimRequest, SimResponse};
use crate::state::AppState;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/:id/messages", post(message_handler))
        .route("/sessions/:id/reset", post(reset_handler))
        .route("/sessions/:id/case", post(start_case_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Memodi HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub case: CaseRequest,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MessageRequest {
    pub text: Option<String>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(SimRequest::Health, state).await;
    let (status, mut body) = response_to_http(response);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
    }
    (status, body)
}

/// Pure, no IO.
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "memodi/1",
    })
}

pub async fn create_session_inner(
    state: &AppState,
    req: CreateSessionRequest,
) -> (StatusCode, serde_json::Value) {
    let start = Instant::now();
    let request = SimRequest::CreateSession {
        case: req.case,
        api_key: req.api_key,
    };
    let (status, mut body) =
        response_to_http(crate::router::handle_request(request, state).await);

    if status == StatusCode::OK {
        if let Some(obj) = body.as_object_mut() {
            let took_ms = start.elapsed().as_millis() as u64;
            obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
        }
        return (StatusCode::CREATED, body);
    }
    (status, body)
}

pub async fn get_session_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(crate::router::handle_request(SimRequest::GetSession { id }, state).await)
}

pub async fn delete_session_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(crate::router::handle_request(SimRequest::DeleteSession { id }, state).await)
}

pub async fn message_inner(
    state: &AppState,
    id: Uuid,
    req: MessageRequest,
) -> (StatusCode, serde_json::Value) {
    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return error_body(ErrorKind::InvalidInput, "text field is required"),
    };

    let start = Instant::now();
    let (status, mut body) = response_to_http(
        crate::router::handle_request(SimRequest::SendMessage { id, text }, state).await,
    );
    if status == StatusCode::OK {
        if let Some(obj) = body.as_object_mut() {
            let took_ms = start.elapsed().as_millis() as u64;
            obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
        }
    }
    (status, body)
}

pub async fn reset_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(crate::router::handle_request(SimRequest::ResetSession { id }, state).await)
}

pub async fn start_case_inner(
    state: &AppState,
    id: Uuid,
    case: CaseRequest,
) -> (StatusCode, serde_json::Value) {
    response_to_http(crate::router::handle_request(SimRequest::StartCase { id, case }, state).await)
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let (status, body) = create_session_inner(&state, req).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&state, id).await;
    (status, Json(body))
}

pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = delete_session_inner(&state, id).await;
    (status, Json(body))
}

pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    let (status, body) = message_inner(&state, id, req).await;
    (status, Json(body))
}

pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = reset_inner(&state, id).await;
    (status, Json(body))
}

pub async fn start_case_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(case): Json<CaseRequest>,
) -> impl IntoResponse {
    let (status, body) = start_case_inner(&state, id, case).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::MissingCredential => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(kind: ErrorKind, msg: &str) -> (StatusCode, serde_json::Value) {
    (
        status_for(kind),
        serde_json::json!({
            "error": msg,
            "kind": kind,
            "status": "error",
        }),
    )
}

/// Convert a router `SimResponse` into a status code and JSON body.
pub fn response_to_http(response: SimResponse) -> (StatusCode, serde_json::Value) {
    if response.is_ok() {
        return (
            StatusCode::OK,
            response.data.unwrap_or(serde_json::json!({})),
        );
    }
    let kind = response.kind.unwrap_or(ErrorKind::Internal);
    let msg = response.error.unwrap_or_else(|| "unknown error".to_string());
    error_body(kind, &msg)
}

// ============================================================================
// Unit Tests: inner functions called directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use memodi_core::config::ModelConfig;
    use memodi_core::{MemodiConfig, ScoreLogger};

    fn offline_state() -> AppState {
        let config = MemodiConfig {
            model: ModelConfig {
                // Never reached: these tests fail before any model call.
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: Some("test-key".to_string()),
                ..ModelConfig::default()
            },
            ..MemodiConfig::default()
        };
        AppState::new(config, ScoreLogger::disabled())
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "memodi/1");
    }

    #[test]
    fn test_response_to_http_ok() {
        let resp = SimResponse::ok(serde_json::json!({"state": "active"}));
        let (status, body) = response_to_http(resp);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "active");
    }

    #[test]
    fn test_response_to_http_maps_kinds() {
        let cases = [
            (ErrorKind::InvalidInput, StatusCode::BAD_REQUEST),
            (ErrorKind::MissingCredential, StatusCode::UNAUTHORIZED),
            (ErrorKind::NotFound, StatusCode::NOT_FOUND),
            (ErrorKind::Conflict, StatusCode::CONFLICT),
            (ErrorKind::Upstream, StatusCode::BAD_GATEWAY),
        ];
        for (kind, expected) in cases {
            let (status, body) = response_to_http(SimResponse::err(kind, "boom"));
            assert_eq!(status, expected, "kind {:?}", kind);
            assert_eq!(body["error"], "boom");
            assert_eq!(body["status"], "error");
        }
    }

    #[test]
    fn test_response_to_http_error_no_message() {
        let mut resp = SimResponse::err(ErrorKind::Upstream, "x");
        resp.error = None;
        resp.kind = None;
        let (status, body) = response_to_http(resp);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unknown error");
    }

    #[tokio::test]
    async fn test_health_inner_reports_scoring_disabled() {
        let state = offline_state();
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["scoring"], "disabled");
        assert_eq!(body["sessions"], 0);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_create_session_without_topic_or_area_is_400() {
        let state = offline_state();
        let (status, body) = create_session_inner(&state, CreateSessionRequest::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
        assert!(state.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_message_inner_empty_text_is_400() {
        let state = offline_state();
        for text in [None, Some("".to_string()), Some("   ".to_string())] {
            let (status, body) =
                message_inner(&state, Uuid::new_v4(), MessageRequest { text }).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["status"], "error");
        }
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let state = offline_state();
        let id = Uuid::new_v4();

        let (status, _) = get_session_inner(&state, id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = reset_inner(&state, id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = delete_session_inner(&state, id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = message_inner(
            &state,
            id,
            MessageRequest {
                text: Some("hola".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }
}
