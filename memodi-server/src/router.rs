use crate::protocol::{SimRequest, SimResponse};
use crate::state::AppState;
use crate::subsystems::{case, relay, SimError};
use serde::Serialize;

/// Dispatch one request against the shared state.
pub async fn handle_request(request: SimRequest, state: &AppState) -> SimResponse {
    match request {
        SimRequest::Health => SimResponse::ok(health_data(state).await),
        SimRequest::CreateSession { case, api_key } => {
            respond(case::create_session(state, case, api_key).await)
        }
        SimRequest::GetSession { id } => respond(case::get_session(state, id).await),
        SimRequest::StartCase { id, case } => respond(case::start_case(state, id, case).await),
        SimRequest::SendMessage { id, text } => {
            respond(relay::send_message(state, id, &text).await)
        }
        SimRequest::ResetSession { id } => respond(case::reset_session(state, id).await),
        SimRequest::DeleteSession { id } => match case::delete_session(state, id).await {
            Ok(()) => SimResponse::ok(serde_json::json!({"deleted": true, "session_id": id})),
            Err(e) => e.into_response(),
        },
    }
}

async fn health_data(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "model": state.config.model.model,
        "model_key_configured": state.config.model.has_stored_key(),
        "scoring": state.scorer.store_name().unwrap_or("disabled"),
        "sessions": state.sessions.len().await,
    })
}

fn respond<T: Serialize>(result: Result<T, SimError>) -> SimResponse {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => SimResponse::ok(value),
            Err(e) => SimError::Internal(format!("serialization failed: {}", e)).into_response(),
        },
        Err(e) => {
            tracing::debug!(kind = ?e.kind(), error = %e, "Request failed");
            e.into_response()
        }
    }
}
