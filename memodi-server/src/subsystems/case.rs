//! Session lifecycle: create, generate a case, inspect, reset, drop.

use memodi_core::chat::resolve_backend;
use memodi_core::{CaseSetup, Difficulty, SessionPhase, SessionState, Turn};
use serde::Serialize;
use uuid::Uuid;

use super::SimError;
use crate::protocol::CaseRequest;
use crate::registry::SessionHandle;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionPhase,
    pub topic: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub has_reference: bool,
    pub transcript: Vec<Turn>,
}

impl SessionView {
    pub fn of(id: Uuid, session: &SessionState) -> Self {
        let config = session.config();
        Self {
            session_id: id,
            state: session.phase(),
            topic: config.map(|c| c.topic().to_string()),
            difficulty: config.map(|c| c.setup.difficulty()),
            has_reference: config.is_some_and(|c| c.reference_text.is_some()),
            transcript: session.transcript().turns().to_vec(),
        }
    }
}

fn case_setup(case: &CaseRequest) -> Result<CaseSetup, SimError> {
    Ok(CaseSetup::resolve(
        case.topic.as_deref(),
        case.area,
        case.difficulty,
    )?)
}

fn reference_text(case: CaseRequest) -> Option<String> {
    case.reference_text.filter(|t| !t.trim().is_empty())
}

/// Resolve credentials, generate the opening narration, then register the
/// session. Nothing is registered if the model call fails.
pub async fn create_session(
    state: &AppState,
    case: CaseRequest,
    api_key: Option<String>,
) -> Result<SessionView, SimError> {
    let backend = resolve_backend(&state.config.model, api_key.as_deref())?;
    let setup = case_setup(&case)?;

    let mut session = SessionState::new();
    session
        .start_case(
            backend.clone(),
            setup,
            reference_text(case),
            state.config.prompt.max_reference_chars,
        )
        .await?;

    let handle = SessionHandle::new(session, backend);
    let id = state.sessions.insert(handle.clone()).await;
    tracing::info!(session_id = %id, "Session created");

    let session = handle.state.lock().await;
    Ok(SessionView::of(id, &session))
}

/// Generate a new case on a session that has been reset.
pub async fn start_case(
    state: &AppState,
    id: Uuid,
    case: CaseRequest,
) -> Result<SessionView, SimError> {
    let handle = state.sessions.get(id).await.ok_or(SimError::NotFound(id))?;
    let setup = case_setup(&case)?;

    let mut session = handle.state.lock().await;
    session
        .start_case(
            handle.backend.clone(),
            setup,
            reference_text(case),
            state.config.prompt.max_reference_chars,
        )
        .await?;

    Ok(SessionView::of(id, &session))
}

pub async fn get_session(state: &AppState, id: Uuid) -> Result<SessionView, SimError> {
    let handle = state.sessions.get(id).await.ok_or(SimError::NotFound(id))?;
    let session = handle.state.lock().await;
    Ok(SessionView::of(id, &session))
}

pub async fn reset_session(state: &AppState, id: Uuid) -> Result<SessionView, SimError> {
    let handle = state.sessions.get(id).await.ok_or(SimError::NotFound(id))?;
    let mut session = handle.state.lock().await;
    session.reset();
    tracing::info!(session_id = %id, "Session reset");
    Ok(SessionView::of(id, &session))
}

pub async fn delete_session(state: &AppState, id: Uuid) -> Result<(), SimError> {
    if state.sessions.remove(id).await {
        tracing::info!(session_id = %id, "Session dropped");
        Ok(())
    } else {
        Err(SimError::NotFound(id))
    }
}
