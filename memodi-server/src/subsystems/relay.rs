//! Conversation relay: one user turn in, one patient reply out, then the
//! best-effort scoring side path.

use memodi_core::ScoreOutcome;
use serde::Serialize;
use uuid::Uuid;

use super::SimError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RelayReply {
    pub session_id: Uuid,
    pub reply: String,
    pub transcript_len: usize,
    pub score: ScoreOutcome,
    pub notice: Option<String>,
}

/// Forward `text` to the session's chat context.
///
/// The session lock is held across the model call and the score append,
/// so a session never has two turns in flight.
pub async fn send_message(state: &AppState, id: Uuid, text: &str) -> Result<RelayReply, SimError> {
    let handle = state.sessions.get(id).await.ok_or(SimError::NotFound(id))?;
    let mut session = handle.state.lock().await;

    let reply = session.send(text).await?.to_string();
    let topic = session.topic().unwrap_or_default().to_string();

    let score = state.scorer.process(&topic, &reply).await;
    let notice = score.notice();
    if let Some(record) = score.record() {
        tracing::info!(session_id = %id, score = record.score, "Verdict turn");
    }

    Ok(RelayReply {
        session_id: id,
        reply,
        transcript_len: session.transcript().len(),
        score,
        notice,
    })
}
