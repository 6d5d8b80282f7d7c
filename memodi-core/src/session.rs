//! Per-session state for one simulated patient.
//!
//! `SessionState` is passed by `&mut` to whoever drives the session; it owns
//! the case configuration, the chat context and the visible transcript.
//!
//! ```text
//! Unconfigured --start_case ok--> Active --reset--> Unconfigured
//! ```

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chat::{ChatBackend, ChatContext, ChatError};
use crate::models::{Role, Transcript};
use crate::prompt::{build_system_prompt, CaseSetup, CASE_TRIGGER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unconfigured,
    Active,
}

/// Immutable once the case has been generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub setup: CaseSetup,
    pub reference_text: Option<String>,
}

impl SessionConfig {
    pub fn topic(&self) -> &str {
        self.setup.topic()
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a case is already in progress; reset the session first")]
    AlreadyActive,

    #[error("no case in progress")]
    NotActive,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error("model call failed: {0}")]
    Chat(#[from] ChatError),
}

#[derive(Debug)]
pub struct SessionState {
    phase: SessionPhase,
    config: Option<SessionConfig>,
    chat: Option<ChatContext>,
    transcript: Transcript,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Unconfigured,
            config: None,
            chat: None,
            transcript: Transcript::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.config.as_ref().map(SessionConfig::topic)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Seed a chat context with the case prompt and fetch the opening
    /// narration. Nothing is stored unless the model call succeeds.
    pub async fn start_case(
        &mut self,
        backend: Arc<dyn ChatBackend>,
        setup: CaseSetup,
        reference_text: Option<String>,
        max_reference_chars: usize,
    ) -> Result<&str, SessionError> {
        if self.phase == SessionPhase::Active {
            return Err(SessionError::AlreadyActive);
        }
        let reference_text = reference_text.filter(|r| !r.trim().is_empty());

        let prompt = build_system_prompt(&setup, reference_text.as_deref(), max_reference_chars);
        let mut chat = ChatContext::new(backend, prompt);
        let opening = chat.send_message(CASE_TRIGGER).await?;

        tracing::info!(
            topic = %setup.topic(),
            difficulty = %setup.difficulty(),
            with_reference = reference_text.is_some(),
            "Case generated"
        );

        self.transcript.clear();
        self.transcript.push(Role::Assistant, opening);
        self.chat = Some(chat);
        self.config = Some(SessionConfig {
            setup,
            reference_text,
        });
        self.phase = SessionPhase::Active;

        Ok(self.last_text())
    }

    /// Relay one user turn. Both turns are appended only after the model
    /// replies, so a failed call leaves the transcript untouched.
    pub async fn send(&mut self, text: &str) -> Result<&str, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let chat = match (self.phase, self.chat.as_mut()) {
            (SessionPhase::Active, Some(chat)) => chat,
            _ => return Err(SessionError::NotActive),
        };

        let reply = chat.send_message(text).await?;

        self.transcript.push(Role::User, text);
        self.transcript.push(Role::Assistant, reply);
        Ok(self.last_text())
    }

    /// New patient: drop the chat, the configuration and the transcript.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.chat = None;
        self.config = None;
        self.phase = SessionPhase::Unconfigured;
    }

    fn last_text(&self) -> &str {
        self.transcript
            .last()
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }
}
