pub mod case;
pub mod relay;
pub mod scoring;

use memodi_core::{ChatError, MemodiError, PromptError, SessionError};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{ErrorKind, SimResponse};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    MissingCredential(String),

    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::InvalidInput(_) => ErrorKind::InvalidInput,
            SimError::MissingCredential(_) => ErrorKind::MissingCredential,
            SimError::NotFound(_) => ErrorKind::NotFound,
            SimError::Conflict(_) => ErrorKind::Conflict,
            SimError::Upstream(_) => ErrorKind::Upstream,
            SimError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn into_response(self) -> SimResponse {
        SimResponse::err(self.kind(), self.to_string())
    }
}

impl From<PromptError> for SimError {
    fn from(e: PromptError) -> Self {
        SimError::InvalidInput(e.to_string())
    }
}

impl From<SessionError> for SimError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::EmptyMessage => SimError::InvalidInput(e.to_string()),
            SessionError::AlreadyActive | SessionError::NotActive => {
                SimError::Conflict(e.to_string())
            }
            SessionError::Chat(e) => SimError::Upstream(e.to_string()),
        }
    }
}

impl From<MemodiError> for SimError {
    fn from(e: MemodiError) -> Self {
        match e {
            MemodiError::MissingCredential(_) | MemodiError::Chat(ChatError::MissingApiKey) => {
                SimError::MissingCredential(e.to_string())
            }
            MemodiError::Chat(_) | MemodiError::Config(_) => SimError::Internal(e.to_string()),
        }
    }
}
