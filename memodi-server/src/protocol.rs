use memodi_core::{Difficulty, Specialty};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Case parameters as submitted by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseRequest {
    pub area: Option<Specialty>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub topic: Option<String>,
    /// Plain text already extracted from the reference document.
    pub reference_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SimRequest {
    Health,
    CreateSession {
        #[serde(flatten)]
        case: CaseRequest,
        /// Interactive fallback when no key is configured server-side.
        api_key: Option<String>,
    },
    GetSession {
        id: Uuid,
    },
    StartCase {
        id: Uuid,
        #[serde(flatten)]
        case: CaseRequest,
    },
    SendMessage {
        id: Uuid,
        text: String,
    },
    ResetSession {
        id: Uuid,
    },
    DeleteSession {
        id: Uuid,
    },
}

/// Error category, mapped to an HTTP status at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    MissingCredential,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub kind: Option<ErrorKind>,
    pub version: String,
}

impl SimResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            kind: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            kind: Some(kind),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
