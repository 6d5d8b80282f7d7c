//! Chat completion for the virtual patient.
//!
//! Provides a `ChatBackend` trait with a Gemini `generateContent`
//! implementation, and `ChatContext`, the long-lived per-session handle that
//! owns the hidden instruction and the model-side history.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::error::MemodiError;

// ============================================================================
// ChatBackend trait
// ============================================================================

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce the next model reply given the instruction and full history.
    /// The last message of `history` is the pending user turn.
    async fn generate(&self, system: &str, history: &[ChatMessage]) -> Result<String, ChatError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned no text (finish reason: {reason})")]
    EmptyResponse { reason: String },

    #[error("Missing API key")]
    MissingApiKey,
}

// Request URLs never reach error text.
impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Http(e.without_url())
    }
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<ChatRole>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiChatClient
// ============================================================================

/// Gemini chat client, calls `models/{model}:generateContent`.
///
/// No retry: a failed call is reported to the caller, who may resend.
#[derive(Clone)]
pub struct GeminiChatClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(api_key: impl Into<String>, config: &ModelConfig) -> Result<Self, ChatError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn generate_once(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<String, ChatError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system }],
            },
            contents: history
                .iter()
                .map(|m| GeminiContent {
                    role: Some(m.role),
                    parts: vec![GeminiPart { text: &m.text }],
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(ChatError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await?;
        extract_text(gemini_response)
    }
}

fn extract_text(response: GeminiResponse) -> Result<String, ChatError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "NO_CANDIDATES".to_string());
        return Err(ChatError::EmptyResponse { reason });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ChatError::EmptyResponse {
            reason: candidate
                .finish_reason
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        });
    }

    Ok(text)
}

#[async_trait]
impl ChatBackend for GeminiChatClient {
    async fn generate(&self, system: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        self.generate_once(system, history).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// ChatContext
// ============================================================================

/// One conversation with the model.
///
/// The instruction is sent as the hidden system turn on every call; the
/// history grows by a user/model pair per successful exchange.
#[derive(Clone)]
pub struct ChatContext {
    backend: Arc<dyn ChatBackend>,
    system: String,
    history: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn new(backend: Arc<dyn ChatBackend>, system: impl Into<String>) -> Self {
        Self {
            backend,
            system: system.into(),
            history: Vec::new(),
        }
    }

    /// Send one user turn and return the reply. On error the context is
    /// left exactly as it was.
    pub async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        self.history.push(ChatMessage::user(text));

        match self.backend.generate(&self.system, &self.history).await {
            Ok(reply) => {
                self.history.push(ChatMessage::model(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                tracing::warn!(backend = self.backend.name(), error = %e, "Chat turn failed");
                Err(e)
            }
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("backend", &self.backend.name())
            .field("history_len", &self.history.len())
            .finish()
    }
}

/// Create a Gemini backend from `[model]` and a resolved key.
pub fn create_backend(
    api_key: &str,
    config: &ModelConfig,
) -> Result<Arc<dyn ChatBackend>, ChatError> {
    Ok(Arc::new(GeminiChatClient::new(api_key, config)?))
}

/// Resolve the key (config, env, then `entered`) and build the backend.
pub fn resolve_backend(
    config: &ModelConfig,
    entered_key: Option<&str>,
) -> Result<Arc<dyn ChatBackend>, MemodiError> {
    let api_key = config.resolve_api_key(entered_key).ok_or_else(|| {
        MemodiError::MissingCredential(
            "model API key (set GOOGLE_API_KEY or enter one)".to_string(),
        )
    })?;
    Ok(create_backend(&api_key, config)?)
}

// ============================================================================
// TESTS
// ============================================================================
