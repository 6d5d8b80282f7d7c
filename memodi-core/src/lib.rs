pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod prompt;
pub mod score;
pub mod session;
pub mod sheets;

pub use chat::{create_backend, resolve_backend, ChatBackend, ChatContext, ChatError, GeminiChatClient};
pub use config::MemodiConfig;
pub use error::MemodiError;
pub use models::{Role, ScoreRecord, Transcript, Turn};
pub use prompt::{build_system_prompt, CaseSetup, Difficulty, PromptError, Specialty};
pub use score::{parse_verdict, ScoreLogger, ScoreOutcome, Verdict, SCORE_MARKER};
pub use session::{SessionError, SessionPhase, SessionState};
pub use sheets::{GoogleSheetsStore, ScoreStore, ServiceAccountKey, StoreError};
