use thiserror::Error;

use crate::chat::ChatError;

#[derive(Error, Debug)]
pub enum MemodiError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Chat backend error: {0}")]
    Chat(#[from] ChatError),
}
