use memodi_core::{MemodiConfig, ScoreLogger};

use crate::registry::SessionRegistry;

/// Process-wide state shared by all handlers.
pub struct AppState {
    pub config: MemodiConfig,
    pub sessions: SessionRegistry,
    pub scorer: ScoreLogger,
}

impl AppState {
    pub fn new(config: MemodiConfig, scorer: ScoreLogger) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(),
            scorer,
        }
    }
}
