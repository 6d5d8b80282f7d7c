//! Verdict detection and score logging.
//!
//! Every assistant reply is scanned for the `CALIFICACIÓN:` marker. A
//! well-formed verdict becomes a [`ScoreRecord`] that is handed to the
//! configured [`ScoreStore`]. Nothing here ever fails the chat: every path
//! ends in a [`ScoreOutcome`] the caller can ignore or surface.

use std::sync::Arc;

use serde::Serialize;

use crate::models::ScoreRecord;
use crate::sheets::ScoreStore;

/// Literal prefix of a verdict turn.
pub const SCORE_MARKER: &str = "CALIFICACIÓN:";

/// Longest raw score fragment echoed back in a parse failure.
const RAW_ECHO_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No marker in the reply; an ordinary turn.
    Absent,
    /// Marker found but the score did not parse as an integer.
    Malformed(String),
    Score(i64),
}

/// Locate the marker and parse the integer between it and the next `/`.
pub fn parse_verdict(text: &str) -> Verdict {
    let Some(idx) = text.find(SCORE_MARKER) else {
        return Verdict::Absent;
    };
    let rest = &text[idx + SCORE_MARKER.len()..];
    let raw = rest.split('/').next().unwrap_or_default().trim();
    match raw.parse::<i64>() {
        Ok(score) => Verdict::Score(score),
        Err(_) => Verdict::Malformed(raw.chars().take(RAW_ECHO_CHARS).collect()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreOutcome {
    NoVerdict,
    ParseFailed { raw: String },
    Logged { record: ScoreRecord },
    /// Score parsed but the store rejected or could not be reached.
    PersistFailed { record: ScoreRecord, error: String },
    /// Score parsed but no store is configured.
    Disabled { record: ScoreRecord },
}

impl ScoreOutcome {
    pub fn record(&self) -> Option<&ScoreRecord> {
        match self {
            ScoreOutcome::Logged { record }
            | ScoreOutcome::PersistFailed { record, .. }
            | ScoreOutcome::Disabled { record } => Some(record),
            ScoreOutcome::NoVerdict | ScoreOutcome::ParseFailed { .. } => None,
        }
    }

    /// Soft notice for the user, if the outcome warrants one.
    pub fn notice(&self) -> Option<String> {
        match self {
            ScoreOutcome::Logged { record } => {
                Some(format!("Calificación registrada: {}/100", record.score))
            }
            ScoreOutcome::PersistFailed { error, .. } => {
                Some(format!("No se pudo registrar la calificación: {}", error))
            }
            ScoreOutcome::NoVerdict
            | ScoreOutcome::ParseFailed { .. }
            | ScoreOutcome::Disabled { .. } => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ScoreLogger {
    store: Option<Arc<dyn ScoreStore>>,
}

impl ScoreLogger {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_name(&self) -> Option<&str> {
        self.store.as_deref().map(|s| s.name())
    }

    /// Scan one assistant reply and persist a record if it is a verdict.
    pub async fn process(&self, topic: &str, reply: &str) -> ScoreOutcome {
        let score = match parse_verdict(reply) {
            Verdict::Absent => return ScoreOutcome::NoVerdict,
            Verdict::Malformed(raw) => {
                tracing::debug!(raw = %raw, "Verdict marker present but score unparseable");
                return ScoreOutcome::ParseFailed { raw };
            }
            Verdict::Score(score) => score,
        };

        if !(0..=100).contains(&score) {
            tracing::warn!(score = score, topic = %topic, "Score outside 0-100, logging as-is");
        }

        let record = ScoreRecord::new(topic, score, reply);
        let Some(store) = self.store.as_ref() else {
            tracing::debug!(score = score, "Score logging disabled, record not persisted");
            return ScoreOutcome::Disabled { record };
        };

        match store.append(&record).await {
            Ok(()) => ScoreOutcome::Logged { record },
            Err(e) => {
                tracing::warn!(store = store.name(), error = %e, "Score not persisted");
                ScoreOutcome::PersistFailed {
                    record,
                    error: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for ScoreLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreLogger")
            .field("store", &self.store_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::StoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<ScoreRecord>>,
    }

    #[async_trait]
    impl ScoreStore for MemoryStore {
        async fn append(&self, record: &ScoreRecord) -> Result<(), StoreError> {
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl ScoreStore for UnreachableStore {
        async fn append(&self, _record: &ScoreRecord) -> Result<(), StoreError> {
            Err(StoreError::Api {
                code: 503,
                message: "unreachable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    #[test]
    fn test_parse_sample_verdict() {
        assert_eq!(
            parse_verdict("...CALIFICACIÓN: 85/100 buen trabajo..."),
            Verdict::Score(85)
        );
    }

    #[test]
    fn test_parse_without_marker() {
        assert_eq!(parse_verdict("Me duele el pecho, doctor."), Verdict::Absent);
        assert_eq!(parse_verdict(""), Verdict::Absent);
    }

    #[test]
    fn test_parse_non_numeric_score() {
        assert_eq!(
            parse_verdict("CALIFICACIÓN: abc/100"),
            Verdict::Malformed("abc".to_string())
        );
    }

    #[test]
    fn test_parse_bold_markdown_verdict() {
        assert_eq!(
            parse_verdict("**CALIFICACIÓN: 72/100**\n\nJustificación: ..."),
            Verdict::Score(72)
        );
    }

    #[test]
    fn test_parse_marker_without_slash() {
        assert!(matches!(
            parse_verdict("CALIFICACIÓN: 90 puntos"),
            Verdict::Malformed(_)
        ));
    }

    #[test]
    fn test_parse_uses_first_marker() {
        assert_eq!(
            parse_verdict("CALIFICACIÓN: 40/100 ... antes tenías CALIFICACIÓN: 90/100"),
            Verdict::Score(40)
        );
    }

    // Scores are not range-checked; out-of-range values pass through untouched.
    #[test]
    fn test_parse_out_of_range_passes_through() {
        assert_eq!(parse_verdict("CALIFICACIÓN: 150/100"), Verdict::Score(150));
        assert_eq!(parse_verdict("CALIFICACIÓN: -5/100"), Verdict::Score(-5));
    }

    #[tokio::test]
    async fn test_process_logs_verdict() {
        let store = Arc::new(MemoryStore::default());
        let logger = ScoreLogger::new(store.clone());

        let outcome = logger
            .process("Síncope", "CALIFICACIÓN: 85/100 buen trabajo")
            .await;

        match &outcome {
            ScoreOutcome::Logged { record } => {
                assert_eq!(record.score, 85);
                assert_eq!(record.topic, "Síncope");
            }
            other => panic!("Expected Logged, got {:?}", other),
        }
        assert_eq!(store.rows.lock().unwrap().len(), 1);
        assert_eq!(outcome.notice().unwrap(), "Calificación registrada: 85/100");
    }

    #[tokio::test]
    async fn test_process_ordinary_turn_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let logger = ScoreLogger::new(store.clone());

        let outcome = logger.process("Síncope", "TA 90/60, FC 110").await;
        assert_eq!(outcome, ScoreOutcome::NoVerdict);
        assert!(store.rows.lock().unwrap().is_empty());
        assert!(outcome.notice().is_none());
    }

    #[tokio::test]
    async fn test_process_malformed_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let logger = ScoreLogger::new(store.clone());

        let outcome = logger.process("Síncope", "CALIFICACIÓN: abc/100").await;
        assert_eq!(
            outcome,
            ScoreOutcome::ParseFailed {
                raw: "abc".to_string()
            }
        );
        assert!(store.rows.lock().unwrap().is_empty());
        assert!(outcome.record().is_none());
    }

    #[tokio::test]
    async fn test_process_out_of_range_still_logged() {
        let store = Arc::new(MemoryStore::default());
        let logger = ScoreLogger::new(store.clone());

        let outcome = logger.process("Síncope", "CALIFICACIÓN: 150/100").await;
        assert_eq!(outcome.record().unwrap().score, 150);
        assert_eq!(store.rows.lock().unwrap()[0].score, 150);
    }

    #[tokio::test]
    async fn test_process_store_failure_is_soft() {
        let logger = ScoreLogger::new(Arc::new(UnreachableStore));

        let outcome = logger.process("Síncope", "CALIFICACIÓN: 60/100").await;
        match &outcome {
            ScoreOutcome::PersistFailed { record, error } => {
                assert_eq!(record.score, 60);
                assert!(error.contains("unreachable"));
            }
            other => panic!("Expected PersistFailed, got {:?}", other),
        }
        assert!(outcome.notice().unwrap().starts_with("No se pudo registrar"));
    }

    #[tokio::test]
    async fn test_process_without_store() {
        let logger = ScoreLogger::disabled();
        assert!(!logger.is_enabled());

        let outcome = logger.process("Síncope", "CALIFICACIÓN: 60/100").await;
        assert!(matches!(outcome, ScoreOutcome::Disabled { .. }));
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(ScoreOutcome::ParseFailed {
            raw: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "parse_failed", "raw": "abc" }));

        let json = serde_json::to_value(ScoreOutcome::NoVerdict).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "no_verdict" }));
    }
}
