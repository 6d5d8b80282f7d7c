use std::sync::Arc;

use memodi_core::config::ScoringConfig;
use memodi_core::{GoogleSheetsStore, ScoreLogger};

/// Build the score logger from `[scoring]`.
///
/// Missing or unreadable credentials disable logging instead of failing
/// startup; verdicts are still parsed and reported.
pub fn build_score_logger(config: &ScoringConfig) -> ScoreLogger {
    if !config.enabled {
        tracing::info!("Score logging disabled by config");
        return ScoreLogger::disabled();
    }

    match GoogleSheetsStore::from_config(config) {
        Ok(store) => {
            tracing::info!(document = %store.document_name(), "Score logging to spreadsheet");
            ScoreLogger::new(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Score logging unavailable, verdicts will not be persisted");
            ScoreLogger::disabled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_config() {
        let config = ScoringConfig {
            enabled: false,
            ..ScoringConfig::default()
        };
        assert!(!build_score_logger(&config).is_enabled());
    }

    #[test]
    fn test_unreadable_credentials_disable_logging() {
        let config = ScoringConfig {
            credentials_path: Some("/nonexistent/memodi/sa.json".to_string()),
            ..ScoringConfig::default()
        };
        assert!(!build_score_logger(&config).is_enabled());
    }

    #[test]
    fn test_valid_credentials_enable_logging() {
        let path = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../memodi-core/tests/fixtures/test_service_account.json"
        );
        let config = ScoringConfig {
            credentials_path: Some(path.to_string()),
            ..ScoringConfig::default()
        };
        let logger = build_score_logger(&config);
        assert!(logger.is_enabled());
        assert_eq!(logger.store_name(), Some("google-sheets"));
    }
}
