use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters of the verdict kept alongside the score.
pub const EXCERPT_CHARS: usize = 100;

/// One graded attempt, as appended to the score sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    /// Passed through as parsed; not clamped to 0-100.
    pub score: i64,
    pub feedback_excerpt: String,
}

impl ScoreRecord {
    pub fn new(topic: impl Into<String>, score: i64, reply: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            topic: topic.into(),
            score,
            feedback_excerpt: reply.chars().take(EXCERPT_CHARS).collect(),
        }
    }

    /// Sheet row: timestamp, topic, score, excerpt.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.topic.clone(),
            self.score.to_string(),
            self.feedback_excerpt.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_is_first_100_chars() {
        let reply = format!("CALIFICACIÓN: 90/100 {}", "é".repeat(300));
        let record = ScoreRecord::new("Síncope", 90, &reply);
        assert_eq!(record.feedback_excerpt.chars().count(), EXCERPT_CHARS);
        assert!(record.feedback_excerpt.starts_with("CALIFICACIÓN: 90/100"));
    }

    #[test]
    fn test_short_reply_kept_whole() {
        let record = ScoreRecord::new("Síncope", 70, "CALIFICACIÓN: 70/100");
        assert_eq!(record.feedback_excerpt, "CALIFICACIÓN: 70/100");
    }

    #[test]
    fn test_row_layout() {
        let record = ScoreRecord::new("Cefalea", 85, "CALIFICACIÓN: 85/100 bien");
        let row = record.to_row();
        assert_eq!(row.len(), 4);
        assert_eq!(row[1], "Cefalea");
        assert_eq!(row[2], "85");
        assert_eq!(row[3], "CALIFICACIÓN: 85/100 bien");
        assert_eq!(row[0].len(), "2026-01-01 00:00:00".len());
    }
}
