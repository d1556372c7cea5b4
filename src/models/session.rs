use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = i64;

/// A play session from the launcher's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    /// Missing for sessions that never recorded an end
    pub duration_seconds: Option<i64>,
}

impl SessionRecord {
    /// Duration if the session ended with a positive length
    pub fn completed_duration(&self) -> Option<i64> {
        self.duration_seconds.filter(|d| *d > 0)
    }

    /// Reward-eligible view of this session, if it completed
    pub fn to_session_end(&self) -> Option<SessionEnd> {
        self.completed_duration().map(|duration_seconds| SessionEnd {
            game_id: self.game_id.clone(),
            started_at: self.started_at,
            duration_seconds,
        })
    }
}

/// A finished session reported to the engine for a reward update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEnd {
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Result of applying a session reward to a game's arm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionUpdateOutcome {
    pub game_id: String,
    pub duration_minutes: f64,
    pub reward: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(duration_seconds: Option<i64>) -> SessionRecord {
        SessionRecord {
            id: 1,
            game_id: "celeste".to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 2, 20, 0, 0).unwrap(),
            duration_seconds,
        }
    }

    #[test]
    fn test_completed_duration_filters_non_positive() {
        assert_eq!(record(Some(600)).completed_duration(), Some(600));
        assert_eq!(record(Some(0)).completed_duration(), None);
        assert_eq!(record(Some(-5)).completed_duration(), None);
        assert_eq!(record(None).completed_duration(), None);
    }

    #[test]
    fn test_session_end_from_record() {
        let end = record(Some(1800)).to_session_end().unwrap();
        assert_eq!(end.game_id, "celeste");
        assert_eq!(end.duration_seconds, 1800);

        assert!(record(None).to_session_end().is_none());
    }
}
