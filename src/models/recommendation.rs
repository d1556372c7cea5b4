use serde::{Deserialize, Serialize};

/// Per-game scoring detail kept for observability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    /// Score used for ranking, after the cold-start penalty
    pub score: f64,
    /// Raw upper confidence bound
    pub ucb_score: f64,
    pub expected_reward: f64,
    pub uncertainty: f64,
    /// The arm has never been updated and the cold-start penalty applied
    pub cold_start: bool,
    /// Scoring failed numerically and a zero score was substituted
    pub numerical_fallback: bool,
}

/// A recommended game returned to the launcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub game_id: String,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
}

/// Query string for GET /api/v1/recommendations
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    pub count: Option<usize>,
    /// Diversity factor in [0, 1]; 0 disables MMR re-ranking
    pub diversity: Option<f64>,
    /// Overrides the configured exploration weight
    pub alpha: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<Recommendation>,
}

/// Body for POST /api/v1/launches
#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub game_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_serializes_flat() {
        let rec = Recommendation {
            game_id: "hades".to_string(),
            breakdown: ScoreBreakdown {
                score: 0.3,
                ucb_score: 1.0,
                expected_reward: 0.0,
                uncertainty: 1.0,
                cold_start: true,
                numerical_fallback: false,
            },
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["game_id"], "hades");
        assert_eq!(json["ucb_score"], 1.0);
        assert_eq!(json["cold_start"], true);
    }
}
