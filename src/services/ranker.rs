use std::collections::HashSet;

use crate::{
    models::{InstalledGame, ScoreBreakdown},
    services::{bandit::Arm, diversifier},
};

/// Multiplier applied to arms that have never seen a reward.
pub const COLD_START_PENALTY: f64 = 0.3;

/// A candidate with its computed score
#[derive(Debug, Clone)]
pub struct ScoredGame<'a> {
    pub game: &'a InstalledGame,
    pub breakdown: ScoreBreakdown,
}

/// Scores one arm for one context.
///
/// A numerical failure yields a zero score instead of an error so that one
/// bad arm cannot block the rest of the ranking.
pub fn score_arm(game_id: &str, arm: &Arm, context: &[f64], alpha: f64) -> ScoreBreakdown {
    let Some(estimate) = arm.score(context, alpha) else {
        tracing::warn!(
            game_id = %game_id,
            dimension = arm.dimension(),
            context_len = context.len(),
            "Arm could not be scored, using zero score"
        );
        return ScoreBreakdown {
            score: 0.0,
            ucb_score: 0.0,
            expected_reward: 0.0,
            uncertainty: 0.0,
            cold_start: false,
            numerical_fallback: true,
        };
    };

    let cold_start = !arm.has_training_data();
    let score = if cold_start {
        estimate.ucb * COLD_START_PENALTY
    } else {
        estimate.ucb
    };

    ScoreBreakdown {
        score,
        ucb_score: estimate.ucb,
        expected_reward: estimate.expected_reward,
        uncertainty: estimate.uncertainty,
        cold_start,
        numerical_fallback: false,
    }
}

/// Orders candidates by score and picks `count` of them.
///
/// Ties keep catalog order. With `diversity > 0` the pick is delegated to
/// MMR re-ranking with `λ = 1 - diversity`.
pub fn select_top<'a>(
    mut scored: Vec<ScoredGame<'a>>,
    count: usize,
    diversity: f64,
) -> Vec<ScoredGame<'a>> {
    // sort_by is stable, so equal scores stay in catalog order
    scored.sort_by(|a, b| b.breakdown.score.total_cmp(&a.breakdown.score));

    if diversity > 0.0 {
        diversifier::rerank(scored, count, 1.0 - diversity)
    } else {
        scored.truncate(count);
        scored
    }
}

/// Games already surfaced during this process lifetime
#[derive(Debug, Default)]
pub struct RecentlyShown {
    shown: HashSet<String>,
}

impl RecentlyShown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates for the next request.
    ///
    /// Excludes games already shown unless that would leave fewer than
    /// `count`; in that case the set is cleared and every game is eligible.
    pub fn eligible<'a>(&mut self, games: &'a [InstalledGame], count: usize) -> Vec<&'a InstalledGame> {
        let fresh: Vec<&InstalledGame> = games
            .iter()
            .filter(|g| !self.shown.contains(&g.id))
            .collect();

        if fresh.is_empty() || fresh.len() < count {
            tracing::debug!(
                fresh = fresh.len(),
                requested = count,
                "Recently-shown set exhausted, resetting"
            );
            self.shown.clear();
            return games.iter().collect();
        }
        fresh
    }

    pub fn mark_shown<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        self.shown.extend(ids.into_iter().map(str::to_string));
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.shown.contains(game_id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(score: f64) -> ScoreBreakdown {
        ScoreBreakdown {
            score,
            ucb_score: score,
            expected_reward: 0.0,
            uncertainty: 0.0,
            cold_start: false,
            numerical_fallback: false,
        }
    }

    #[test]
    fn test_cold_start_penalty_applies_to_untrained_arm() {
        let arm = Arm::new(2);
        let result = score_arm("g", &arm, &[1.0, 0.0], 1.0);
        assert!(result.cold_start);
        assert_eq!(result.expected_reward, 0.0);
        assert_eq!(result.ucb_score, 1.0);
        assert!((result.score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_trained_arm_is_not_penalized() {
        let mut arm = Arm::new(2);
        arm.update(&[1.0, 0.0], 1.0).unwrap();
        let result = score_arm("g", &arm, &[1.0, 0.0], 1.0);
        assert!(!result.cold_start);
        assert_eq!(result.score, result.ucb_score);
        assert!((result.ucb_score - (0.5 + 0.5_f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn test_unscorable_arm_falls_back_to_zero() {
        let arm = Arm::new(3);
        let result = score_arm("g", &arm, &[1.0, 0.0], 1.0);
        assert!(result.numerical_fallback);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_select_top_orders_and_truncates() {
        let games: Vec<InstalledGame> = ["a", "b", "c", "d"].into_iter().map(InstalledGame::new).collect();
        let scored = vec![
            ScoredGame { game: &games[0], breakdown: breakdown(0.2) },
            ScoredGame { game: &games[1], breakdown: breakdown(0.9) },
            ScoredGame { game: &games[2], breakdown: breakdown(0.5) },
            ScoredGame { game: &games[3], breakdown: breakdown(0.5) },
        ];
        let top = select_top(scored, 3, 0.0);
        let ids: Vec<&str> = top.iter().map(|s| s.game.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let games: Vec<InstalledGame> = ["x", "y", "z"].into_iter().map(InstalledGame::new).collect();
        let scored = games
            .iter()
            .map(|game| ScoredGame { game, breakdown: breakdown(0.3) })
            .collect();
        let top = select_top(scored, 3, 0.0);
        let ids: Vec<&str> = top.iter().map(|s| s.game.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_recently_shown_excludes_then_resets() {
        let games: Vec<InstalledGame> = ["a", "b", "c", "d"].into_iter().map(InstalledGame::new).collect();
        let mut recent = RecentlyShown::new();

        recent.mark_shown(["a", "b"]);
        let eligible = recent.eligible(&games, 2);
        let ids: Vec<&str> = eligible.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);

        recent.mark_shown(["c"]);
        // only "d" is fresh but two are requested
        let eligible = recent.eligible(&games, 2);
        assert_eq!(eligible.len(), 4);
        assert!(recent.is_empty());
    }

    #[test]
    fn test_recently_shown_resets_every_time_when_catalog_equals_count() {
        let games: Vec<InstalledGame> = ["a", "b", "c"].into_iter().map(InstalledGame::new).collect();
        let mut recent = RecentlyShown::new();
        for _ in 0..5 {
            let eligible = recent.eligible(&games, 3);
            assert_eq!(eligible.len(), 3);
            recent.mark_shown(eligible.iter().map(|g| g.id.as_str()));
            assert_eq!(recent.len(), 3);
        }
    }
}
