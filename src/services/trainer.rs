//! Cold-start training from the launcher's session history.
//!
//! Replays every completed session in start order and applies the same
//! update a live session would have produced. Game attributes come from the
//! current catalog, not from the time of the session.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{InstalledGame, SessionRecord},
    services::{
        bandit::TrackedArm, context::ContextBuilder, reward::reward_for_seconds,
        vocabulary::FeatureVocabulary,
    },
};

/// Counters from one replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingReport {
    /// Sessions applied as updates
    pub replayed: usize,
    /// Sessions without a positive duration
    pub skipped_incomplete: usize,
    /// Sessions of games no longer in the catalog
    pub skipped_unknown_game: usize,
    /// Distinct arms that received updates
    pub arms_trained: usize,
}

pub struct Trainer<'a> {
    context: &'a ContextBuilder,
    vocabulary: &'a FeatureVocabulary,
}

impl<'a> Trainer<'a> {
    pub fn new(context: &'a ContextBuilder, vocabulary: &'a FeatureVocabulary) -> Self {
        Self {
            context,
            vocabulary,
        }
    }

    /// Trains fresh arms from `history`.
    ///
    /// With `only`, sessions of other games still count as "previous
    /// session" context but do not produce updates.
    pub fn replay(
        &self,
        history: &[SessionRecord],
        catalog: &[InstalledGame],
        only: Option<&HashSet<String>>,
    ) -> AppResult<(BTreeMap<String, TrackedArm>, TrainingReport)> {
        let layout = self.vocabulary.layout();
        let games: HashMap<&str, &InstalledGame> =
            catalog.iter().map(|g| (g.id.as_str(), g)).collect();

        let mut ordered: Vec<&SessionRecord> = history.iter().collect();
        ordered.sort_by_key(|s| s.started_at);

        let mut arms: BTreeMap<String, TrackedArm> = BTreeMap::new();
        let mut report = TrainingReport::default();
        let mut latest_start: Option<DateTime<Utc>> = None;
        let mut previous_start: Option<DateTime<Utc>> = None;

        for session in ordered {
            // previous_start is the latest start strictly before this one
            if latest_start.map_or(true, |latest| session.started_at > latest) {
                previous_start = latest_start;
                latest_start = Some(session.started_at);
            }

            if only.is_some_and(|ids| !ids.contains(&session.game_id)) {
                continue;
            }
            let Some(duration) = session.completed_duration() else {
                report.skipped_incomplete += 1;
                continue;
            };
            let Some(game) = games.get(session.game_id.as_str()).copied() else {
                report.skipped_unknown_game += 1;
                continue;
            };

            let context =
                self.context
                    .build(self.vocabulary, session.started_at, previous_start, Some(game));
            let arm = arms
                .entry(session.game_id.clone())
                .or_insert_with(|| TrackedArm::new(layout));
            arm.arm_mut().update(&context, reward_for_seconds(duration))?;
            report.replayed += 1;
        }

        report.arms_trained = arms.len();
        Ok((arms, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn builder() -> ContextBuilder {
        ContextBuilder::new(FixedOffset::east_opt(0).unwrap())
    }

    fn catalog() -> Vec<InstalledGame> {
        vec![
            InstalledGame::new("hades").with_genres(["Roguelike"]),
            InstalledGame::new("stardew").with_genres(["Simulation"]),
        ]
    }

    fn session(id: i64, game: &str, hours_after: i64, duration_seconds: Option<i64>) -> SessionRecord {
        SessionRecord {
            id,
            game_id: game.to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
                + Duration::hours(hours_after),
            duration_seconds,
        }
    }

    fn vocabulary() -> FeatureVocabulary {
        let mut vocab = FeatureVocabulary::new(64);
        vocab.refresh(&catalog());
        vocab
    }

    #[test]
    fn test_replay_filters_and_counts() {
        let vocab = vocabulary();
        let builder = builder();
        let trainer = Trainer::new(&builder, &vocab);
        let history = vec![
            session(1, "hades", 0, Some(3600)),
            session(2, "hades", 5, None),
            session(3, "stardew", 10, Some(0)),
            session(4, "uninstalled", 12, Some(7200)),
            session(5, "stardew", 20, Some(7200)),
        ];

        let (arms, report) = trainer.replay(&history, &catalog(), None).unwrap();
        assert_eq!(
            report,
            TrainingReport {
                replayed: 2,
                skipped_incomplete: 2,
                skipped_unknown_game: 1,
                arms_trained: 2,
            }
        );
        assert!(arms["hades"].arm().has_training_data());
        assert!(arms["stardew"].arm().has_training_data());
    }

    #[test]
    fn test_replay_uses_previous_session_gap() {
        let vocab = vocabulary();
        let builder = builder();
        let trainer = Trainer::new(&builder, &vocab);
        // stardew starts 42h after hades; an incomplete session still counts
        // as the previous session.
        let history = vec![
            session(1, "hades", 0, None),
            session(2, "stardew", 42, Some(7200)),
        ];

        let (arms, _) = trainer.replay(&history, &catalog(), None).unwrap();
        let b = arms["stardew"].arm().reward_vector();
        assert!((b[4] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_simultaneous_sessions_share_previous_start() {
        let vocab = vocabulary();
        let builder = builder();
        let trainer = Trainer::new(&builder, &vocab);
        let history = vec![
            session(1, "hades", 0, Some(7200)),
            session(2, "stardew", 84, Some(7200)),
            session(3, "hades", 84, Some(7200)),
        ];

        let (arms, _) = trainer.replay(&history, &catalog(), None).unwrap();
        // both sessions at +84h look back to +0h, not to each other
        assert!((arms["stardew"].arm().reward_vector()[4] - 0.5).abs() < 1e-12);
        // hades: first session has no previous (1.0), second has 0.5
        assert!((arms["hades"].arm().reward_vector()[4] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_replay_restricted_to_selected_games() {
        let vocab = vocabulary();
        let builder = builder();
        let trainer = Trainer::new(&builder, &vocab);
        let history = vec![
            session(1, "hades", 0, Some(3600)),
            session(2, "stardew", 3, Some(3600)),
        ];
        let only: HashSet<String> = ["stardew".to_string()].into_iter().collect();

        let (arms, report) = trainer.replay(&history, &catalog(), Some(&only)).unwrap();
        assert_eq!(arms.keys().collect::<Vec<_>>(), vec!["stardew"]);
        assert_eq!(report.replayed, 1);
    }

    #[test]
    fn test_replay_order_does_not_matter() {
        let vocab = vocabulary();
        let builder = builder();
        let trainer = Trainer::new(&builder, &vocab);
        let history = vec![
            session(1, "hades", 0, Some(3600)),
            session(2, "hades", 24, Some(600)),
            session(3, "hades", 48, Some(7200)),
        ];
        let mut shuffled = history.clone();
        shuffled.reverse();

        let (sorted_arms, _) = trainer.replay(&history, &catalog(), None).unwrap();
        let (shuffled_arms, _) = trainer.replay(&shuffled, &catalog(), None).unwrap();
        assert_eq!(sorted_arms, shuffled_arms);
    }
}
