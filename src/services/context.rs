use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

use crate::{
    models::InstalledGame,
    services::vocabulary::{FeatureVocabulary, USER_FEATURES},
};

/// Gap assumed when there is no earlier session, and the normalization cap.
pub const HOURS_PER_WEEK: f64 = 168.0;
/// Playtime bucket upper bounds in hours.
const PLAYTIME_THRESHOLDS_HOURS: [f64; 4] = [5.0, 20.0, 50.0, 100.0];
/// Recency bucket upper bounds in days.
const RECENCY_THRESHOLDS_DAYS: [f64; 4] = [3.0, 14.0, 60.0, 180.0];
/// Recency used for games that were never played.
const NEVER_PLAYED_DAYS: f64 = 365.0;

const BUCKETS: usize = 5;

/// Turns a moment and a candidate game into a context vector.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    offset: FixedOffset,
}

impl ContextBuilder {
    /// `offset` is the player's local UTC offset used for weekday/time-of-day.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Builds the full context vector for `vocabulary.layout()`.
    ///
    /// `previous_session` is the latest session start strictly before `at`.
    /// Without a game every game-specific slot is zero.
    pub fn build(
        &self,
        vocabulary: &FeatureVocabulary,
        at: DateTime<Utc>,
        previous_session: Option<DateTime<Utc>>,
        game: Option<&InstalledGame>,
    ) -> Vec<f64> {
        let layout = vocabulary.layout();
        let mut context = vec![0.0; layout.dimension()];

        context[..USER_FEATURES].copy_from_slice(&self.user_features(at, previous_session));

        let Some(game) = game else {
            return context;
        };

        for genre in &game.genres {
            if let Some(i) = vocabulary.genre_index(genre) {
                context[layout.genre_offset() + i] = 1.0;
            }
        }
        for tag in &game.tags {
            if let Some(i) = vocabulary.tag_index(tag) {
                context[layout.tag_offset() + i] = 1.0;
            }
        }

        let buckets = layout.bucket_offset();
        context[buckets + playtime_bucket(game.playtime_minutes)] = 1.0;
        context[buckets + BUCKETS + recency_bucket(days_since_played(game, at))] = 1.0;

        context
    }

    fn user_features(
        &self,
        at: DateTime<Utc>,
        previous_session: Option<DateTime<Utc>>,
    ) -> [f64; USER_FEATURES] {
        let local = at.with_timezone(&self.offset);
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let hour = local.hour();
        let morning = (6..12).contains(&hour);
        let afternoon = (12..18).contains(&hour);
        let night = !morning && !afternoon;

        [
            indicator(weekend),
            indicator(morning),
            indicator(afternoon),
            indicator(night),
            normalized_gap(at, previous_session),
        ]
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Hours since the previous session divided by a week, capped at 1.
fn normalized_gap(at: DateTime<Utc>, previous_session: Option<DateTime<Utc>>) -> f64 {
    let hours = previous_session
        .map(|prev| (at - prev).num_seconds().max(0) as f64 / 3600.0)
        .unwrap_or(HOURS_PER_WEEK);
    (hours / HOURS_PER_WEEK).min(1.0)
}

fn days_since_played(game: &InstalledGame, at: DateTime<Utc>) -> f64 {
    game.last_played_at
        .map(|last| (at - last).num_seconds().max(0) as f64 / 86_400.0)
        .unwrap_or(NEVER_PLAYED_DAYS)
}

fn bucket(value: f64, thresholds: &[f64; 4]) -> usize {
    thresholds
        .iter()
        .position(|upper| value < *upper)
        .unwrap_or(thresholds.len())
}

pub(crate) fn playtime_bucket(playtime_minutes: u64) -> usize {
    bucket(playtime_minutes as f64 / 60.0, &PLAYTIME_THRESHOLDS_HOURS)
}

pub(crate) fn recency_bucket(days: f64) -> usize {
    bucket(days, &RECENCY_THRESHOLDS_DAYS)
}
