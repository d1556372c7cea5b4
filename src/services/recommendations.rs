use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};

use crate::{
    error::{AppError, AppResult},
    models::{
        InstalledGame, Recommendation, SessionEnd, SessionId, SessionRecord, SessionUpdateOutcome,
    },
    services::{
        bandit::ArmModel,
        context::ContextBuilder,
        persistence::{self, Reconciled},
        providers::{CatalogProvider, LaunchRecorder, PersistentStore, SessionEventSource},
        ranker::{self, RecentlyShown, ScoredGame},
        reward::session_reward,
        trainer::{Trainer, TrainingReport},
        vocabulary::{FeatureLayout, FeatureVocabulary},
    },
};

/// Tuning knobs for the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub exploration_alpha: f64,
    pub default_count: usize,
    pub max_count: usize,
    /// Default diversity factor; 0 disables re-ranking
    pub diversity_factor: f64,
    pub max_vocabulary_terms: usize,
    pub local_offset: FixedOffset,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            exploration_alpha: 1.0,
            default_count: 5,
            max_count: 50,
            diversity_factor: 0.0,
            max_vocabulary_terms: 256,
            local_offset: Utc.fix(),
        }
    }
}

/// Outcome of loading stored arms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Blobs found in the store
    pub stored: usize,
    pub loaded: usize,
    /// Arms moved to new positions because the vocabulary grew or was rebuilt
    pub remapped: usize,
    /// Blobs that could not be decoded
    pub skipped: usize,
    /// Arms naming terms the vocabulary lacks; need retraining
    pub rejected: HashSet<String>,
}

/// History replay still owed to the model
#[derive(Debug, Clone, PartialEq)]
enum PendingReplay {
    /// No full replay has completed against the store
    Full,
    /// Arms dropped on load
    Only(HashSet<String>),
}

/// Contextual-bandit recommender over the installed game catalog
///
/// Owns the feature vocabulary, the per-game arms and the recently-shown
/// set. Everything outside the process is reached through the provider
/// traits.
pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogProvider>,
    sessions: Arc<dyn SessionEventSource>,
    store: Arc<dyn PersistentStore>,
    recorder: Arc<dyn LaunchRecorder>,
    settings: EngineSettings,
    context: ContextBuilder,
    vocabulary: RwLock<FeatureVocabulary>,
    arms: ArmModel,
    recently_shown: Mutex<RecentlyShown>,
    pending_replay: Mutex<Option<PendingReplay>>,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        sessions: Arc<dyn SessionEventSource>,
        store: Arc<dyn PersistentStore>,
        recorder: Arc<dyn LaunchRecorder>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            sessions,
            store,
            recorder,
            context: ContextBuilder::new(settings.local_offset),
            vocabulary: RwLock::new(FeatureVocabulary::new(settings.max_vocabulary_terms)),
            arms: ArmModel::new(),
            recently_shown: Mutex::new(RecentlyShown::new()),
            pending_replay: Mutex::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn arms(&self) -> &ArmModel {
        &self.arms
    }

    pub async fn layout(&self) -> FeatureLayout {
        self.vocabulary.read().await.layout()
    }

    /// Brings the engine up from the store and, when needed, from history.
    ///
    /// An unreadable store fails startup. An unavailable catalog does not:
    /// the vocabulary then grows, and any owed history replay runs, on the
    /// first request that gets a non-empty catalog.
    pub async fn initialize(&self) -> AppResult<()> {
        let started = std::time::Instant::now();

        if let Some(blob) = self.store.load_vocabulary().await? {
            match persistence::decode_vocabulary(&blob) {
                Ok(snapshot) => {
                    tracing::info!(
                        genres = snapshot.genres.len(),
                        tags = snapshot.tags.len(),
                        "Restored feature vocabulary"
                    );
                    *self.vocabulary.write().await = FeatureVocabulary::from_snapshot(
                        snapshot,
                        self.settings.max_vocabulary_terms,
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored vocabulary is unreadable, rebuilding");
                }
            }
        }

        let games = match self.catalog.list_installed_games().await {
            Ok(games) => games,
            Err(e) => {
                tracing::warn!(error = %e, "Catalog unavailable during startup");
                Vec::new()
            }
        };
        self.refresh_vocabulary(&games).await;

        let replayed = self.store.history_replayed().await?;
        let report = self.load_all().await?;

        *self.pending_replay.lock().await = if !replayed {
            Some(PendingReplay::Full)
        } else if !report.rejected.is_empty() {
            Some(PendingReplay::Only(report.rejected))
        } else {
            None
        };
        self.replay_pending(&games, None).await;

        tracing::info!(
            arms = self.arms.len().await,
            dimension = self.layout().await.dimension(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendation engine initialized"
        );
        Ok(())
    }

    /// Recommendations with configured defaults for anything not given.
    pub async fn get_recommendations(
        &self,
        count: Option<usize>,
        diversity: Option<f64>,
    ) -> AppResult<Vec<Recommendation>> {
        self.recommend(
            count.unwrap_or(self.settings.default_count),
            self.settings.exploration_alpha,
            diversity.unwrap_or(self.settings.diversity_factor),
        )
        .await
    }

    /// Scores every eligible installed game and returns the best `count`.
    pub async fn recommend(
        &self,
        count: usize,
        alpha: f64,
        diversity: f64,
    ) -> AppResult<Vec<Recommendation>> {
        if count == 0 || count > self.settings.max_count {
            return Err(AppError::InvalidInput(format!(
                "count must be within 1..={}",
                self.settings.max_count
            )));
        }
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(AppError::InvalidInput(
                "alpha must be a non-negative number".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&diversity) {
            return Err(AppError::InvalidInput(
                "diversity must be within [0, 1]".to_string(),
            ));
        }

        let games = self.fetch_catalog().await?;
        if games.is_empty() {
            return Ok(Vec::new());
        }
        self.refresh_vocabulary(&games).await;
        self.replay_pending(&games, None).await;

        let now = Utc::now();
        let previous = self.previous_session_start(now).await;

        // Held for the whole request so concurrent callers see consistent
        // exclusions.
        let mut shown = self.recently_shown.lock().await;
        let candidates = shown.eligible(&games, count);

        let vocabulary = self.vocabulary.read().await;
        let layout = vocabulary.layout();
        let mut scored = Vec::with_capacity(candidates.len());
        for game in candidates {
            let context = self.context.build(&vocabulary, now, previous, Some(game));
            let shared = self.arms.get_or_create(&game.id, layout).await;
            let mut arm = shared.lock().await;
            if let Err(e) = arm.align_to(layout) {
                tracing::warn!(game_id = %game.id, error = %e, "Arm layout is ahead of vocabulary");
            }
            let breakdown = ranker::score_arm(&game.id, arm.arm(), &context, alpha);
            scored.push(ScoredGame { game, breakdown });
        }
        drop(vocabulary);

        let selected = ranker::select_top(scored, count, diversity);
        shown.mark_shown(selected.iter().map(|s| s.game.id.as_str()));

        tracing::info!(
            catalog = games.len(),
            returned = selected.len(),
            alpha,
            diversity,
            "Recommendations computed"
        );

        Ok(selected
            .into_iter()
            .map(|s| Recommendation {
                game_id: s.game.id.clone(),
                breakdown: s.breakdown,
            })
            .collect())
    }

    /// Records that a recommended game was launched.
    ///
    /// Runs in the background; failures are logged and never reach the
    /// caller.
    pub fn record_launch(&self, game_id: &str) -> JoinHandle<()> {
        let recorder = Arc::clone(&self.recorder);
        let game_id = game_id.to_string();
        let launched_at = Utc::now();
        tokio::spawn(async move {
            match recorder.record_launch(&game_id, launched_at).await {
                Ok(()) => tracing::debug!(game_id = %game_id, "Launch recorded"),
                Err(e) => {
                    tracing::warn!(game_id = %game_id, error = %e, "Failed to record launch")
                }
            }
        })
    }

    /// Applies the reward of a finished session to its game's arm.
    pub async fn update_from_session(&self, session: SessionEnd) -> AppResult<SessionUpdateOutcome> {
        if session.duration_seconds <= 0 {
            return Err(AppError::InvalidInput(
                "duration_seconds must be positive".to_string(),
            ));
        }

        let games = self.fetch_catalog().await?;
        let game = games
            .iter()
            .find(|g| g.id == session.game_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Game {} is not installed", session.game_id))
            })?;
        self.refresh_vocabulary(&games).await;
        self.replay_pending(&games, Some(&session)).await;

        let previous = self.previous_session_start(session.started_at).await;
        let duration_minutes = session.duration_seconds as f64 / 60.0;
        let reward = session_reward(duration_minutes);

        let blob = {
            let vocabulary = self.vocabulary.read().await;
            let layout = vocabulary.layout();
            let context = self
                .context
                .build(&vocabulary, session.started_at, previous, Some(game));

            let shared = self.arms.get_or_create(&game.id, layout).await;
            let mut arm = shared.lock().await;
            arm.align_to(layout)?;
            arm.arm_mut().update(&context, reward)?;
            persistence::encode_arm(&arm, &vocabulary)?
        };

        if let Err(e) = self.store.save_arm(&game.id, blob).await {
            tracing::warn!(game_id = %game.id, error = %e, "Failed to persist arm");
        }

        tracing::info!(
            game_id = %game.id,
            duration_minutes,
            reward,
            "Arm updated from session"
        );

        Ok(SessionUpdateOutcome {
            game_id: session.game_id,
            duration_minutes,
            reward,
        })
    }

    /// Looks the session up in history and applies its reward.
    pub async fn update_from_session_id(&self, id: SessionId) -> AppResult<SessionUpdateOutcome> {
        let record = self
            .sessions
            .session_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;

        let session = record.to_session_end().ok_or_else(|| {
            AppError::InvalidInput(format!("Session {id} has no completed duration"))
        })?;
        self.update_from_session(session).await
    }

    /// Writes the current state of `game_id`'s arm to the store.
    pub async fn save(&self, game_id: &str) -> AppResult<()> {
        let arm = self
            .arms
            .snapshot(game_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("No arm for game {game_id}")))?;
        let blob = {
            let vocabulary = self.vocabulary.read().await;
            persistence::encode_arm(&arm, &vocabulary)?
        };
        self.store.save_arm(game_id, blob).await
    }

    /// Loads every stored arm into the model, fitted to the current vocabulary.
    pub async fn load_all(&self) -> AppResult<LoadReport> {
        let stored = self.store.load_all_arms().await?;
        let vocabulary = self.vocabulary.read().await.clone();
        let mut report = LoadReport {
            stored: stored.len(),
            ..LoadReport::default()
        };

        for entry in stored {
            let arm = match persistence::decode_arm(&entry.blob) {
                Ok(arm) => arm,
                Err(e) => {
                    tracing::warn!(game_id = %entry.game_id, error = %e, "Skipping unreadable arm");
                    report.skipped += 1;
                    continue;
                }
            };

            match persistence::reconcile(arm, &vocabulary) {
                Reconciled::Current(arm) => {
                    self.arms.install(entry.game_id, arm).await;
                    report.loaded += 1;
                }
                Reconciled::Remapped(arm) => {
                    let blob = persistence::encode_arm(&arm, &vocabulary)?;
                    if let Err(e) = self.store.save_arm(&entry.game_id, blob).await {
                        tracing::warn!(game_id = %entry.game_id, error = %e, "Failed to persist remapped arm");
                    }
                    self.arms.install(entry.game_id, arm).await;
                    report.loaded += 1;
                    report.remapped += 1;
                }
                Reconciled::Rejected { unknown_term } => {
                    tracing::warn!(
                        game_id = %entry.game_id,
                        unknown_term = %unknown_term,
                        "Stored arm uses a term missing from the vocabulary, queued for retraining"
                    );
                    report.rejected.insert(entry.game_id);
                }
            }
        }

        tracing::info!(
            stored = report.stored,
            loaded = report.loaded,
            remapped = report.remapped,
            skipped = report.skipped,
            rejected = report.rejected.len(),
            "Arm store loaded"
        );
        Ok(report)
    }

    /// Runs the owed history replay, if any, against `games`.
    ///
    /// The replay stays owed while the catalog is empty or history is
    /// unavailable, so the next request with a usable catalog retries it.
    /// `live` is the session the caller is about to apply; it is left out of
    /// the replay so it counts once.
    async fn replay_pending(&self, games: &[InstalledGame], live: Option<&SessionEnd>) {
        let mut pending = self.pending_replay.lock().await;
        let only = match &*pending {
            None => return,
            Some(PendingReplay::Full) => None,
            Some(PendingReplay::Only(ids)) => Some(ids.clone()),
        };

        if games.is_empty() {
            tracing::info!("Catalog empty, deferring history replay");
            return;
        }
        let mut history = match self.sessions.replay_historical_sessions().await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "Session history unavailable, deferring replay");
                return;
            }
        };
        if let Some(live) = live {
            history.retain(|s| !(s.game_id == live.game_id && s.started_at == live.started_at));
        }

        if let Err(e) = self.bootstrap(&history, games, only.as_ref()).await {
            tracing::error!(error = %e, "History replay failed, will retry");
            return;
        }
        if only.is_none() {
            if let Err(e) = self.store.mark_history_replayed().await {
                tracing::warn!(error = %e, "Failed to record completed history replay");
            }
        }
        *pending = None;
    }

    /// Trains arms from `history`, for all games or only `only`, and
    /// installs and persists them.
    async fn bootstrap(
        &self,
        history: &[SessionRecord],
        games: &[InstalledGame],
        only: Option<&HashSet<String>>,
    ) -> AppResult<TrainingReport> {
        let (trained, report) = {
            let vocabulary = self.vocabulary.read().await;
            let (arms, report) =
                Trainer::new(&self.context, &vocabulary).replay(history, games, only)?;
            let mut trained = Vec::with_capacity(arms.len());
            for (game_id, arm) in arms {
                let blob = persistence::encode_arm(&arm, &vocabulary)?;
                trained.push((game_id, arm, blob));
            }
            (trained, report)
        };

        for (game_id, arm, blob) in trained {
            self.arms.install(game_id.clone(), arm).await;
            if let Err(e) = self.store.save_arm(&game_id, blob).await {
                tracing::warn!(game_id = %game_id, error = %e, "Failed to persist trained arm");
            }
        }

        tracing::info!(
            sessions = history.len(),
            replayed = report.replayed,
            skipped_incomplete = report.skipped_incomplete,
            skipped_unknown_game = report.skipped_unknown_game,
            arms = report.arms_trained,
            partial = only.is_some(),
            "History replay finished"
        );
        Ok(report)
    }

    async fn fetch_catalog(&self) -> AppResult<Vec<InstalledGame>> {
        self.catalog.list_installed_games().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list installed games");
            AppError::CatalogUnavailable(e.to_string())
        })
    }

    /// Grows the vocabulary from `games` and persists it if it changed.
    async fn refresh_vocabulary(&self, games: &[InstalledGame]) {
        let snapshot = {
            let mut vocabulary = self.vocabulary.write().await;
            if !vocabulary.refresh(games).grew() {
                return;
            }
            vocabulary.snapshot()
        };

        let saved = match persistence::encode_vocabulary(&snapshot) {
            Ok(blob) => self.store.save_vocabulary(blob).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            tracing::warn!(error = %e, "Failed to persist vocabulary");
        }
    }

    async fn previous_session_start(&self, before: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.sessions.most_recent_session_start(before).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "Session history unavailable, assuming no previous session");
                None
            }
        }
    }
}
