/// Collaborators consumed by the recommendation engine
///
/// The engine never talks to a database directly. The launcher's catalog,
/// its play-session history, the arm store and the launch telemetry sink are
/// all reached through these traits, so the same engine runs against
/// PostgreSQL/Redis in production and in-memory implementations in tests.
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{InstalledGame, SessionId, SessionRecord},
};

pub mod memory;
pub mod postgres;

/// Source of the installed game catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Every installed game, in the launcher's catalog order
    async fn list_installed_games(&self) -> AppResult<Vec<InstalledGame>>;
}

/// Play-session history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionEventSource: Send + Sync {
    /// Start of the latest session that began strictly before `before`
    async fn most_recent_session_start(
        &self,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>>;

    /// All recorded sessions in ascending start order
    async fn replay_historical_sessions(&self) -> AppResult<Vec<SessionRecord>>;

    async fn session_by_id(&self, id: SessionId) -> AppResult<Option<SessionRecord>>;
}

/// A serialized arm as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArm {
    pub game_id: String,
    pub blob: String,
}

/// Key/value store for learned model state
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PersistentStore: Send + Sync {
    async fn load_all_arms(&self) -> AppResult<Vec<StoredArm>>;

    async fn save_arm(&self, game_id: &str, blob: String) -> AppResult<()>;

    async fn load_vocabulary(&self) -> AppResult<Option<String>>;

    async fn save_vocabulary(&self, blob: String) -> AppResult<()>;

    /// Whether a full history replay has completed against this store
    async fn history_replayed(&self) -> AppResult<bool>;

    /// Written after the arms of a full history replay
    async fn mark_history_replayed(&self) -> AppResult<()>;
}

/// Sink for "recommendation acted on" telemetry
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LaunchRecorder: Send + Sync {
    async fn record_launch(&self, game_id: &str, launched_at: DateTime<Utc>) -> AppResult<()>;
}
