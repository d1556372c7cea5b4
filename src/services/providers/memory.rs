/// In-process collaborators
///
/// Used when the engine is embedded without a database, and by the tests.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{InstalledGame, SessionId, SessionRecord},
    services::providers::{
        CatalogProvider, LaunchRecorder, PersistentStore, SessionEventSource, StoredArm,
    },
};

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    games: RwLock<Vec<InstalledGame>>,
}

impl InMemoryCatalog {
    pub fn new(games: Vec<InstalledGame>) -> Self {
        Self {
            games: RwLock::new(games),
        }
    }

    pub async fn set_games(&self, games: Vec<InstalledGame>) {
        *self.games.write().await = games;
    }
}

#[async_trait::async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn list_installed_games(&self) -> AppResult<Vec<InstalledGame>> {
        Ok(self.games.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessions {
    sessions: RwLock<Vec<SessionRecord>>,
}

impl InMemorySessions {
    pub fn new(sessions: Vec<SessionRecord>) -> Self {
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    pub async fn push(&self, session: SessionRecord) {
        self.sessions.write().await.push(session);
    }
}

#[async_trait::async_trait]
impl SessionEventSource for InMemorySessions {
    async fn most_recent_session_start(
        &self,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .map(|s| s.started_at)
            .filter(|start| *start < before)
            .max())
    }

    async fn replay_historical_sessions(&self) -> AppResult<Vec<SessionRecord>> {
        let mut sessions = self.sessions.read().await.clone();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn session_by_id(&self, id: SessionId) -> AppResult<Option<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    arms: RwLock<BTreeMap<String, String>>,
    vocabulary: RwLock<Option<String>>,
    history_replayed: RwLock<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob stored for `game_id`
    pub async fn arm_blob(&self, game_id: &str) -> Option<String> {
        self.arms.read().await.get(game_id).cloned()
    }

    pub async fn arm_count(&self) -> usize {
        self.arms.read().await.len()
    }

    /// Writes a blob directly, bypassing the engine
    pub async fn put_arm_blob(&self, game_id: impl Into<String>, blob: impl Into<String>) {
        self.arms.write().await.insert(game_id.into(), blob.into());
    }
}

#[async_trait::async_trait]
impl PersistentStore for InMemoryStore {
    async fn load_all_arms(&self) -> AppResult<Vec<StoredArm>> {
        Ok(self
            .arms
            .read()
            .await
            .iter()
            .map(|(game_id, blob)| StoredArm {
                game_id: game_id.clone(),
                blob: blob.clone(),
            })
            .collect())
    }

    async fn save_arm(&self, game_id: &str, blob: String) -> AppResult<()> {
        self.arms.write().await.insert(game_id.to_string(), blob);
        Ok(())
    }

    async fn load_vocabulary(&self) -> AppResult<Option<String>> {
        Ok(self.vocabulary.read().await.clone())
    }

    async fn save_vocabulary(&self, blob: String) -> AppResult<()> {
        *self.vocabulary.write().await = Some(blob);
        Ok(())
    }

    async fn history_replayed(&self) -> AppResult<bool> {
        Ok(*self.history_replayed.read().await)
    }

    async fn mark_history_replayed(&self) -> AppResult<()> {
        *self.history_replayed.write().await = true;
        Ok(())
    }
}

/// Launch telemetry kept in memory
#[derive(Debug, Default)]
pub struct InMemoryLaunchLog {
    launches: RwLock<Vec<(String, DateTime<Utc>)>>,
}

impl InMemoryLaunchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn launches(&self) -> Vec<(String, DateTime<Utc>)> {
        self.launches.read().await.clone()
    }
}

#[async_trait::async_trait]
impl LaunchRecorder for InMemoryLaunchLog {
    async fn record_launch(&self, game_id: &str, launched_at: DateTime<Utc>) -> AppResult<()> {
        self.launches
            .write()
            .await
            .push((game_id.to_string(), launched_at));
        Ok(())
    }
}
