/// PostgreSQL-backed collaborators
///
/// Reads the launcher's `games` and `play_sessions` tables and writes launch
/// telemetry to `recommendation_launches`. Genre and tag columns are free-form
/// text owned by the launcher and are parsed leniently.
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{parse_term_list, InstalledGame, SessionId, SessionRecord},
    services::providers::{CatalogProvider, LaunchRecorder, SessionEventSource},
};

#[derive(Clone)]
pub struct PostgresProvider {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct GameRow {
    id: String,
    genres: Option<String>,
    tags: Option<String>,
    playtime_minutes: Option<i64>,
    last_played_at: Option<DateTime<Utc>>,
}

impl From<GameRow> for InstalledGame {
    fn from(row: GameRow) -> Self {
        InstalledGame {
            id: row.id,
            genres: parse_term_list(row.genres.as_deref()),
            tags: parse_term_list(row.tags.as_deref()),
            playtime_minutes: row.playtime_minutes.unwrap_or(0).max(0) as u64,
            last_played_at: row.last_played_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    game_id: String,
    started_at: DateTime<Utc>,
    duration_seconds: Option<i64>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            id: row.id,
            game_id: row.game_id,
            started_at: row.started_at,
            duration_seconds: row.duration_seconds,
        }
    }
}

impl PostgresProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogProvider for PostgresProvider {
    async fn list_installed_games(&self) -> AppResult<Vec<InstalledGame>> {
        let rows: Vec<GameRow> = sqlx::query_as(
            r#"
            SELECT id, genres, tags, playtime_minutes, last_played_at
            FROM games
            WHERE installed = TRUE
            ORDER BY sort_order, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = rows.len(), "Loaded installed games");

        Ok(rows.into_iter().map(InstalledGame::from).collect())
    }
}

#[async_trait::async_trait]
impl SessionEventSource for PostgresProvider {
    async fn most_recent_session_start(
        &self,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(started_at) FROM play_sessions WHERE started_at < $1")
                .bind(before)
                .fetch_one(&self.pool)
                .await?;
        Ok(latest)
    }

    async fn replay_historical_sessions(&self) -> AppResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, started_at, duration_seconds
            FROM play_sessions
            ORDER BY started_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn session_by_id(&self, id: SessionId) -> AppResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, game_id, started_at, duration_seconds FROM play_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRecord::from))
    }
}

#[async_trait::async_trait]
impl LaunchRecorder for PostgresProvider {
    async fn record_launch(&self, game_id: &str, launched_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("INSERT INTO recommendation_launches (game_id, launched_at) VALUES ($1, $2)")
            .bind(game_id)
            .bind(launched_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
