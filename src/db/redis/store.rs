use redis::AsyncCommands;
use redis::Client;
use std::collections::HashMap;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::services::providers::{PersistentStore, StoredArm};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Hash of game id → arm blob
    Arms,
    Vocabulary,
    /// Present once a full history replay has been stored
    HistoryReplayed,
}

impl StoreKey {
    fn with_prefix(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self)
    }
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Arms => write!(f, "arms"),
            StoreKey::Vocabulary => write!(f, "vocabulary"),
            StoreKey::HistoryReplayed => write!(f, "history-replayed"),
        }
    }
}

/// Creates a Redis client for the arm store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous store writes
#[derive(Debug)]
enum StoreWrite {
    Arm { game_id: String, blob: String },
    Vocabulary { blob: String },
    HistoryReplayed,
}

/// Arm store backed by Redis
///
/// Reads go straight to Redis. Writes are queued to a background task so a
/// session update does not wait on the network round trip.
#[derive(Clone)]
pub struct RedisStore {
    redis_client: Client,
    prefix: String,
    write_tx: mpsc::UnboundedSender<StoreWrite>,
}

/// Handle for gracefully shutting down the store writer
pub struct StoreWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl StoreWriterHandle {
    /// Signals the writer task and waits until every queued write is flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Store writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Store writer task failed during shutdown");
        }
    }
}

impl RedisStore {
    /// Creates a new store and spawns its background writer
    pub async fn new(redis_client: Client, prefix: impl Into<String>) -> (Self, StoreWriterHandle) {
        let prefix = prefix.into();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let writer_prefix = prefix.clone();
        let task = tokio::spawn(async move {
            Self::writer_task(client, writer_prefix, write_rx, shutdown_rx).await;
        });

        let store = Self {
            redis_client,
            prefix,
            write_tx,
        };

        (store, StoreWriterHandle { shutdown_tx, task })
    }

    /// Applies queued writes until shutdown, then drains what is left
    async fn writer_task(
        client: Client,
        prefix: String,
        mut write_rx: mpsc::UnboundedReceiver<StoreWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Store writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, &prefix, msg).await {
                        tracing::error!(error = %e, "Failed to write to arm store");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, &prefix, msg).await {
                            tracing::error!(error = %e, "Failed to flush arm store write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }
                    tracing::info!(flushed, "Store writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, prefix: &str, msg: StoreWrite) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        match msg {
            StoreWrite::Arm { game_id, blob } => {
                let _: () = conn
                    .hset(StoreKey::Arms.with_prefix(prefix), &game_id, blob)
                    .await?;
                tracing::debug!(game_id = %game_id, "Arm persisted");
            }
            StoreWrite::Vocabulary { blob } => {
                let _: () = conn
                    .set(StoreKey::Vocabulary.with_prefix(prefix), blob)
                    .await?;
            }
            StoreWrite::HistoryReplayed => {
                let _: () = conn
                    .set(StoreKey::HistoryReplayed.with_prefix(prefix), 1)
                    .await?;
                tracing::debug!("History replay marker persisted");
            }
        }
        Ok(())
    }

    fn enqueue(&self, msg: StoreWrite) -> AppResult<()> {
        self.write_tx.send(msg).map_err(|e| {
            tracing::error!(error = %e, "Failed to queue arm store write");
            AppError::Internal("Arm store writer is not running".to_string())
        })
    }
}

#[async_trait::async_trait]
impl PersistentStore for RedisStore {
    async fn load_all_arms(&self) -> AppResult<Vec<StoredArm>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let entries: HashMap<String, String> =
            conn.hgetall(StoreKey::Arms.with_prefix(&self.prefix)).await?;

        Ok(entries
            .into_iter()
            .map(|(game_id, blob)| StoredArm { game_id, blob })
            .collect())
    }

    async fn save_arm(&self, game_id: &str, blob: String) -> AppResult<()> {
        self.enqueue(StoreWrite::Arm {
            game_id: game_id.to_string(),
            blob,
        })
    }

    async fn load_vocabulary(&self) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let blob: Option<String> = conn.get(StoreKey::Vocabulary.with_prefix(&self.prefix)).await?;
        Ok(blob)
    }

    async fn save_vocabulary(&self, blob: String) -> AppResult<()> {
        self.enqueue(StoreWrite::Vocabulary { blob })
    }

    async fn history_replayed(&self) -> AppResult<bool> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let replayed: bool = conn
            .exists(StoreKey::HistoryReplayed.with_prefix(&self.prefix))
            .await?;
        Ok(replayed)
    }

    // Queued behind the arm writes it vouches for.
    async fn mark_history_replayed(&self) -> AppResult<()> {
        self.enqueue(StoreWrite::HistoryReplayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_display() {
        assert_eq!(StoreKey::Arms.to_string(), "arms");
        assert_eq!(StoreKey::Vocabulary.to_string(), "vocabulary");
        assert_eq!(StoreKey::HistoryReplayed.to_string(), "history-replayed");
    }

    #[test]
    fn test_store_key_prefix() {
        assert_eq!(StoreKey::Arms.with_prefix("playnext"), "playnext:arms");
        assert_eq!(StoreKey::Vocabulary.with_prefix("test"), "test:vocabulary");
    }

    // Needs a running Redis; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_saved_arm_is_flushed_on_shutdown() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        let prefix = format!("playnext-test-{}", uuid::Uuid::new_v4());
        let (store, handle) = RedisStore::new(client.clone(), prefix.clone()).await;

        store.save_arm("celeste", "{\"v\":1}".to_string()).await.unwrap();
        store.save_vocabulary("{}".to_string()).await.unwrap();
        assert!(!store.history_replayed().await.unwrap());
        store.mark_history_replayed().await.unwrap();
        handle.shutdown().await;

        let arms = store.load_all_arms().await.unwrap();
        assert_eq!(
            arms,
            vec![StoredArm {
                game_id: "celeste".to_string(),
                blob: "{\"v\":1}".to_string()
            }]
        );
        assert_eq!(store.load_vocabulary().await.unwrap().as_deref(), Some("{}"));
        assert!(store.history_replayed().await.unwrap());

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(StoreKey::Arms.with_prefix(&prefix)).await.unwrap();
        let _: () = conn.del(StoreKey::Vocabulary.with_prefix(&prefix)).await.unwrap();
        let _: () = conn.del(StoreKey::HistoryReplayed.with_prefix(&prefix)).await.unwrap();
    }
}
