//! Durable persistence consumed by the engine.
//!
//! Player statistics and the topic catalog live in relational storage owned
//! by another service; this module only defines the calls the engine makes
//! against it, plus an in-memory implementation for development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Result type for durable-store operations
pub type DurableResult<T> = Result<T, DurableError>;

#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    #[error("query failed: {0}")]
    Query(String),
}

/// Cumulative per-user match statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
}

/// Increment applied to a user's stats when a match finishes.
#[derive(Debug, Clone, Copy)]
pub struct UserStatsDelta {
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
}

/// A topic from the catalog, used as fallback when a round has no proposals.
#[derive(Debug, Clone)]
pub struct StoredTopic {
    pub title: String,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Upsert a user's running statistics record.
    async fn upsert_user_stats(&self, user_id: &str, delta: UserStatsDelta) -> DurableResult<()>;

    async fn user_stats(&self, user_id: &str) -> DurableResult<Option<UserStats>>;

    /// Pick any topic from the catalog, or `None` if the catalog is empty.
    async fn find_random_topic(&self) -> DurableResult<Option<StoredTopic>>;

    /// Resolve display names for the given users. Unknown users are simply
    /// absent from the result.
    async fn member_usernames(
        &self,
        user_ids: &[String],
    ) -> DurableResult<HashMap<String, String>>;
}

#[derive(Default)]
struct MemoryInner {
    stats: HashMap<String, UserStats>,
    usernames: HashMap<String, String>,
    topics: Vec<String>,
}

/// In-memory [`DurableStore`] used in development mode and by tests.
#[derive(Default)]
pub struct InMemoryDurableStore {
    inner: Mutex<MemoryInner>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topics(topics: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                topics,
                ..Default::default()
            }),
        }
    }

    pub async fn insert_username(&self, user_id: &str, username: &str) {
        self.inner
            .lock()
            .await
            .usernames
            .insert(user_id.to_string(), username.to_string());
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn upsert_user_stats(&self, user_id: &str, delta: UserStatsDelta) -> DurableResult<()> {
        let mut inner = self.inner.lock().await;
        let stats = inner.stats.entry(user_id.to_string()).or_default();
        stats.games_played += delta.games_played;
        stats.games_won += delta.games_won;
        stats.games_lost += delta.games_lost;
        Ok(())
    }

    async fn user_stats(&self, user_id: &str) -> DurableResult<Option<UserStats>> {
        Ok(self.inner.lock().await.stats.get(user_id).copied())
    }

    async fn find_random_topic(&self) -> DurableResult<Option<StoredTopic>> {
        let inner = self.inner.lock().await;
        Ok(inner.topics.first().map(|title| StoredTopic {
            title: title.clone(),
        }))
    }

    async fn member_usernames(
        &self,
        user_ids: &[String],
    ) -> DurableResult<HashMap<String, String>> {
        let inner = self.inner.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| inner.usernames.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_accumulates_across_matches() {
        let store = InMemoryDurableStore::new();
        store
            .upsert_user_stats(
                "u1",
                UserStatsDelta {
                    games_played: 1,
                    games_won: 1,
                    games_lost: 0,
                },
            )
            .await
            .unwrap();
        store
            .upsert_user_stats(
                "u1",
                UserStatsDelta {
                    games_played: 1,
                    games_won: 0,
                    games_lost: 1,
                },
            )
            .await
            .unwrap();

        let stats = store.user_stats("u1").await.unwrap().unwrap();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.games_won, 1);
        assert_eq!(stats.games_lost, 1);
    }

    #[tokio::test]
    async fn random_topic_is_none_on_empty_catalog() {
        let store = InMemoryDurableStore::new();
        assert!(store.find_random_topic().await.unwrap().is_none());

        let seeded = InMemoryDurableStore::with_topics(vec!["Space".to_string()]);
        assert_eq!(
            seeded.find_random_topic().await.unwrap().unwrap().title,
            "Space"
        );
    }
}
