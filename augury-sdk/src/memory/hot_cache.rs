//! Hot Cache
//!
//! Bounded short-term memory of the most recent turns per (user, session),
//! kept in the key-value cache so it survives restarts and can be shared
//! between instances. Entries are stored most-recent-first and trimmed to N
//! on every push; reads return them oldest-first for prompt assembly.
//!
//! The same cache holds the session's cumulative importance counter. Both
//! keys get their TTL refreshed on every write.

use crate::SDKResult;
use crate::config::CacheConfig;
use augury_core::{KvCache, MessageRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One cached turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub user_text: String,
    pub response_text: String,
    pub importance_score: Option<f64>,
    pub created_at: i64,
}

impl From<MessageRecord> for CacheEntry {
    fn from(message: MessageRecord) -> Self {
        Self {
            user_text: message.user_text,
            response_text: message.response_text,
            importance_score: message.importance_score,
            created_at: message.created_at,
        }
    }
}

/// Per-session ring buffer and importance counter over a [`KvCache`]
#[derive(Clone)]
pub struct HotCache {
    cache: Arc<dyn KvCache>,
    config: CacheConfig,
}

impl HotCache {
    pub fn new(cache: Arc<dyn KvCache>, config: CacheConfig) -> Self {
        Self { cache, config }
    }

    /// Maximum entries kept per session
    pub fn capacity(&self) -> usize {
        self.config.hot_cache_size
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_secs)
    }

    pub fn history_key(&self, user_id: &str, session_id: &str) -> String {
        format!("{}:history:{}:{}", self.config.key_prefix, user_id, session_id)
    }

    pub fn importance_key(&self, user_id: &str, session_id: &str) -> String {
        format!("{}:importance:{}:{}", self.config.key_prefix, user_id, session_id)
    }

    /// Insert a turn at the front and trim to capacity
    pub async fn push(&self, user_id: &str, session_id: &str, entry: &CacheEntry) -> SDKResult<()> {
        let key = self.history_key(user_id, session_id);
        let value = serde_json::to_string(entry)?;

        self.cache.list_push_front(&key, value).await?;
        self.cache
            .list_trim(&key, 0, self.capacity() as isize - 1)
            .await?;
        self.cache.expire(&key, self.ttl()).await?;
        Ok(())
    }

    /// Cached turns, oldest first
    pub async fn read(&self, user_id: &str, session_id: &str) -> SDKResult<Vec<CacheEntry>> {
        let key = self.history_key(user_id, session_id);
        let raw = self
            .cache
            .list_range(&key, 0, self.capacity() as isize - 1)
            .await?;

        let mut entries: Vec<CacheEntry> = raw
            .iter()
            .filter_map(|value| match serde_json::from_str(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %key, "skipping malformed cache entry: {}", e);
                    None
                }
            })
            .collect();
        entries.reverse();
        Ok(entries)
    }

    /// Cached turns taken at or after `since` (ms), oldest first.
    ///
    /// A session id reused after its session ended may still have the
    /// earlier session's turns cached; those are left out.
    pub async fn read_since(&self, user_id: &str, session_id: &str, since: i64) -> SDKResult<Vec<CacheEntry>> {
        let mut entries = self.read(user_id, session_id).await?;
        entries.retain(|entry| entry.created_at >= since);
        Ok(entries)
    }

    /// Refill an empty cache from persisted turns (oldest first)
    pub async fn rehydrate(&self, user_id: &str, session_id: &str, entries: &[CacheEntry]) -> SDKResult<()> {
        let skip = entries.len().saturating_sub(self.capacity());
        for entry in &entries[skip..] {
            self.push(user_id, session_id, entry).await?;
        }
        Ok(())
    }

    /// Drop the session's turns and counter
    pub async fn clear(&self, user_id: &str, session_id: &str) -> SDKResult<()> {
        self.cache.delete(&self.history_key(user_id, session_id)).await?;
        self.cache
            .delete(&self.importance_key(user_id, session_id))
            .await?;
        Ok(())
    }

    /// Atomically add to the cumulative importance; returns the new total
    pub async fn add_importance(&self, user_id: &str, session_id: &str, score: f64) -> SDKResult<f64> {
        let key = self.importance_key(user_id, session_id);
        let total = self.cache.incr_by_float(&key, score).await?;
        self.cache.expire(&key, self.ttl()).await?;
        Ok(total)
    }

    /// Current cumulative importance (0 when unset)
    pub async fn importance(&self, user_id: &str, session_id: &str) -> SDKResult<f64> {
        Ok(self
            .cache
            .get_float(&self.importance_key(user_id, session_id))
            .await?
            .unwrap_or(0.0))
    }

    /// Reset the cumulative importance to exactly 0
    pub async fn reset_importance(&self, user_id: &str, session_id: &str) -> SDKResult<()> {
        self.cache
            .set_float(&self.importance_key(user_id, session_id), 0.0)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augury_core::MemoryCache;

    fn entry(i: usize) -> CacheEntry {
        CacheEntry {
            user_text: format!("push {}", i),
            response_text: format!("reply {}", i),
            importance_score: Some(1.0),
            created_at: i as i64,
        }
    }

    fn hot_cache() -> HotCache {
        HotCache::new(Arc::new(MemoryCache::new()), CacheConfig::default())
    }

    #[tokio::test]
    async fn test_fifteen_pushes_keep_last_ten() {
        let cache = hot_cache();
        for i in 1..=15 {
            cache.push("7", "s1", &entry(i)).await.unwrap();
        }

        let entries = cache.read("7", "s1").await.unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].user_text, "push 6");
        assert_eq!(entries[9].user_text, "push 15");
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let cache = hot_cache();
        for i in 1..=25 {
            cache.push("7", "s1", &entry(i)).await.unwrap();
            assert!(cache.read("7", "s1").await.unwrap().len() <= cache.capacity());
        }
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let cache = hot_cache();
        cache.push("7", "s1", &entry(1)).await.unwrap();
        cache.push("7", "s2", &entry(2)).await.unwrap();
        cache.push("8", "s1", &entry(3)).await.unwrap();

        assert_eq!(cache.read("7", "s1").await.unwrap(), vec![entry(1)]);
        assert_eq!(cache.read("7", "s2").await.unwrap(), vec![entry(2)]);
        assert_eq!(cache.history_key("7", "s1"), "augury:history:7:s1");
    }

    #[tokio::test]
    async fn test_rehydrate_keeps_newest() {
        let cache = hot_cache();
        let persisted: Vec<CacheEntry> = (1..=12).map(entry).collect();
        cache.rehydrate("7", "s1", &persisted).await.unwrap();

        let entries = cache.read("7", "s1").await.unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries.first().unwrap().user_text, "push 3");
        assert_eq!(entries.last().unwrap().user_text, "push 12");
    }

    #[tokio::test]
    async fn test_importance_counter() {
        let cache = hot_cache();
        assert_eq!(cache.importance("7", "s1").await.unwrap(), 0.0);
        cache.add_importance("7", "s1", 4.5).await.unwrap();
        assert_eq!(cache.add_importance("7", "s1", 2.0).await.unwrap(), 6.5);

        cache.reset_importance("7", "s1").await.unwrap();
        assert_eq!(cache.importance("7", "s1").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_read_since_drops_older_turns() {
        let cache = hot_cache();
        for i in 1..=4 {
            cache.push("7", "s1", &entry(i)).await.unwrap();
        }

        let entries = cache.read_since("7", "s1", 3).await.unwrap();
        assert_eq!(entries, vec![entry(3), entry(4)]);
        assert!(cache.read_since("7", "s1", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = hot_cache();
        cache.push("7", "s1", &entry(1)).await.unwrap();
        cache.add_importance("7", "s1", 3.0).await.unwrap();
        cache.clear("7", "s1").await.unwrap();

        assert!(cache.read("7", "s1").await.unwrap().is_empty());
        assert_eq!(cache.importance("7", "s1").await.unwrap(), 0.0);
    }
}
