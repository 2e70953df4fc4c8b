//! Key-value cache collaborator.
//!
//! The memory engine keeps two kinds of short-lived state outside the
//! process: the per-session hot cache (a list) and the cumulative importance
//! counter (a float). Both are addressed by string keys so the same engine
//! can run against the in-process [`MemoryCache`] or a shared Redis
//! (`redis` feature).
//!
//! List indices follow Redis semantics: negative values count from the end,
//! and `stop` is inclusive.

#[cfg(feature = "redis")]
mod redis_cache;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// List and counter operations, scoped by key
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Insert at the head of a list; returns the new length
    async fn list_push_front(&self, key: &str, value: String) -> Result<usize>;

    /// Keep only the elements in `[start, stop]`
    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()>;

    /// Elements in `[start, stop]`, head first
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// Remove a key of any type
    async fn delete(&self, key: &str) -> Result<()>;

    /// Set a time-to-live on an existing key
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Atomically add to a float counter (missing counts as 0); returns the new value
    async fn incr_by_float(&self, key: &str, delta: f64) -> Result<f64>;

    /// Current counter value
    async fn get_float(&self, key: &str) -> Result<Option<f64>>;

    /// Overwrite a counter
    async fn set_float(&self, key: &str, value: f64) -> Result<()>;
}

/// Resolve Redis-style inclusive indices against a list length
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[derive(Debug, Clone)]
enum CacheValue {
    List(VecDeque<String>),
    Float(f64),
}

#[derive(Debug)]
struct CacheSlot {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheSlot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache with lazy TTL eviction
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn wrong_type(key: &str) -> Error {
        Error::cache(format!(
            "WRONGTYPE operation against key '{}' holding the wrong kind of value",
            key
        ))
    }

    fn evict_expired(slots: &mut HashMap<String, CacheSlot>, key: &str) {
        if slots.get(key).is_some_and(|slot| slot.is_expired(Instant::now())) {
            slots.remove(key);
        }
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn list_push_front(&self, key: &str, value: String) -> Result<usize> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);

        let slot = slots.entry(key.to_string()).or_insert_with(|| CacheSlot {
            value: CacheValue::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut slot.value {
            CacheValue::List(list) => {
                list.push_front(value);
                Ok(list.len())
            }
            CacheValue::Float(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);

        let Some(slot) = slots.get_mut(key) else {
            return Ok(());
        };
        let CacheValue::List(list) = &mut slot.value else {
            return Err(Self::wrong_type(key));
        };

        match resolve_range(list.len(), start, stop) {
            Some((start, stop)) => {
                list.truncate(stop + 1);
                list.drain(..start);
            }
            None => list.clear(),
        }
        if list.is_empty() {
            slots.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);

        let Some(slot) = slots.get(key) else {
            return Ok(Vec::new());
        };
        let CacheValue::List(list) = &slot.value else {
            return Err(Self::wrong_type(key));
        };

        Ok(match resolve_range(list.len(), start, stop) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.slots.lock().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);
        if let Some(slot) = slots.get_mut(key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn incr_by_float(&self, key: &str, delta: f64) -> Result<f64> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);

        let slot = slots.entry(key.to_string()).or_insert_with(|| CacheSlot {
            value: CacheValue::Float(0.0),
            expires_at: None,
        });
        match &mut slot.value {
            CacheValue::Float(value) => {
                *value += delta;
                Ok(*value)
            }
            CacheValue::List(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn get_float(&self, key: &str) -> Result<Option<f64>> {
        let mut slots = self.slots.lock().await;
        Self::evict_expired(&mut slots, key);

        match slots.get(key).map(|slot| &slot.value) {
            None => Ok(None),
            Some(CacheValue::Float(value)) => Ok(Some(*value)),
            Some(CacheValue::List(_)) => Err(Self::wrong_type(key)),
        }
    }

    async fn set_float(&self, key: &str, value: f64) -> Result<()> {
        let mut slots = self.slots.lock().await;
        let expires_at = slots
            .get(key)
            .filter(|slot| matches!(slot.value, CacheValue::Float(_)))
            .and_then(|slot| slot.expires_at);
        slots.insert(
            key.to_string(),
            CacheSlot {
                value: CacheValue::Float(value),
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 9), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
    }

    #[tokio::test]
    async fn test_list_push_trim_range() {
        let cache = MemoryCache::new();
        for i in 1..=5 {
            cache.list_push_front("k", i.to_string()).await.unwrap();
        }
        cache.list_trim("k", 0, 2).await.unwrap();

        let values = cache.list_range("k", 0, -1).await.unwrap();
        assert_eq!(values, vec!["5", "4", "3"]);
        assert!(cache.list_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counter_ops() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get_float("c").await.unwrap(), None);
        assert_eq!(cache.incr_by_float("c", 2.5).await.unwrap(), 2.5);
        assert_eq!(cache.incr_by_float("c", 1.0).await.unwrap(), 3.5);
        cache.set_float("c", 0.0).await.unwrap();
        assert_eq!(cache.get_float("c").await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = MemoryCache::new();
        cache.list_push_front("k", "v".into()).await.unwrap();
        assert!(cache.incr_by_float("k", 1.0).await.is_err());
        assert!(cache.get_float("k").await.is_err());
    }

    #[tokio::test]
    async fn test_expire_evicts_lazily() {
        let cache = MemoryCache::new();
        cache.list_push_front("k", "v".into()).await.unwrap();
        cache.expire("k", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.len().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.list_range("k", 0, -1).await.unwrap().is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache.incr_by_float("c", 1.0).await.unwrap();
        cache.delete("c").await.unwrap();
        assert_eq!(cache.get_float("c").await.unwrap(), None);
    }
}
