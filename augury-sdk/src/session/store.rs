//! Session store and per-session locks.

use super::ChatSession;
use crate::SDKResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Live chat sessions keyed by session id.
///
/// Injectable so several engine instances can share one backing store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> SDKResult<Option<ChatSession>>;

    /// Insert or replace
    async fn put(&self, session: ChatSession) -> SDKResult<()>;

    /// Remove and return the session, if present
    async fn delete(&self, session_id: &str) -> SDKResult<Option<ChatSession>>;

    /// Sessions idle for longer than `inactivity` at `now`
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        inactivity: Duration,
    ) -> SDKResult<Vec<ChatSession>>;
}

/// In-process [`SessionStore`]
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> SDKResult<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, session: ChatSession) -> SDKResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> SDKResult<Option<ChatSession>> {
        Ok(self.sessions.write().await.remove(session_id))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        inactivity: Duration,
    ) -> SDKResult<Vec<ChatSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_expired(now, inactivity))
            .cloned()
            .collect())
    }
}

/// One async mutex per session id.
///
/// Turns, finalization, and the expiry sweep of a session run under its
/// guard, so they never interleave.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forget the lock of `session_id` when nobody holds or waits on it
    pub async fn prune(&self, session_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Language;
    use augury_core::ChatKind;

    fn session(id: &str, last_active: DateTime<Utc>) -> ChatSession {
        ChatSession {
            session_id: id.to_string(),
            user_id: "7".to_string(),
            kind: ChatKind::Counsellor,
            language: Language::En,
            system_instruction: "be kind".to_string(),
            private: false,
            created_at: last_active,
            last_active,
            turn_count: 0,
        }
    }

    #[tokio::test]
    async fn test_store_crud() {
        let store = MemorySessionStore::new();
        assert!(store.get("s1").await.unwrap().is_none());

        store.put(session("s1", Utc::now())).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap().unwrap().user_id, "7");
        assert_eq!(store.len().await, 1);

        assert!(store.delete("s1").await.unwrap().is_some());
        assert!(store.delete("s1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_expired() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.put(session("old", now - Duration::hours(2))).await.unwrap();
        store.put(session("fresh", now - Duration::minutes(5))).await.unwrap();

        let expired = store.list_expired(now, Duration::hours(1)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, "old");
    }

    #[tokio::test]
    async fn test_locks_serialize_and_prune() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("s1").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // Other sessions are independent
        drop(locks.acquire("s2").await);

        drop(guard);
        waiter.await.unwrap();

        locks.prune("s1").await;
        locks.prune("s2").await;
        assert_eq!(locks.len().await, 0);
    }
}
