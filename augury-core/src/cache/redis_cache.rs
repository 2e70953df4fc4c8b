//! Redis-backed cache for multi-instance deployments.

use super::KvCache;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// [`KvCache`] over a shared Redis server
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis://host:port/db`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn list_push_front(&self, key: &str, value: String) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async::<usize>(&mut conn)
            .await?)
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<Vec<String>>(&mut conn)
            .await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn incr_by_float(&self, key: &str, delta: f64) -> Result<f64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("INCRBYFLOAT")
            .arg(key)
            .arg(delta)
            .query_async::<f64>(&mut conn)
            .await?)
    }

    async fn get_float(&self, key: &str) -> Result<Option<f64>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(key)
            .query_async::<Option<f64>>(&mut conn)
            .await?)
    }

    async fn set_float(&self, key: &str, value: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("KEEPTTL")
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
