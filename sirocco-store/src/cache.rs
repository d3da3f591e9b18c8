//! Redis snapshot cache.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sirocco_core::config::RedisConfig;
use sirocco_engine::data::Data;
use sirocco_engine::ports::{CacheError, SnapshotCache};
use tracing::info;

use crate::ConnectError;

/// Redis-backed [`SnapshotCache`].
///
/// Entries live under `portfolio:<name>` as JSON with no TTL. The handle is
/// shared across portfolios; key disjointness removes contention.
#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: ConnectionManager,
}

impl RedisSnapshotCache {
    /// Wraps an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(portfolio: &str) -> String {
        format!("portfolio:{portfolio}")
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, portfolio: &str) -> Result<Option<Data>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(portfolio))
            .await
            .map_err(CacheError::new)?;
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(CacheError::new),
        }
    }

    async fn save(&self, portfolio: &str, data: &Data) -> Result<(), CacheError> {
        let body = serde_json::to_string(data).map_err(CacheError::new)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(Self::key(portfolio), body)
            .await
            .map_err(CacheError::new)?;
        Ok(())
    }

    async fn delete(&self, portfolio: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::key(portfolio))
            .await
            .map_err(CacheError::new)?;
        Ok(())
    }
}

/// Opens a managed Redis connection and verifies it with a ping.
///
/// # Errors
///
/// Returns [`ConnectError::Redis`] when Redis is unreachable; boot treats
/// this as fatal.
pub async fn connect_redis(config: &RedisConfig) -> Result<ConnectionManager, ConnectError> {
    let client =
        redis::Client::open(config.url()).map_err(|e| ConnectError::Redis(e.to_string()))?;
    let mut conn = client
        .get_connection_manager()
        .await
        .map_err(|e| ConnectError::Redis(e.to_string()))?;

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| ConnectError::Redis(e.to_string()))?;

    info!(host = %config.host, "Redis connection ready");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(RedisSnapshotCache::key("main"), "portfolio:main");
    }
}
