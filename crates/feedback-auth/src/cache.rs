//! Short-lived server-side state cache
//!
//! Holds per-login values keyed by browser session (the CAS redirect target).
//! Entries expire after their TTL and are consumed on first read.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::AuthResult;

/// Key-value store with per-entry expiry and take-once reads.
#[async_trait]
pub trait StateCache: Send + Sync {
    /// Store a value, replacing any previous one, for `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()>;

    /// Remove and return a live value.
    async fn take(&self, key: &str) -> AuthResult<Option<String>>;
}

/// In-process cache for single-node deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateCache for MemoryStateCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn take(&self, key: &str) -> AuthResult<Option<String>> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value))
    }
}

#[cfg(feature = "redis")]
pub use redis_cache::RedisStateCache;

#[cfg(feature = "redis")]
mod redis_cache {
    use super::*;
    use crate::error::AuthError;
    use redis::aio::ConnectionManager;

    /// Redis-backed cache shared by every node of a deployment.
    ///
    /// Uses `SET .. EX` for writes and `GETDEL` (Redis 6.2+) for take-once reads.
    #[derive(Clone)]
    pub struct RedisStateCache {
        conn: ConnectionManager,
        key_prefix: String,
    }

    impl std::fmt::Debug for RedisStateCache {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisStateCache")
                .field("key_prefix", &self.key_prefix)
                .finish()
        }
    }

    impl RedisStateCache {
        /// Connect to Redis.
        pub async fn connect(url: &str) -> AuthResult<Self> {
            let client = redis::Client::open(url)
                .map_err(|e| AuthError::ConfigError(format!("invalid REDIS_URL: {e}")))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| AuthError::Internal(format!("Redis connection failed: {e}")))?;

            Ok(Self {
                conn,
                key_prefix: "feedback_sso".to_string(),
            })
        }

        fn key(&self, key: &str) -> String {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    #[async_trait]
    impl StateCache for RedisStateCache {
        async fn put(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()> {
            let mut conn = self.conn.clone();
            let _: () = redis::cmd("SET")
                .arg(self.key(key))
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(|e| AuthError::Internal(format!("Redis SET failed: {e}")))?;
            Ok(())
        }

        async fn take(&self, key: &str) -> AuthResult<Option<String>> {
            let mut conn = self.conn.clone();
            let value: Option<String> = redis::cmd("GETDEL")
                .arg(self.key(key))
                .query_async(&mut conn)
                .await
                .map_err(|e| AuthError::Internal(format!("Redis GETDEL failed: {e}")))?;
            Ok(value)
        }
    }
}
