//! Lookaside cache backend with a local tier and an optional Redis tier.
//!
//! The cache fronts the user repository on the request-authorization path.
//! It owns no business logic: get, set with TTL, nothing else. Backend
//! failures read as misses; the caller owns the repository fallback.

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flightdeck_auth::IdentityCache;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: String,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: String, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache backend: local DashMap, optionally backed by Redis.
///
/// - **Local**: single-instance mode, in-process map only
/// - **Redis**: local map as L1, Redis as L2; L2 hits are promoted to L1
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),

    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
    },
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
        }
    }

    /// Get a value. Expired local entries are evicted on read; Redis
    /// errors are logged and read as misses.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            CacheBackend::Local(map) => map
                .get(key)
                .filter(|entry| !entry.is_expired())
                .map(|entry| entry.data.clone()),
            CacheBackend::Redis { redis, local } => {
                if let Some(entry) = local.get(key) {
                    if !entry.is_expired() {
                        tracing::debug!(key = %key, "cache hit (L1)");
                        return Some(entry.data.clone());
                    }
                    drop(entry);
                    local.remove(key);
                }

                match redis.get().await {
                    Ok(mut conn) => match conn.get::<_, Option<String>>(key).await {
                        Ok(Some(data)) => {
                            tracing::debug!(key = %key, "cache hit (L2)");
                            let entry = CachedEntry::new(data.clone(), Duration::from_secs(3600));
                            local.insert(key.to_string(), entry);
                            Some(data)
                        }
                        Ok(None) => {
                            tracing::debug!(key = %key, "cache miss");
                            None
                        }
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Redis GET error");
                            None
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to get Redis connection");
                        None
                    }
                }
            }
        }
    }

    /// Set a value with TTL. Redis writes are fire-and-forget so a slow or
    /// absent L2 never stalls the write path.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
            }
            CacheBackend::Redis { redis, local } => {
                local.insert(key.to_string(), CachedEntry::new(value.clone(), ttl));

                let redis = redis.clone();
                let key = key.to_string();
                let ttl_secs = ttl.as_secs();
                tokio::spawn(async move {
                    if let Ok(mut conn) = redis.get().await {
                        if let Err(e) = conn.set_ex::<_, _, ()>(&key, &value, ttl_secs).await {
                            tracing::warn!(key = %key, error = %e, "Redis SET error");
                        } else {
                            tracing::debug!(key = %key, ttl_secs = %ttl_secs, "cache set (L1+L2)");
                        }
                    }
                });
            }
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis { .. } => "redis",
        }
    }

    /// Check if Redis is reachable (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { redis, .. } => redis.get().await.is_ok(),
        }
    }
}

#[async_trait]
impl IdentityCache for CacheBackend {
    async fn get(&self, key: &str) -> Option<String> {
        CacheBackend::get(self, key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        CacheBackend::set(self, key, value.to_string(), Duration::from_secs(ttl_secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_set_get() {
        let cache = CacheBackend::new_local();
        cache
            .set("user:admin", "{\"role\":\"admin\"}".into(), Duration::from_secs(60))
            .await;

        assert_eq!(
            cache.get("user:admin").await.as_deref(),
            Some("{\"role\":\"admin\"}")
        );
        assert!(cache.get("user:missing").await.is_none());
    }

    #[tokio::test]
    async fn test_local_entry_expires() {
        let cache = CacheBackend::new_local();
        cache
            .set("user:short", "x".into(), Duration::from_millis(10))
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("user:short").await.is_none());
    }

    #[test]
    fn test_mode() {
        assert_eq!(CacheBackend::new_local().mode(), "local");
    }

    #[tokio::test]
    async fn test_identity_cache_trait_impl() {
        let cache = CacheBackend::new_local();
        IdentityCache::set(&cache, "user:id:1", "payload", 60).await;
        assert_eq!(
            IdentityCache::get(&cache, "user:id:1").await.as_deref(),
            Some("payload")
        );
    }
}
