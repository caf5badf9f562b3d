use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::ServiceError;

/// Cache operations needed by the visibility index, editability flags and
/// snapshot cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Add `member` to the sorted set at `key` and reset the whole key's
    /// expiry to `ttl_seconds`.
    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_seconds: u64,
    ) -> Result<(), ServiceError>;

    /// Members with score in `[min, max]`, highest score first.
    async fn sorted_set_range_desc(
        &self,
        key: &str,
        min: i64,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, ServiceError>;

    async fn exists(&self, key: &str) -> Result<bool, ServiceError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), ServiceError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RedisCache {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sorted_set_range_desc(
        &self,
        key: &str,
        min: i64,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, ServiceError> {
        let mut conn = self.manager.clone();
        let entries: Vec<(String, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg(min)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(offset)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, ServiceError> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-memory cache for tests. Keys never expire on their own; use
/// [`MockCache::expire`] to simulate it.
#[derive(Default)]
pub struct MockCache {
    sorted_sets: Mutex<HashMap<String, Vec<(String, i64)>>>,
    values: Mutex<HashMap<String, Vec<u8>>>,
    ttls: Mutex<HashMap<String, (u64, usize)>>,
    unavailable: AtomicBool,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every cache call fail with `CacheUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop a key as if its TTL had elapsed.
    pub fn expire(&self, key: &str) {
        if let Ok(mut sets) = self.sorted_sets.lock() {
            sets.remove(key);
        }
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }

    /// Last TTL written for `key` and how many times it has been written.
    pub fn ttl(&self, key: &str) -> Option<(u64, usize)> {
        self.ttls.lock().ok()?.get(key).copied()
    }

    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value);
        }
    }

    pub fn members(&self, key: &str) -> Vec<String> {
        self.sorted_sets
            .lock()
            .ok()
            .and_then(|sets| sets.get(key).cloned())
            .map(|set| set.into_iter().map(|(member, _)| member).collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::CacheUnavailable(
                "Mock cache is unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn record_ttl(&self, key: &str, ttl_seconds: u64) -> Result<(), ServiceError> {
        let mut ttls = lock(&self.ttls)?;
        let entry = ttls.entry(key.to_string()).or_insert((ttl_seconds, 0));
        entry.0 = ttl_seconds;
        entry.1 += 1;
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    m.lock()
        .map_err(|e| ServiceError::CacheUnavailable(format!("Mock cache mutex poisoned: {}", e)))
}

#[async_trait]
impl CacheBackend for MockCache {
    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        self.check_available()?;
        {
            let mut sets = lock(&self.sorted_sets)?;
            let set = sets.entry(key.to_string()).or_default();
            match set.iter_mut().find(|(m, _)| m == member) {
                Some(existing) => existing.1 = score,
                None => set.push((member.to_string(), score)),
            }
        }
        self.record_ttl(key, ttl_seconds)
    }

    async fn sorted_set_range_desc(
        &self,
        key: &str,
        min: i64,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, ServiceError> {
        self.check_available()?;
        let sets = lock(&self.sorted_sets)?;
        let mut entries: Vec<(String, i64)> = sets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, score)| (min..=max).contains(score))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // ZREVRANGEBYSCORE order: score desc, then member desc
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, ServiceError> {
        self.check_available()?;
        Ok(lock(&self.sorted_sets)?.contains_key(key) || lock(&self.values)?.contains_key(key))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), ServiceError> {
        self.check_available()?;
        lock(&self.values)?.insert(key.to_string(), value.to_vec());
        self.record_ttl(key, ttl_seconds)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        self.check_available()?;
        Ok(lock(&self.values)?.get(key).cloned())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.check_available()
    }
}
