//! Read-through document cache.
//!
//! The stores put one of these in front of their backing document store:
//!
//! - [`MemoryCache`]: per-process TTL map (default, 5 minutes)
//! - [`RedisCache`]: shared cache for deployments with more than one instance
//! - [`NoCache`]: every read goes to the store
//!
//! Cache failures never fail a request. They are logged and treated as a miss.
//! Nothing that needs an up-to-date view of a document (revision-checked
//! writes) reads through the cache.
//!
//! Entries carry the store revision they were read or written at. A write
//! carrying an older revision than the entry already cached is dropped, so
//! overlapping writers cannot leave a superseded document behind.

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::{KeysInterface, LuaInterface};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default entry lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache capability injected into the stores.
#[async_trait]
pub trait DocumentCache: Send + Sync {
    /// Look up a cached document.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a document at `revision`, unless a newer revision is cached.
    async fn set(&self, key: &str, revision: i64, value: &Value);

    /// Drop a document from the cache.
    async fn invalidate(&self, key: &str);
}

/// Cache error type.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    revision: i64,
    expires_at: Instant,
}

/// In-memory TTL cache.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, 1024)
    }
}

#[async_trait]
impl DocumentCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(key = %key, "Cache hit");
                Some(entry.value.clone())
            }
            _ => {
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, revision: i64, value: &Value) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(key)
            && existing.revision > revision
        {
            debug!(key = %key, cached = existing.revision, revision, "Skipping stale cache write");
            return;
        }

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            entries.retain(|_, entry| entry.expires_at > now);
            // Still full: evict whatever expires soonest.
            if entries.len() >= self.max_entries
                && let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                revision,
                expires_at: now + self.ttl,
            },
        );
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Sets `KEYS[1]` to `ARGV[2]` with a TTL of `ARGV[3]` seconds unless the
/// entry already there holds a revision newer than `ARGV[1]`.
const SET_IF_NOT_NEWER: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, entry = pcall(cjson.decode, current)
  if ok and type(entry) == 'table' and tonumber(entry.revision)
    and tonumber(entry.revision) > tonumber(ARGV[1]) then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
";

#[derive(Serialize, Deserialize)]
struct RedisEntry {
    revision: i64,
    body: Value,
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    redis: Arc<RedisClient>,
    prefix: String,
    ttl_secs: i64,
}

impl RedisCache {
    /// Create a Redis cache.
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            ttl_secs: ttl.as_secs().max(1) as i64,
        }
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:doc:{key}", self.prefix)
    }

    async fn try_get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw: Option<String> = self
            .redis
            .get(self.cache_key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))?;

        raw.map(|json| {
            serde_json::from_str::<RedisEntry>(&json)
                .map(|entry| entry.body)
                .map_err(|e| CacheError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn try_set(&self, key: &str, revision: i64, value: &Value) -> Result<bool, CacheError> {
        let json = serde_json::to_string(&RedisEntry {
            revision,
            body: value.clone(),
        })
        .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let written: i64 = self
            .redis
            .eval(
                SET_IF_NOT_NEWER,
                self.cache_key(key),
                vec![revision.to_string(), json, self.ttl_secs.to_string()],
            )
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))?;

        Ok(written == 1)
    }

    async fn try_invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.redis
            .del::<(), _>(self.cache_key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }
}

#[async_trait]
impl DocumentCache for RedisCache {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.try_get(key).await {
            Ok(hit) => {
                debug!(key = %key, hit = hit.is_some(), "Redis cache lookup");
                hit
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis cache read failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, revision: i64, value: &Value) {
        match self.try_set(key, revision, value).await {
            Ok(true) => {}
            Ok(false) => debug!(key = %key, revision, "Skipping stale cache write"),
            Err(e) => warn!(key = %key, error = %e, "Redis cache write failed"),
        }
    }

    async fn invalidate(&self, key: &str) {
        if let Err(e) = self.try_invalidate(key).await {
            warn!(key = %key, error = %e, "Redis cache invalidation failed");
        }
    }
}

/// Cache that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl DocumentCache for NoCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _revision: i64, _value: &Value) {}

    async fn invalidate(&self, _key: &str) {}
}
