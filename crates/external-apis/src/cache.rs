// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Result cache for completed walks, wallet pages and reconciled statistics
//!
//! Two backends sit behind [`ResultCache`]: an in-process bounded TTL map and Redis.
//! Values are stored as JSON. Redis failures never surface to callers; they are logged
//! and treated as a miss.

use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use shared_types::Chain;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);
/// Default capacity of the in-memory backend
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Errors raised while setting up a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis URL could not be parsed
    #[error("Invalid Redis URL: {0}")]
    InvalidUrl(#[from] redis::RedisError),

    /// A value could not be encoded
    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache key for a wallet's NFTs on one chain
pub fn wallet_key(address: &str, chain: Chain) -> String {
    format!("wallet:{address}:{chain}")
}

/// Cache key for a collection walk
pub fn collection_key(collection_id: &str, chain: Chain) -> String {
    format!("collection:{collection_id}:{chain}")
}

/// Cache key for reconciled collection statistics
pub fn stats_key(collection_id: &str, chain: Chain) -> String {
    format!("collection_stats:{collection_id}:{chain}")
}

/// Cached value with access tracking
#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    cached_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
    access_count: u64,
}

impl CachedEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            cached_at: now,
            ttl,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }

    fn accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// Snapshot of in-memory cache counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Live entries, including ones that expired but were not swept yet
    pub entry_count: usize,
    /// Successful lookups
    pub hits: u64,
    /// Failed lookups, including expired entries
    pub misses: u64,
    /// Writes
    pub stores: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped because their TTL ran out
    pub expired: u64,
    /// `hits / (hits + misses)`
    pub hit_rate: f64,
    /// `entry_count / max_entries`
    pub utilization_rate: f64,
    /// Configured capacity
    pub max_capacity: usize,
}

/// Bounded in-process TTL cache with LRU eviction
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
    max_entries: usize,
    stats: DashMap<&'static str, u64>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` values
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            stats: DashMap::new(),
        }
    }

    /// Look up a live value
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(mut cached) = self.entries.get_mut(key) {
            if cached.is_valid() {
                cached.accessed();
                self.increment_stat("hits");
                trace!(key, access_count = cached.access_count, "memory cache hit");
                return Some(cached.value.clone());
            }
            drop(cached);
            self.entries.remove(key);
            self.increment_stat("expired");
            debug!(key, "expired cache entry removed");
        }

        self.increment_stat("misses");
        None
    }

    /// Store a value for `ttl`
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let current_size = self.entries.len();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let capacity_threshold = (self.max_entries as f64 * 0.9) as usize;

        if !self.entries.contains_key(key) {
            if current_size >= capacity_threshold {
                self.cleanup_expired();
            }
            if self.entries.len() >= self.max_entries {
                self.evict_least_recently_used();
            }
        }

        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        self.increment_stat("stores");
        trace!(
            key,
            ttl_secs = ttl.as_secs(),
            size = self.entries.len(),
            max_entries = self.max_entries,
            "stored value in memory cache"
        );
    }

    /// Drop a key
    pub fn delete(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!(key, "deleted cache entry");
        }
    }

    /// Drop everything, counters included
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_least_recently_used(&self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|item| (item.value().last_accessed, item.value().access_count))
            .map(|item| item.key().clone());

        if let Some(key) = lru_key
            && let Some((_, entry)) = self.entries.remove(&key)
        {
            self.increment_stat("evictions");
            info!(
                key = %key,
                access_count = entry.access_count,
                age_ms = entry.cached_at.elapsed().as_millis(),
                remaining_entries = self.entries.len(),
                "evicted lru cache entry due to capacity limit"
            );
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|item| !item.value().is_valid())
            .map(|item| item.key().clone())
            .collect();

        let removed = expired
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();

        if removed > 0 {
            let count = u64::try_from(removed).unwrap_or(u64::MAX);
            self.stats
                .entry("expired")
                .and_modify(|v| *v += count)
                .or_insert(count);
            info!(
                removed_entries = removed,
                remaining_entries = self.entries.len(),
                "proactively cleaned up expired cache entries"
            );
        }
        removed
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let hits = self.get_stat("hits");
        let misses = self.get_stat("misses");
        let total = hits + misses;
        let entry_count = self.entries.len();

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let utilization_rate = entry_count as f64 / self.max_entries as f64;

        CacheStats {
            entry_count,
            hits,
            misses,
            stores: self.get_stat("stores"),
            evictions: self.get_stat("evictions"),
            expired: self.get_stat("expired"),
            hit_rate,
            utilization_rate,
            max_capacity: self.max_entries,
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats.entry(key).and_modify(|v| *v += 1).or_insert(1);
    }

    fn get_stat(&self, key: &str) -> u64 {
        self.stats.get(key).map_or(0, |v| *v)
    }
}

/// Redis-backed cache; the connection is opened on first use and reused
pub struct RedisCache {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

/// Redis `EX` argument; whole seconds, at least one
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisCache {
    /// Create a cache for `url` without connecting
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid Redis URL
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: Client::open(url)?,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        let result = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("connected to redis");
                Ok::<_, redis::RedisError>(manager)
            })
            .await;
        match result {
            Ok(connection) => Some(connection.clone()),
            Err(e) => {
                warn!(error = %e, "redis connection failed, treating as cache miss");
                None
            }
        }
    }

    /// Look up a value
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    trace!(key, "redis cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "redis GET failed, treating as cache miss");
                None
            }
        }
    }

    /// Store a value for `ttl`
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value.to_string(), expiry_seconds(ttl))
            .await
        {
            warn!(key, error = %e, "redis SET failed");
        }
    }

    /// Drop a key
    pub async fn delete(&self, key: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!(key, error = %e, "redis DEL failed");
        }
    }
}

/// Backend kind selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process map
    #[default]
    Memory,
    /// Redis server
    Redis,
}

impl Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug)]
enum Store {
    Memory(MemoryCache),
    Redis(RedisCache),
}

/// Result cache with a default TTL over either backend
#[derive(Debug)]
pub struct ResultCache {
    store: Store,
    ttl: Duration,
}

impl ResultCache {
    /// In-memory cache
    pub fn memory(max_entries: usize, ttl: Duration) -> Self {
        Self {
            store: Store::Memory(MemoryCache::new(max_entries)),
            ttl,
        }
    }

    /// Redis cache
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid Redis URL
    pub fn redis(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            store: Store::Redis(RedisCache::new(url)?),
            ttl,
        })
    }

    /// Which backend is in use
    pub fn backend(&self) -> CacheBackend {
        match self.store {
            Store::Memory(_) => CacheBackend::Memory,
            Store::Redis(_) => CacheBackend::Redis,
        }
    }

    /// Default entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// In-memory counters, when the memory backend is in use
    pub fn memory_stats(&self) -> Option<CacheStats> {
        match &self.store {
            Store::Memory(cache) => Some(cache.stats()),
            Store::Redis(_) => None,
        }
    }

    /// Raw lookup
    pub async fn get(&self, key: &str) -> Option<Value> {
        match &self.store {
            Store::Memory(cache) => cache.get(key),
            Store::Redis(cache) => cache.get(key).await,
        }
    }

    /// Raw store with an explicit TTL
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        match &self.store {
            Store::Memory(cache) => cache.set(key, value, ttl),
            Store::Redis(cache) => cache.set(key, &value, ttl).await,
        }
    }

    /// Drop a key
    pub async fn delete(&self, key: &str) {
        match &self.store {
            Store::Memory(cache) => cache.delete(key),
            Store::Redis(cache) => cache.delete(key).await,
        }
    }

    /// Typed lookup; entries that no longer decode are treated as a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, error = %e, "cached value has an unexpected shape");
                None
            }
        }
    }

    /// Typed store with the default TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let encoded = serde_json::to_value(value)?;
        self.set(key, encoded, self.ttl).await;
        Ok(())
    }
}
