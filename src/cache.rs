//! Read-through cache in front of a table source.
//!
//! ## Semantics
//!
//! - Hit: serve the cached bytes if the entry decodes
//! - Miss (or undecodable entry): fetch from origin, re-encode for storage,
//!   store best-effort, and serve the freshly fetched bytes whether or not
//!   the store succeeded
//!
//! Entries are inserted whole under the write lock, so a reader never sees a
//! partially written entry. Two concurrent misses on one key both hit the
//! origin and the later insert wins; that only costs a duplicate fetch.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use parking_lot::RwLock;
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::{TableKey, TableSource};

/// Configuration for the table byte cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of tables kept.
    pub max_entries: usize,
    /// Whether to cache at all.
    pub enabled: bool,
    /// Whether to gzip entries before storing them.
    pub compress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            enabled: true,
            compress: true,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Fetches served from cache.
    pub hits: u64,
    /// Fetches that went to the origin.
    pub misses: u64,
    /// Entries that could not be stored.
    pub store_failures: u64,
}

#[derive(Debug)]
struct CacheEntry {
    bytes: Vec<u8>,
    compressed: bool,
}

impl CacheEntry {
    fn encode(raw: &[u8], compress: bool) -> io::Result<Self> {
        if !compress {
            return Ok(Self {
                bytes: raw.to_vec(),
                compressed: false,
            });
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(raw)?;
        Ok(Self {
            bytes: encoder.finish()?,
            compressed: true,
        })
    }

    fn decode(&self) -> io::Result<Vec<u8>> {
        if !self.compressed {
            return Ok(self.bytes.clone());
        }
        let mut raw = Vec::new();
        GzDecoder::new(self.bytes.as_slice()).read_to_end(&mut raw)?;
        Ok(raw)
    }
}

/// A table source with an in-process LRU in front of it.
///
/// Implements [`TableSource`] itself, so it drops in wherever the origin did.
pub struct CachedTableSource<S: TableSource> {
    origin: S,
    config: CacheConfig,
    cache: Option<RwLock<LruCache<String, Arc<CacheEntry>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
}

impl<S: TableSource> CachedTableSource<S> {
    /// Wrap an origin with the default configuration.
    pub fn new(origin: S) -> Self {
        Self::with_config(origin, CacheConfig::default())
    }

    /// Wrap an origin with a custom configuration.
    pub fn with_config(origin: S, config: CacheConfig) -> Self {
        let cache = if config.enabled {
            let size = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
            Some(RwLock::new(LruCache::new(size)))
        } else {
            None
        };

        Self {
            origin,
            config,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
        }
    }

    /// The wrapped origin.
    pub fn origin(&self) -> &S {
        &self.origin
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
                store_failures: self.store_failures.load(Ordering::Relaxed),
            }
        })
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }

    fn lookup(&self, cache_key: &str) -> Option<Vec<u8>> {
        let cache = self.cache.as_ref()?;
        // `get` promotes the entry, so it takes the write lock.
        let entry = cache.write().get(cache_key).cloned()?;

        match entry.decode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Cached table entry unreadable, evicting");
                cache.write().pop(cache_key);
                None
            }
        }
    }

    fn store(&self, cache_key: String, raw: &[u8]) {
        let Some(cache) = &self.cache else {
            return;
        };

        match CacheEntry::encode(raw, self.config.compress) {
            Ok(entry) => {
                if entry.compressed && !raw.is_empty() {
                    debug!(
                        key = %cache_key,
                        ratio_pct = 100.0 * entry.bytes.len() as f64 / raw.len() as f64,
                        "Table compressed for cache"
                    );
                }
                cache.write().put(cache_key, Arc::new(entry));
            }
            Err(e) => {
                self.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %cache_key, error = %e, "Caching table failed");
            }
        }
    }
}

#[async_trait]
impl<S: TableSource> TableSource for CachedTableSource<S> {
    type Error = S::Error;

    async fn fetch(&self, key: &TableKey) -> Result<Vec<u8>, Self::Error> {
        let cache_key = key.cache_key();

        if let Some(bytes) = self.lookup(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %cache_key, "Table served from cache");
            return Ok(bytes);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        info!(key = %cache_key, "Table not in cache, fetching from origin");
        let bytes = self.origin.fetch(key).await?;
        self.store(cache_key, &bytes);
        Ok(bytes)
    }
}
