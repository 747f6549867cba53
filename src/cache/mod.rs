//! Result cache — shared, user-independent storage for computed values.
//!
//! The Fibonacci value for a given index is the same for every user, so the
//! cache is keyed by index alone (`fib:{index}`). That keeps the cache
//! shareable across users and bounds it to at most `max_index + 1` entries.
//!
//! Caching is a best-effort optimization, never a correctness dependency:
//! [`ResultCache::get`] reports backend trouble as a miss, and a failed
//! [`ResultCache::set`] is silently absorbed — the calculation that produced
//! the value has already succeeded.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

/// Capability consumed by the orchestrator for read-through caching.
///
/// Implementations are shared across Tokio tasks behind an `Arc`, so the
/// methods take `&self` and return pinned `Send` futures.
pub trait ResultCache: Send + Sync {
    /// Returns the cached decimal string for `index`, or `None` when the
    /// entry is absent, expired, or the backend is unavailable.
    fn get<'a>(&'a self, index: u32) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

    /// Stores the decimal string for `index`. With `Some(ttl)` the entry
    /// auto-expires after that duration; with `None` it persists until
    /// evicted. Write failures are absorbed by the implementation.
    fn set<'a>(
        &'a self,
        index: u32,
        result: &'a str,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Derives the cache key for an index.
///
/// Deliberately independent of the requesting user — see the module docs.
fn cache_key(index: u32) -> String {
    format!("fib:{index}")
}

// A stored value plus its optional expiry deadline.
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory [`ResultCache`] backend.
///
/// A `tokio::sync::RwLock` around a `HashMap`, with lazy expiry: entries are
/// checked against their deadline on read and pruned when found stale.
/// Suitable for single-process deployments and tests; a networked key-value
/// store can implement [`ResultCache`] behind the same trait.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns `true` when the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ResultCache for MemoryCache {
    fn get<'a>(&'a self, index: u32) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let key = cache_key(index);
            let now = Instant::now();

            {
                let entries = self.entries.read().await;
                match entries.get(&key) {
                    Some(entry) if !entry.is_expired(now) => {
                        return Some(entry.value.clone());
                    }
                    Some(_) => {} // stale — fall through and prune
                    None => return None,
                }
            }

            // Re-check under the write lock: another task may have refreshed
            // the entry between the two lock acquisitions.
            let mut entries = self.entries.write().await;
            match entries.get(&key) {
                Some(entry) if entry.is_expired(now) => {
                    trace!(%key, "pruning expired cache entry");
                    entries.remove(&key);
                    None
                }
                Some(entry) => Some(entry.value.clone()),
                None => None,
            }
        })
    }

    fn set<'a>(
        &'a self,
        index: u32,
        result: &'a str,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let entry = Entry {
                value: result.to_owned(),
                expires_at: ttl.map(|d| Instant::now() + d),
            };
            let mut entries = self.entries.write().await;
            entries.insert(cache_key(index), entry);
        })
    }
}
