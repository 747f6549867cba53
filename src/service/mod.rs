//! Calculation orchestration and read-side queries.
//!
//! [`FibonacciService`] is the single owner of cross-cutting policy:
//! compute-or-serve-from-cache, then record. Everything else it touches is
//! an injected capability ([`ResultCache`], [`HistoryStore`]), so the whole
//! service runs against in-memory fakes in tests and against real backends
//! in production without changing a line here.
//!
//! Failure policy follows the value of each path: the cache is an
//! optimization, so its failures are absorbed; the history *write* is
//! duplicate-tolerant and best-effort (the result was already computed);
//! history *reads* are the product itself, so their failures propagate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::engine;
use crate::history::{
    CalculationRecord, HistoryOrdering, HistoryStore, InsertOutcome, StoreError, timestamp,
};
use crate::page::{PageRequest, Paginated};

/// Highest index accepted by default. A latency/storage policy, not a
/// mathematical limit: F(1000) already has 209 digits.
pub const DEFAULT_MAX_INDEX: u32 = 1000;

/// Default cache entry lifetime: one hour.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Tunable policy for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Highest index `calculate` will accept.
    pub max_index: u32,
    /// Cache entry lifetime. `None` keeps entries until evicted; `Some`
    /// trades hit rate for bounded staleness and memory.
    pub cache_ttl: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_index: DEFAULT_MAX_INDEX,
            cache_ttl: Some(DEFAULT_CACHE_TTL),
        }
    }
}

/// Errors surfaced by the service.
///
/// `IndexOutOfRange` and `InvalidRange` are client errors; `Store` is the
/// query path's server error.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("index must be between 0 and {max}, got {index}")]
    IndexOutOfRange { index: u32, max: u32 },

    #[error("invalid range: min {min} exceeds max {max}")]
    InvalidRange { min: u32, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a single `calculate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub index: u32,
    /// Exact decimal rendering of F(index).
    pub result: String,
    pub from_cache: bool,
}

/// Aggregate view over one user's entire history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationStats {
    pub total_calculations: u64,
    pub unique_indices: u64,
    #[serde(serialize_with = "timestamp::serialize_opt")]
    pub last_calculation: Option<SystemTime>,
    pub most_calculated_index: Option<u32>,
}

/// The calculation orchestrator and query layer.
///
/// Stateless per request: the only shared state is behind the injected
/// capabilities, so a service instance can be cloned cheaply (via the inner
/// `Arc`s) and called from any number of Tokio tasks at once.
#[derive(Clone)]
pub struct FibonacciService {
    cache: Arc<dyn ResultCache>,
    history: Arc<dyn HistoryStore>,
    config: ServiceConfig,
}

impl FibonacciService {
    /// Builds a service over the given capabilities with default policy.
    pub fn new(cache: Arc<dyn ResultCache>, history: Arc<dyn HistoryStore>) -> Self {
        Self::with_config(cache, history, ServiceConfig::default())
    }

    /// Builds a service with explicit policy.
    pub fn with_config(
        cache: Arc<dyn ResultCache>,
        history: Arc<dyn HistoryStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            cache,
            history,
            config,
        }
    }

    /// Computes F(`index`) for `user_id`, serving repeats from the shared
    /// cache, and records the calculation in the user's history.
    ///
    /// The cache check and the history append are independent: a cache hit
    /// still appends (the *user* may never have requested this index), and
    /// a duplicate append is the expected idempotent outcome, logged and
    /// swallowed. A failed append is also swallowed — the result exists and
    /// is returned; a retry will repeat the same idempotent flow.
    ///
    /// # Errors
    ///
    /// [`ServiceError::IndexOutOfRange`] when `index` exceeds the configured
    /// maximum; in that case no cache or history side effects occur.
    pub async fn calculate(&self, user_id: u64, index: u32) -> Result<Calculation, ServiceError> {
        if index > self.config.max_index {
            return Err(ServiceError::IndexOutOfRange {
                index,
                max: self.config.max_index,
            });
        }

        let (result, from_cache) = match self.cache.get(index).await {
            Some(cached) => {
                debug!(index, "cache hit");
                (cached, true)
            }
            None => {
                let computed = engine::fibonacci_decimal(index);
                self.cache
                    .set(index, &computed, self.config.cache_ttl)
                    .await;
                debug!(index, digits = computed.len(), "cache miss — computed");
                (computed, false)
            }
        };

        match self.history.insert_if_absent(user_id, index, &result).await {
            Ok(InsertOutcome::Created(_)) => {}
            Ok(InsertOutcome::AlreadyExists) => {
                debug!(user_id, index, "duplicate calculation ignored");
            }
            Err(e) => {
                // Result already computed; the next request for this pair
                // retries the append.
                warn!(user_id, index, error = %e, "history append failed");
            }
        }

        Ok(Calculation {
            index,
            result,
            from_cache,
        })
    }

    /// The user's calculations as a timeline: most recent first.
    pub async fn history(
        &self,
        user_id: u64,
        request: PageRequest,
    ) -> Result<Paginated<CalculationRecord>, ServiceError> {
        let (records, total) = self
            .history
            .find_by_user(user_id, HistoryOrdering::CreatedDescending, request.window())
            .await?;
        Ok(Paginated::assemble(records, request, total))
    }

    /// The user's calculations as coverage: index ascending.
    pub async fn all_calculations(
        &self,
        user_id: u64,
        request: PageRequest,
    ) -> Result<Paginated<CalculationRecord>, ServiceError> {
        let (records, total) = self
            .history
            .find_by_user(user_id, HistoryOrdering::IndexAscending, request.window())
            .await?;
        Ok(Paginated::assemble(records, request, total))
    }

    /// The user's calculations with `min_index <= index <= max_index`,
    /// index ascending.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidRange`] when `min_index > max_index`.
    pub async fn range_search(
        &self,
        user_id: u64,
        min_index: u32,
        max_index: u32,
        request: PageRequest,
    ) -> Result<Paginated<CalculationRecord>, ServiceError> {
        if min_index > max_index {
            return Err(ServiceError::InvalidRange {
                min: min_index,
                max: max_index,
            });
        }

        let (records, total) = self
            .history
            .find_by_user_in_range(user_id, min_index, max_index, request.window())
            .await?;
        Ok(Paginated::assemble(records, request, total))
    }

    /// Aggregates over the user's full record set, unpaginated.
    ///
    /// `most_calculated_index` is the index with the highest occurrence
    /// count; ties resolve to the lowest index, which keeps the answer
    /// deterministic regardless of store iteration order.
    pub async fn stats(&self, user_id: u64) -> Result<CalculationStats, ServiceError> {
        let records = self.history.find_all_by_user(user_id).await?;

        let mut counts: HashMap<u32, u64> = HashMap::new();
        for record in &records {
            *counts.entry(record.index).or_default() += 1;
        }

        let most_calculated_index = counts
            .iter()
            // max_by_key on (count, Reverse(index)): highest count wins,
            // lowest index breaks ties.
            .max_by_key(|(index, count)| (**count, std::cmp::Reverse(**index)))
            .map(|(index, _)| *index);

        let last_calculation = records
            .iter()
            .max_by_key(|r| (r.created_at, r.id))
            .map(|r| r.created_at);

        Ok(CalculationStats {
            total_calculations: records.len() as u64,
            unique_indices: counts.len() as u64,
            last_calculation,
            most_calculated_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryCache;
    use crate::history::{MemoryHistory, PageWindow};

    fn service() -> (FibonacciService, Arc<MemoryCache>, Arc<MemoryHistory>) {
        let cache = Arc::new(MemoryCache::new());
        let history = Arc::new(MemoryHistory::new());
        let service = FibonacciService::new(
            Arc::clone(&cache) as Arc<dyn ResultCache>,
            Arc::clone(&history) as Arc<dyn HistoryStore>,
        );
        (service, cache, history)
    }

    // ── calculate ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn computes_known_values() {
        let (service, _, _) = service();
        for (index, expected) in [(0, "0"), (1, "1"), (10, "55"), (20, "6765")] {
            let calc = service.calculate(1, index).await.unwrap();
            assert_eq!(calc.result, expected);
            assert_eq!(calc.index, index);
        }
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (service, _, _) = service();
        let first = service.calculate(1, 30).await.unwrap();
        let second = service.calculate(1, 30).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.result, second.result);
    }

    #[tokio::test]
    async fn cache_is_shared_across_users() {
        let (service, _, _) = service();
        let by_alice = service.calculate(1, 25).await.unwrap();
        let by_bob = service.calculate(2, 25).await.unwrap();

        assert!(!by_alice.from_cache);
        assert!(by_bob.from_cache);
        assert_eq!(by_alice.result, by_bob.result);
    }

    #[tokio::test]
    async fn repeat_calls_leave_exactly_one_history_row() {
        let (service, _, history) = service();
        service.calculate(1, 10).await.unwrap();
        service.calculate(1, 10).await.unwrap();
        service.calculate(1, 10).await.unwrap();

        assert_eq!(history.record_count().await, 1);
    }

    #[tokio::test]
    async fn cache_hit_still_appends_to_history() {
        let (service, _, history) = service();
        service.calculate(1, 12).await.unwrap();
        // Different user, same index: hit in cache, but their history is empty.
        let calc = service.calculate(2, 12).await.unwrap();

        assert!(calc.from_cache);
        assert_eq!(history.record_count().await, 2);
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected_without_side_effects() {
        let (service, cache, history) = service();
        let err = service.calculate(1, 1001).await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::IndexOutOfRange { index: 1001, max: 1000 }
        ));
        assert!(cache.is_empty().await);
        assert_eq!(history.record_count().await, 0);
    }

    #[tokio::test]
    async fn max_index_is_configurable() {
        let cache = Arc::new(MemoryCache::new());
        let history = Arc::new(MemoryHistory::new());
        let service = FibonacciService::with_config(
            cache,
            history,
            ServiceConfig {
                max_index: 10,
                cache_ttl: None,
            },
        );

        assert!(service.calculate(1, 10).await.is_ok());
        assert!(service.calculate(1, 11).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_entry_forces_recompute() {
        let (service, _, _) = service();
        service.calculate(1, 40).await.unwrap();

        tokio::time::advance(DEFAULT_CACHE_TTL + Duration::from_secs(1)).await;

        let calc = service.calculate(2, 40).await.unwrap();
        assert!(!calc.from_cache);
        assert_eq!(calc.result, "102334155");
    }

    // A store whose writes always fail but whose reads work; exercises the
    // append-failure-is-swallowed policy.
    struct WriteFailingStore {
        attempts: AtomicUsize,
    }

    impl HistoryStore for WriteFailingStore {
        fn insert_if_absent<'a>(
            &'a self,
            _user_id: u64,
            _index: u32,
            _result: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, StoreError>> + Send + 'a>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(StoreError::Unavailable("write refused".into())) })
        }

        fn find_by_user<'a>(
            &'a self,
            _user_id: u64,
            _ordering: HistoryOrdering,
            _window: PageWindow,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<(Vec<CalculationRecord>, u64), StoreError>> + Send + 'a,
            >,
        > {
            Box::pin(async { Err(StoreError::Unavailable("read refused".into())) })
        }

        fn find_by_user_in_range<'a>(
            &'a self,
            _user_id: u64,
            _min_index: u32,
            _max_index: u32,
            _window: PageWindow,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<(Vec<CalculationRecord>, u64), StoreError>> + Send + 'a,
            >,
        > {
            Box::pin(async { Err(StoreError::Unavailable("read refused".into())) })
        }

        fn find_all_by_user<'a>(
            &'a self,
            _user_id: u64,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<CalculationRecord>, StoreError>> + Send + 'a>>
        {
            Box::pin(async { Err(StoreError::Unavailable("read refused".into())) })
        }
    }

    #[tokio::test]
    async fn failed_history_append_does_not_fail_the_calculation() {
        let store = Arc::new(WriteFailingStore {
            attempts: AtomicUsize::new(0),
        });
        let service = FibonacciService::new(
            Arc::new(MemoryCache::new()),
            Arc::clone(&store) as Arc<dyn HistoryStore>,
        );

        let calc = service.calculate(1, 15).await.unwrap();
        assert_eq!(calc.result, "610");
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_store_read_propagates_as_error() {
        let service = FibonacciService::new(
            Arc::new(MemoryCache::new()),
            Arc::new(WriteFailingStore {
                attempts: AtomicUsize::new(0),
            }),
        );

        let err = service.history(1, PageRequest::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));

        let err = service.stats(1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }

    // ── queries ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn history_is_newest_first() {
        let (service, _, _) = service();
        for index in [3, 8, 5] {
            service.calculate(1, index).await.unwrap();
        }

        let page = service.history(1, PageRequest::default()).await.unwrap();
        let indices: Vec<_> = page.data.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![5, 8, 3]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn all_calculations_is_index_ascending() {
        let (service, _, _) = service();
        for index in [3, 8, 5] {
            service.calculate(1, index).await.unwrap();
        }

        let page = service
            .all_calculations(1, PageRequest::default())
            .await
            .unwrap();
        let indices: Vec<_> = page.data.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![3, 5, 8]);
    }

    #[tokio::test]
    async fn queries_are_scoped_to_the_requesting_user() {
        let (service, _, _) = service();
        service.calculate(1, 4).await.unwrap();
        service.calculate(2, 6).await.unwrap();

        let page = service.history(1, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].index, 4);
    }

    #[tokio::test]
    async fn range_search_is_inclusive_and_ordered() {
        let (service, _, _) = service();
        for index in [2, 5, 9, 14, 30] {
            service.calculate(1, index).await.unwrap();
        }

        let page = service
            .range_search(1, 5, 14, PageRequest::default())
            .await
            .unwrap();
        let indices: Vec<_> = page.data.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![5, 9, 14]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn range_search_rejects_inverted_bounds() {
        let (service, _, _) = service();
        let err = service
            .range_search(1, 10, 5, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRange { min: 10, max: 5 }));
    }

    #[tokio::test]
    async fn pagination_applies_to_query_results() {
        let (service, _, _) = service();
        for index in 0..25 {
            service.calculate(1, index).await.unwrap();
        }

        let page = service
            .all_calculations(1, PageRequest::new(Some(2), Some(10)))
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_previous);
        let indices: Vec<_> = page.data.iter().map(|r| r.index).collect();
        assert_eq!(indices, (10..20).collect::<Vec<_>>());
    }

    // ── stats ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stats_on_empty_history() {
        let (service, _, _) = service();
        let stats = service.stats(1).await.unwrap();

        assert_eq!(stats.total_calculations, 0);
        assert_eq!(stats.unique_indices, 0);
        assert_eq!(stats.last_calculation, None);
        assert_eq!(stats.most_calculated_index, None);
    }

    #[tokio::test]
    async fn repeat_of_same_index_counts_once() {
        // User computes 5, 5, 7: the history holds two rows.
        let (service, _, _) = service();
        service.calculate(1, 5).await.unwrap();
        service.calculate(1, 5).await.unwrap();
        service.calculate(1, 7).await.unwrap();

        let stats = service.stats(1).await.unwrap();
        assert_eq!(stats.total_calculations, 2);
        assert_eq!(stats.unique_indices, 2);
        assert!(stats.last_calculation.is_some());
    }

    #[tokio::test]
    async fn stats_invariants_hold() {
        let (service, _, _) = service();
        for index in [1, 2, 3, 5, 8] {
            service.calculate(9, index).await.unwrap();
        }

        let stats = service.stats(9).await.unwrap();
        assert!(stats.unique_indices <= stats.total_calculations);
        assert!(stats.last_calculation.is_some());
        assert!(stats.most_calculated_index.is_some());
    }

    #[tokio::test]
    async fn most_calculated_tie_breaks_to_lowest_index() {
        // Under the uniqueness constraint every index appears once, so all
        // counts tie and the lowest recorded index must win.
        let (service, _, _) = service();
        for index in [17, 3, 42] {
            service.calculate(1, index).await.unwrap();
        }

        let stats = service.stats(1).await.unwrap();
        assert_eq!(stats.most_calculated_index, Some(3));
    }

    #[tokio::test]
    async fn stats_serialize_with_optional_fields() {
        let (service, _, _) = service();
        let empty = serde_json::to_value(service.stats(1).await.unwrap()).unwrap();
        assert_eq!(empty["lastCalculation"], serde_json::Value::Null);
        assert_eq!(empty["mostCalculatedIndex"], serde_json::Value::Null);

        service.calculate(1, 6).await.unwrap();
        let filled = serde_json::to_value(service.stats(1).await.unwrap()).unwrap();
        assert!(filled["lastCalculation"].is_u64());
        assert_eq!(filled["mostCalculatedIndex"], 6);
        assert_eq!(filled["totalCalculations"], 1);
    }
}
