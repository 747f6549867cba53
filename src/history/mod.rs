//! Calculation history — a per-user, append-mostly audit trail.
//!
//! Every successful calculation is recorded once per `(user, index)` pair.
//! The uniqueness constraint lives in the store and is the system's only
//! write-side mutual exclusion: concurrent inserts for the same pair resolve
//! to one `Created` and the rest `AlreadyExists`, with the first write
//! winning and the stored result never overwritten.
//!
//! The duplicate case is a value, not an error — [`InsertOutcome`] keeps the
//! expected "user already has this calculation" path out of the error
//! channel, which stays reserved for genuine store failures.

use std::collections::HashSet;
use std::pin::Pin;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// One user's computed value for one index.
///
/// `result` is an exact decimal string: the magnitude of F(n) outgrows every
/// fixed-width numeric type well before the index cap. `id` and `created_at`
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRecord {
    pub id: u64,
    pub user_id: u64,
    pub index: u32,
    pub result: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: SystemTime,
}

/// Result of an idempotent history append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written.
    Created(CalculationRecord),
    /// A record for this `(user, index)` already exists; nothing was written.
    AlreadyExists,
}

/// Orderings a store must support for paginated reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrdering {
    /// Most recent first — the timeline view.
    CreatedDescending,
    /// Lowest index first — the coverage view.
    IndexAscending,
}

/// An offset/count slice of an ordered result set.
///
/// Produced by [`crate::page::PageRequest::window`] after page/limit
/// normalization; stores apply it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

/// Errors from the history store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// A page of records plus the total count of all matching records.
pub type CountedPage = (Vec<CalculationRecord>, u64);

/// Capability consumed by the orchestrator (writes) and query layer (reads).
///
/// Backends must enforce uniqueness on `(user_id, index)` and give at least
/// read-your-own-writes consistency, or the duplicate check degrades.
pub trait HistoryStore: Send + Sync {
    /// Appends a record unless one already exists for `(user_id, index)`.
    fn insert_if_absent<'a>(
        &'a self,
        user_id: u64,
        index: u32,
        result: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, StoreError>> + Send + 'a>>;

    /// Returns one page of a user's records under `ordering`, plus the total
    /// number of records the user has.
    fn find_by_user<'a>(
        &'a self,
        user_id: u64,
        ordering: HistoryOrdering,
        window: PageWindow,
    ) -> Pin<Box<dyn Future<Output = Result<CountedPage, StoreError>> + Send + 'a>>;

    /// Like [`find_by_user`](Self::find_by_user), restricted to records with
    /// `min_index <= index <= max_index`, always ordered by index ascending.
    fn find_by_user_in_range<'a>(
        &'a self,
        user_id: u64,
        min_index: u32,
        max_index: u32,
        window: PageWindow,
    ) -> Pin<Box<dyn Future<Output = Result<CountedPage, StoreError>> + Send + 'a>>;

    /// Returns all of a user's records, unpaginated, for aggregate queries.
    fn find_all_by_user<'a>(
        &'a self,
        user_id: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CalculationRecord>, StoreError>> + Send + 'a>>;
}

// Mutable state behind MemoryHistory's lock. Check-and-insert happens under
// one write guard, which is what makes the uniqueness constraint atomic.
#[derive(Default)]
struct State {
    records: Vec<CalculationRecord>,
    keys: HashSet<(u64, u32)>,
    next_id: u64,
}

/// In-memory [`HistoryStore`] backend.
///
/// Backs the demo and every orchestrator test. A relational backend with a
/// unique `(user_id, index)` constraint satisfies the same trait.
#[derive(Default)]
pub struct MemoryHistory {
    state: RwLock<State>,
}

impl MemoryHistory {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all users.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }
}

fn sorted(mut records: Vec<CalculationRecord>, ordering: HistoryOrdering) -> Vec<CalculationRecord> {
    match ordering {
        HistoryOrdering::CreatedDescending => {
            // The surrogate id breaks ties between records created within
            // the same clock tick.
            records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        }
        HistoryOrdering::IndexAscending => {
            records.sort_by_key(|r| r.index);
        }
    }
    records
}

fn paged(records: Vec<CalculationRecord>, window: PageWindow) -> CountedPage {
    let total = records.len() as u64;
    let page = records
        .into_iter()
        .skip(window.offset)
        .take(window.limit)
        .collect();
    (page, total)
}

impl HistoryStore for MemoryHistory {
    fn insert_if_absent<'a>(
        &'a self,
        user_id: u64,
        index: u32,
        result: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if !state.keys.insert((user_id, index)) {
                return Ok(InsertOutcome::AlreadyExists);
            }

            state.next_id += 1;
            let record = CalculationRecord {
                id: state.next_id,
                user_id,
                index,
                result: result.to_owned(),
                created_at: SystemTime::now(),
            };
            state.records.push(record.clone());
            Ok(InsertOutcome::Created(record))
        })
    }

    fn find_by_user<'a>(
        &'a self,
        user_id: u64,
        ordering: HistoryOrdering,
        window: PageWindow,
    ) -> Pin<Box<dyn Future<Output = Result<CountedPage, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let matching: Vec<_> = state
                .records
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            Ok(paged(sorted(matching, ordering), window))
        })
    }

    fn find_by_user_in_range<'a>(
        &'a self,
        user_id: u64,
        min_index: u32,
        max_index: u32,
        window: PageWindow,
    ) -> Pin<Box<dyn Future<Output = Result<CountedPage, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let matching: Vec<_> = state
                .records
                .iter()
                .filter(|r| {
                    r.user_id == user_id && r.index >= min_index && r.index <= max_index
                })
                .cloned()
                .collect();
            Ok(paged(sorted(matching, HistoryOrdering::IndexAscending), window))
        })
    }

    fn find_all_by_user<'a>(
        &'a self,
        user_id: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CalculationRecord>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .records
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        })
    }
}

/// Serde helpers rendering [`SystemTime`] as integer milliseconds since the
/// Unix epoch, the shape API consumers expect for `createdAt` fields.
pub mod timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde::Serializer;

    /// Milliseconds since the epoch; times before the epoch clamp to zero.
    pub fn millis(time: SystemTime) -> u64 {
        time.duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(millis(*time))
    }

    pub fn serialize_opt<S: Serializer>(
        time: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_some(&millis(*t)),
            None => serializer.serialize_none(),
        }
    }
}
