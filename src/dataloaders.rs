//! DataLoader utilities for batch loading
//!
//! Implements the DataLoader pattern for preventing N+1 query problems.
//! See: https://github.com/graphql/dataloader
//!
//! Every key requested before a batch is dispatched joins that batch, and the
//! batch reaches the collection as one bulk fetch. Results, misses included,
//! are memoized for the lifetime of the loader. Failed fetches are not.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::key::NodeKey;
use crate::{BoxError, GlobalIdError, Result};

/// Records a collection can hand out
pub trait NodeRecord: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> NodeRecord for T {}

/// A collection of records that can be looked up by key in bulk
#[async_trait]
pub trait Collection<K, R>: Send + Sync
where
    K: NodeKey,
    R: NodeRecord,
{
    /// Stable tag naming this collection inside global IDs
    ///
    /// Must not contain `:`.
    fn tag(&self) -> &str;

    /// Fetch every record whose key is in `keys`
    ///
    /// This method should fetch all records in a single database query or
    /// API call. Results may come back in any order and keys with no record
    /// are simply left out.
    async fn find_by_keys(&self, keys: &[K]) -> std::result::Result<Vec<R>, BoxError>;

    /// Key of a fetched record
    fn key_of(&self, record: &R) -> K;
}

type Waiter<R> = oneshot::Sender<Result<Option<R>>>;

enum Entry<R> {
    Pending(Vec<Waiter<R>>),
    Resolved(Option<R>),
}

enum Ticket<R> {
    Ready(Option<R>),
    Waiting(oneshot::Receiver<Result<Option<R>>>),
}

struct LoaderState<K, R> {
    entries: HashMap<String, Entry<R>>,
    /// Keys of the open batch, in first-seen order
    queued: Vec<K>,
    dispatch_scheduled: bool,
}

struct LoaderInner<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    collection: Arc<dyn Collection<K, R>>,
    config: LoaderConfig,
    state: Mutex<LoaderState<K, R>>,
}

impl<K, R> LoaderInner<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    // Never held across an await.
    fn state(&self) -> MutexGuard<'_, LoaderState<K, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// DataLoader with caching and batching
///
/// One loader serves one collection for the duration of one request. Loads
/// issued before the open batch is dispatched are fetched together; the batch
/// window is one scheduler turn (one millisecond on a multi-threaded runtime)
/// unless [`LoaderConfig::batch_delay_ms`] says otherwise.
pub struct DataLoader<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    inner: Arc<LoaderInner<K, R>>,
}

impl<K, R> DataLoader<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    /// Create a new DataLoader for a collection
    ///
    /// No fetch happens until the first load.
    pub fn new(collection: Arc<dyn Collection<K, R>>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                collection,
                config,
                state: Mutex::new(LoaderState {
                    entries: HashMap::new(),
                    queued: Vec::new(),
                    dispatch_scheduled: false,
                }),
            }),
        }
    }

    /// The collection this loader fetches from
    pub fn collection(&self) -> &Arc<dyn Collection<K, R>> {
        &self.inner.collection
    }

    /// Load a single record by key
    ///
    /// Returns the memoized result if the key was already loaded, otherwise
    /// joins the open batch. `Ok(None)` means the collection has no such record.
    pub async fn load(&self, key: K) -> Result<Option<R>> {
        let ticket = self.submit(key);
        self.redeem(ticket).await
    }

    /// Load multiple records by key
    ///
    /// All uncached keys go out in the same batch. Results are in the order
    /// of `keys`, duplicates included.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<Option<R>>> {
        let tickets: Vec<_> = keys.into_iter().map(|key| self.submit(key)).collect();

        let mut results = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            results.push(self.redeem(ticket).await?);
        }
        Ok(results)
    }

    /// Prime the cache with a record
    ///
    /// Useful for seeding the cache with data you already have. Keys that are
    /// already cached or in flight are left alone; returns whether the record
    /// was stored.
    pub fn prime(&self, key: K, record: R) -> bool {
        let mut state = self.inner.state();
        let canonical = key.to_canonical();
        if state.entries.contains_key(&canonical) {
            return false;
        }
        state.entries.insert(canonical, Entry::Resolved(Some(record)));
        true
    }

    /// Forget the cached result for one key
    pub fn clear_key(&self, key: &K) {
        let mut state = self.inner.state();
        let canonical = key.to_canonical();
        if matches!(state.entries.get(&canonical), Some(Entry::Resolved(_))) {
            state.entries.remove(&canonical);
        }
    }

    /// Clear the cache
    ///
    /// Loads still in flight are unaffected.
    pub fn clear(&self) {
        self.inner
            .state()
            .entries
            .retain(|_, entry| matches!(entry, Entry::Pending(_)));
    }

    fn submit(&self, key: K) -> Ticket<R> {
        let canonical = key.to_canonical();
        let mut guard = self.inner.state();
        let state = &mut *guard;

        match state.entries.get_mut(&canonical) {
            Some(Entry::Resolved(value)) => Ticket::Ready(value.clone()),
            Some(Entry::Pending(waiters)) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Ticket::Waiting(rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                state.entries.insert(canonical, Entry::Pending(vec![tx]));
                self.enqueue(state, key);
                Ticket::Waiting(rx)
            }
        }
    }

    fn enqueue(&self, state: &mut LoaderState<K, R>, key: K) {
        state.queued.push(key);

        if let Some(max) = self.inner.config.max_batch_size {
            if state.queued.len() >= max {
                let batch = mem::take(&mut state.queued);
                tokio::spawn(execute(self.inner.clone(), batch));
                return;
            }
        }

        if !state.dispatch_scheduled {
            state.dispatch_scheduled = true;
            tokio::spawn(dispatch(self.inner.clone()));
        }
    }

    async fn redeem(&self, ticket: Ticket<R>) -> Result<Option<R>> {
        match ticket {
            Ticket::Ready(value) => Ok(value),
            Ticket::Waiting(rx) => rx.await.unwrap_or_else(|_| {
                Err(GlobalIdError::BatchAbandoned {
                    collection: self.inner.collection.tag().to_string(),
                })
            }),
        }
    }
}

impl<K, R> Clone for DataLoader<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, R> fmt::Debug for DataLoader<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("DataLoader")
            .field("collection", &self.inner.collection.tag())
            .field("entries", &state.entries.len())
            .field("queued", &state.queued.len())
            .finish()
    }
}

/// Batch window used on a multi-threaded runtime when none is configured
///
/// A single `yield_now` there lets another worker drain the queue while the
/// caller is still submitting keys.
const MULTI_THREAD_WINDOW: Duration = Duration::from_millis(1);

fn batch_window(config: &LoaderConfig) -> Duration {
    let delay = config.batch_delay();
    if !delay.is_zero() {
        return delay;
    }
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::CurrentThread) | Err(_) => Duration::ZERO,
        Ok(_) => MULTI_THREAD_WINDOW,
    }
}

/// Waits out the batch window, then fetches whatever has queued up
async fn dispatch<K, R>(inner: Arc<LoaderInner<K, R>>)
where
    K: NodeKey,
    R: NodeRecord,
{
    let window = batch_window(&inner.config);
    if window.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(window).await;
    }

    let batch = {
        let mut state = inner.state();
        state.dispatch_scheduled = false;
        mem::take(&mut state.queued)
    };

    if !batch.is_empty() {
        execute(inner, batch).await;
    }
}

/// Runs one bulk fetch and answers every waiter of the batch
///
/// Collection code (`find_by_keys`, `key_of`) never runs under the state
/// lock, and the guard stays armed until every waiter has been answered.
async fn execute<K, R>(inner: Arc<LoaderInner<K, R>>, batch: Vec<K>)
where
    K: NodeKey,
    R: NodeRecord,
{
    let tag = inner.collection.tag().to_string();
    debug!(collection = %tag, keys = batch.len(), "dispatching batch");

    let keys: Vec<String> = batch.iter().map(NodeKey::to_canonical).collect();
    let guard = BatchGuard::new(inner.clone(), keys.clone());
    let outcome = inner.collection.find_by_keys(&batch).await;

    match outcome {
        Ok(records) => {
            let mut found: HashMap<String, R> = records
                .into_iter()
                .map(|record| (inner.collection.key_of(&record).to_canonical(), record))
                .collect();
            debug!(collection = %tag, requested = keys.len(), found = found.len(), "batch resolved");

            let resolved: Vec<(String, Option<R>, Option<R>)> = keys
                .into_iter()
                .map(|key| {
                    let value = found.remove(&key);
                    (key, value.clone(), value)
                })
                .collect();

            let answers: Vec<(Vec<Waiter<R>>, Option<R>)> = {
                let mut state = inner.state();
                resolved
                    .into_iter()
                    .map(|(key, cached, value)| {
                        match state.entries.insert(key, Entry::Resolved(cached)) {
                            Some(Entry::Pending(waiters)) => (waiters, value),
                            _ => (Vec::new(), value),
                        }
                    })
                    .collect()
            };

            for (waiters, value) in answers {
                for waiter in waiters {
                    let _ = waiter.send(Ok(value.clone()));
                }
            }
        }
        Err(source) => {
            warn!(collection = %tag, keys = keys.len(), error = %source, "batch fetch failed");
            let error = GlobalIdError::Fetch {
                collection: tag,
                source: Arc::from(source),
            };

            let waiters: Vec<Waiter<R>> = {
                let mut state = inner.state();
                keys.iter()
                    .filter_map(|key| match state.entries.remove(key) {
                        Some(Entry::Pending(waiters)) => Some(waiters),
                        _ => None,
                    })
                    .flatten()
                    .collect()
            };

            for waiter in waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }

    guard.complete();
}

/// Drops the pending entries of a batch that never finished
///
/// Dropping the waiters wakes their receivers, which then report
/// [`GlobalIdError::BatchAbandoned`], and the keys become loadable again.
struct BatchGuard<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    inner: Arc<LoaderInner<K, R>>,
    keys: Vec<String>,
    armed: bool,
}

impl<K, R> BatchGuard<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn new(inner: Arc<LoaderInner<K, R>>, keys: Vec<String>) -> Self {
        Self {
            inner,
            keys,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl<K, R> Drop for BatchGuard<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state();
        warn!(
            collection = self.inner.collection.tag(),
            keys = self.keys.len(),
            "batch abandoned before completing"
        );
        for key in &self.keys {
            if matches!(state.entries.get(key), Some(Entry::Pending(_))) {
                state.entries.remove(key);
            }
        }
    }
}
