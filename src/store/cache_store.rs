//! The cache store - one shared map of key to entry for the app session.
//!
//! All reads and writes are short synchronous critical sections; nothing here
//! holds a lock across an `.await`, and subscriber callbacks run after the
//! lock is released. Network I/O happens inside spawned fetch tasks only.

use std::any::type_name;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{AnyData, CacheEntry, ResourceKey};
use crate::config::SyncConfig;
use crate::error::{ClassifiedError, RawError, StoreError, classify};
use crate::fetch::{Fetcher, FetcherRegistry};
use crate::policy::{RetryScheduler, RevalidationPolicy};

/// Called with the key whenever that key's entry changes.
pub type Callback = Arc<dyn Fn(&ResourceKey) + Send + Sync>;

type InFlight = Shared<BoxFuture<'static, ()>>;

/// Whether a fetch request may be skipped by the freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Automatic,
    Forced,
}

/// Optimistic write still waiting for the server.
struct PendingMutation {
    id: u64,
    /// Value to restore if this write fails and nothing newer has written over it.
    previous: Option<AnyData>,
    /// A newer write was confirmed; restoring `previous` would drop server truth.
    superseded: bool,
}

#[derive(Default)]
struct Slot {
    data: Option<AnyData>,
    error: Option<ClassifiedError>,
    fetched_at: Option<Instant>,
    fetched_at_utc: Option<DateTime<Utc>>,
    /// Freshness deadline computed with the window in force at fetch time.
    fresh_until: Option<Instant>,
    revision: u64,
    /// Invalidated or lost a fetch result; the next trigger refetches.
    stale: bool,
    in_flight: Option<(u64, InFlight)>,
    subscribers: Vec<(u64, Callback)>,
    mutations: Vec<PendingMutation>,
}

impl Slot {
    fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        if self.stale {
            return false;
        }
        let Some(fetched_at) = self.fetched_at else {
            return false;
        };
        let by_window = fetched_at + window;
        let until = self.fresh_until.map_or(by_window, |recorded| recorded.max(by_window));
        now < until
    }

    fn callbacks(&self) -> Vec<Callback> {
        self.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    fn view(&self, key: &ResourceKey) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at_utc,
            is_validating: self.in_flight.is_some(),
            subscribers: self.subscribers.len(),
            revision: self.revision,
        }
    }

    fn write(&mut self, data: Option<AnyData>) {
        self.data = data;
        self.revision += 1;
    }

    fn confirm(&mut self, data: AnyData, window: Duration) {
        let now = Instant::now();
        self.write(Some(data));
        self.error = None;
        self.stale = false;
        self.fetched_at = Some(now);
        self.fetched_at_utc = Some(Utc::now());
        self.fresh_until = Some(now + window);
    }
}

/// Handle to a running fetch. Await [`FetchHandle::finished`] to wait for the
/// store to be updated; dropping it does not cancel anything.
#[must_use = "dropping the handle does not cancel the fetch; call `finished` to wait for it"]
pub struct FetchHandle(Option<InFlight>);

impl FetchHandle {
    /// Wait until the fetch has settled into the store.
    pub async fn finished(self) {
        if let Some(fut) = self.0 {
            fut.await;
        }
    }

    /// Whether a fetch was started or joined (false when skipped as fresh).
    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }
}

/// Token for an in-progress mutation.
#[derive(Debug)]
pub(crate) struct MutationTicket {
    pub(crate) key: ResourceKey,
    id: u64,
}

/// Optimistic updater. The store runs it outside its locks.
pub(crate) type OptimisticFn =
    Box<dyn FnOnce(Option<&AnyData>) -> Result<AnyData, StoreError> + Send>;

/// Server-derived value for a confirmed mutation.
pub(crate) struct ServerValue {
    /// Value the response was applied to, from `mutation_base`.
    pub(crate) base: Option<AnyData>,
    pub(crate) data: AnyData,
}

fn same_value(a: Option<&AnyData>, b: Option<&AnyData>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

struct StoreInner {
    slots: DashMap<ResourceKey, Slot>,
    registry: FetcherRegistry,
    retry: RetryScheduler,
    next_id: AtomicU64,
}

/// Session-wide reactive cache.
///
/// Construct one at startup and hand clones to every consumer; cloning is
/// cheap and shares the same underlying map.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new(config: &SyncConfig) -> Self {
        debug!("Cache store initialized ({:?})", config);
        Self {
            inner: Arc::new(StoreInner {
                slots: DashMap::new(),
                registry: FetcherRegistry::new(config.default_policy()),
                retry: RetryScheduler::new(config.retry_policy()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Fetchers and policies used by [`ensure_fresh`](Self::ensure_fresh).
    pub fn registry(&self) -> &FetcherRegistry {
        &self.inner.registry
    }

    pub fn retry_scheduler(&self) -> &RetryScheduler {
        &self.inner.retry
    }

    pub fn policy_for(&self, key: &ResourceKey) -> RevalidationPolicy {
        self.inner.registry.policy_for(key)
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Current entry for a key. Unknown keys yield an empty entry.
    pub fn get(&self, key: &ResourceKey) -> CacheEntry {
        self.inner
            .slots
            .get(key)
            .map(|slot| slot.view(key))
            .unwrap_or_else(|| CacheEntry::empty(key.clone()))
    }

    /// Current entry with its data downcast to `T`.
    pub fn get_as<T>(&self, key: &ResourceKey) -> Result<CacheEntry<Arc<T>>, StoreError>
    where
        T: Send + Sync + 'static,
    {
        self.get(key).try_map(|data| {
            data.downcast::<T>().map_err(|_| StoreError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
        })
    }

    /// Every key the store has seen.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.inner.slots.iter().map(|slot| slot.key().clone()).collect()
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner.slots.get(key).map_or(0, |slot| slot.subscribers.len())
    }

    /// Keys that currently have at least one subscriber.
    pub fn mounted_keys(&self) -> Vec<ResourceKey> {
        self.inner
            .slots
            .iter()
            .filter(|slot| !slot.subscribers.is_empty())
            .map(|slot| slot.key().clone())
            .collect()
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Overwrite the data for a key and notify its subscribers.
    pub fn set<T>(&self, key: &ResourceKey, data: T)
    where
        T: Send + Sync + 'static,
    {
        self.set_data(key, Some(Arc::new(data)));
    }

    /// Overwrite with an already type-erased value (or clear it with `None`).
    pub fn set_data(&self, key: &ResourceKey, data: Option<AnyData>) {
        let callbacks = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            slot.write(data);
            slot.callbacks()
        };
        notify(key, callbacks);
    }

    /// Record an error for a key and notify its subscribers.
    pub fn set_error(&self, key: &ResourceKey, error: ClassifiedError) {
        let callbacks = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            slot.error = Some(error);
            slot.callbacks()
        };
        notify(key, callbacks);
    }

    /// Mark a key stale. Mounted keys refetch right away; others on next use.
    pub fn invalidate(&self, key: &ResourceKey) {
        let mounted = match self.inner.slots.get_mut(key) {
            Some(mut slot) => {
                slot.stale = true;
                !slot.subscribers.is_empty()
            }
            None => false,
        };
        debug!("Invalidated {}", key);

        if mounted && let Err(err) = self.ensure_fresh(key) {
            warn!("Failed to revalidate {} after invalidation: {}", key, err);
        }
    }

    /// Invalidate every key of a family (e.g. all `stock:*` previews).
    pub fn invalidate_family(&self, family: &str) {
        let mut mounted = Vec::new();
        for mut slot in self.inner.slots.iter_mut() {
            if slot.key().family() == family {
                slot.stale = true;
                if !slot.subscribers.is_empty() {
                    mounted.push(slot.key().clone());
                }
            }
        }
        debug!("Invalidated family {} ({} mounted)", family, mounted.len());

        for key in mounted {
            if let Err(err) = self.ensure_fresh(&key) {
                warn!("Failed to revalidate {} after invalidation: {}", key, err);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Call `callback` whenever this key's entry changes.
    ///
    /// Notifications are per key; writes to other keys never reach it.
    pub fn subscribe<F>(&self, key: &ResourceKey, callback: F) -> Subscription
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.inner
            .slots
            .entry(key.clone())
            .or_default()
            .subscribers
            .push((id, Arc::new(callback)));

        Subscription {
            store: self.clone(),
            key: key.clone(),
            id,
            active: true,
        }
    }

    fn unsubscribe(&self, key: &ResourceKey, id: u64) {
        if let Some(mut slot) = self.inner.slots.get_mut(key) {
            slot.subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    // ---------------------------------------------------------------------
    // Fetching
    // ---------------------------------------------------------------------

    /// Refetch if the key is stale, using its registered fetcher and policy.
    ///
    /// No-op while a fetch is in flight, while the data is fresh, or after a
    /// rate-limit error (those wait for an explicit [`refetch`](Self::refetch)).
    pub fn ensure_fresh(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let fetcher = self.fetcher_for(key)?;
        let freshness = self.policy_for(key).freshness;
        drop(self.start_fetch(key, fetcher, freshness, 0, FetchMode::Automatic));
        Ok(())
    }

    /// [`ensure_fresh`](Self::ensure_fresh) with an explicit fetcher and window.
    pub fn ensure_fresh_with(&self, key: &ResourceKey, fetcher: Arc<dyn Fetcher>, freshness: Duration) {
        drop(self.start_fetch(key, fetcher, freshness, 0, FetchMode::Automatic));
    }

    /// Explicit refetch: skips the freshness check but still joins a fetch
    /// that is already in flight.
    pub fn refetch(&self, key: &ResourceKey) -> Result<FetchHandle, StoreError> {
        let fetcher = self.fetcher_for(key)?;
        let freshness = self.policy_for(key).freshness;
        Ok(self.start_fetch(key, fetcher, freshness, 0, FetchMode::Forced))
    }

    /// Refetch and wait until the result is in the store.
    pub async fn revalidate(&self, key: &ResourceKey) -> Result<(), StoreError> {
        self.refetch(key)?.finished().await;
        Ok(())
    }

    fn fetcher_for(&self, key: &ResourceKey) -> Result<Arc<dyn Fetcher>, StoreError> {
        self.inner
            .registry
            .fetcher_for(key)
            .ok_or_else(|| StoreError::NoFetcher(key.to_string()))
    }

    fn start_fetch(
        &self,
        key: &ResourceKey,
        fetcher: Arc<dyn Fetcher>,
        freshness: Duration,
        attempt: u32,
        mode: FetchMode,
    ) -> FetchHandle {
        let fut = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();

            if let Some((_, in_flight)) = &slot.in_flight {
                debug!("Joining in-flight fetch for {}", key);
                return FetchHandle(Some(in_flight.clone()));
            }

            if mode == FetchMode::Automatic {
                if let Some(err) = &slot.error
                    && err.kind.suppresses_automatic_revalidation()
                {
                    debug!("Skipping automatic fetch for {}: {}", key, err.kind);
                    return FetchHandle(None);
                }
                if slot.is_fresh(Instant::now(), freshness) {
                    debug!("Cache fresh for {}", key);
                    return FetchHandle(None);
                }
            }

            let fetch_id = self.next_id();
            let start_revision = slot.revision;
            let store = self.clone();
            let task_key = key.clone();
            let task_fetcher = Arc::clone(&fetcher);

            let fut: InFlight = async move {
                let result = AssertUnwindSafe(task_fetcher.fetch(&task_key))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(RawError::other("fetcher panicked")));
                store.settle_fetch(
                    &task_key,
                    fetch_id,
                    start_revision,
                    result,
                    Retry { fetcher: task_fetcher, freshness, attempt },
                );
            }
            .boxed()
            .shared();

            slot.in_flight = Some((fetch_id, fut.clone()));
            fut
        };

        debug!("Fetching {} (attempt {})", key, attempt);
        self.inner.retry.cancel(key);
        tokio::spawn(fut.clone());
        FetchHandle(Some(fut))
    }

    fn settle_fetch(
        &self,
        key: &ResourceKey,
        fetch_id: u64,
        start_revision: u64,
        result: Result<AnyData, RawError>,
        retry: Retry,
    ) {
        let mut failure = None;

        let callbacks = {
            let Some(mut slot) = self.inner.slots.get_mut(key) else {
                return;
            };
            if slot.in_flight.as_ref().map(|(id, _)| *id) != Some(fetch_id) {
                return;
            }
            slot.in_flight = None;

            match result {
                Ok(data) => {
                    if slot.revision != start_revision || !slot.mutations.is_empty() {
                        // A newer write happened while this fetch was running.
                        debug!(
                            "Discarding fetch result for {} (revision {} -> {}, {} pending mutations)",
                            key,
                            start_revision,
                            slot.revision,
                            slot.mutations.len()
                        );
                        slot.stale = true;
                    } else {
                        slot.confirm(data, retry.freshness);
                        debug!("Fetched {} (revision {})", key, slot.revision);
                    }
                }
                Err(raw) => {
                    let err = classify(raw);
                    warn!("Fetch failed for {}: {}", key, err);
                    slot.error = Some(err.clone());
                    failure = Some(err);
                }
            }

            slot.callbacks()
        };

        if let Some(err) = failure {
            self.schedule_retry(key, &err, retry);
        }

        notify(key, callbacks);
    }

    fn schedule_retry(&self, key: &ResourceKey, err: &ClassifiedError, retry: Retry) {
        let store = self.clone();
        let task_key = key.clone();
        let Retry { fetcher, freshness, attempt } = retry;

        self.inner.retry.schedule(key, err, attempt, move || {
            drop(store.start_fetch(&task_key, fetcher, freshness, attempt + 1, FetchMode::Forced));
        });
    }

    // ---------------------------------------------------------------------
    // Mutation bookkeeping (driven by `MutationEngine`)
    // ---------------------------------------------------------------------

    /// Start a mutation, applying the optimistic value if one is given.
    ///
    /// The updater sees the current value (possibly another mutation's
    /// optimistic value). It runs without any store lock held, so it may read
    /// or write the store itself.
    pub(crate) fn begin_mutation(
        &self,
        key: &ResourceKey,
        optimistic: Option<OptimisticFn>,
    ) -> Result<MutationTicket, StoreError> {
        let id = self.next_id();
        let ticket = MutationTicket { key: key.clone(), id };

        let Some(update) = optimistic else {
            return Ok(ticket);
        };

        let (current, revision) = self
            .inner
            .slots
            .get(key)
            .map_or((None, 0), |slot| (slot.data.clone(), slot.revision));
        let next = update(current.as_ref())?;

        let callbacks = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            if slot.revision != revision {
                // Written while the updater ran: the optimistic value may be
                // built on old data, so ask the server once the stack settles.
                debug!("{} changed during optimistic update, marking stale", key);
                slot.stale = true;
            }
            let previous = slot.data.clone();
            slot.mutations.push(PendingMutation {
                id,
                previous,
                superseded: false,
            });
            slot.write(Some(next));
            debug!(
                "Optimistic write to {} (revision {}, {} pending)",
                key,
                slot.revision,
                slot.mutations.len()
            );
            slot.callbacks()
        };

        notify(key, callbacks);
        Ok(ticket)
    }

    /// Confirm a successful mutation. Returns whether the key should be
    /// refetched now.
    pub(crate) fn confirm_mutation(
        &self,
        ticket: &MutationTicket,
        server: Option<ServerValue>,
        revalidate: bool,
    ) -> bool {
        let key = &ticket.key;
        let window = self.policy_for(key).freshness;
        let mut changed = false;

        let (callbacks, refetch) = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            let position = slot.mutations.iter().position(|m| m.id == ticket.id);

            match position {
                Some(index) => {
                    let confirmed = slot.mutations.remove(index);
                    for older in &mut slot.mutations[..index] {
                        older.superseded = true;
                    }
                    match server {
                        Some(_) if confirmed.superseded => {
                            // A newer write already confirmed; this response is older.
                            debug!("Server value for {} superseded, refetching instead", key);
                            slot.stale = true;
                        }
                        Some(server) if !same_value(server.base.as_ref(), confirmed.previous.as_ref()) => {
                            debug!("Base of {} moved before confirm, refetching instead", key);
                            slot.stale = true;
                        }
                        Some(server) if index == slot.mutations.len() => {
                            slot.confirm(server.data, window);
                            changed = true;
                        }
                        Some(server) => {
                            // The next newer mutation now builds on server truth.
                            slot.mutations[index].previous = Some(server.data);
                        }
                        None => {}
                    }
                }
                None => {
                    for pending in &mut slot.mutations {
                        pending.superseded = true;
                    }
                    if let Some(server) = server {
                        if slot.mutations.is_empty() && same_value(server.base.as_ref(), slot.data.as_ref()) {
                            slot.confirm(server.data, window);
                            changed = true;
                        } else {
                            slot.stale = true;
                        }
                    }
                }
            }

            if revalidate {
                slot.stale = true;
            }
            let refetch = slot.stale && slot.mutations.is_empty();
            let callbacks = if changed { slot.callbacks() } else { Vec::new() };
            (callbacks, refetch)
        };

        notify(key, callbacks);
        refetch
    }

    /// Value a mutation's server response applies to: the value from before
    /// its optimistic write, or the current value if it made none.
    pub(crate) fn mutation_base(&self, ticket: &MutationTicket) -> Option<AnyData> {
        let slot = self.inner.slots.get(&ticket.key)?;
        match slot.mutations.iter().find(|m| m.id == ticket.id) {
            Some(pending) => pending.previous.clone(),
            None => slot.data.clone(),
        }
    }

    /// Roll back a failed mutation. Returns whether the key should be
    /// refetched now.
    pub(crate) fn rollback_mutation(&self, ticket: &MutationTicket) -> bool {
        let key = &ticket.key;
        let mut changed = false;

        let (callbacks, refetch) = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();

            if let Some(index) = slot.mutations.iter().position(|m| m.id == ticket.id) {
                let failed = slot.mutations.remove(index);

                if failed.superseded {
                    // A newer write was confirmed; only the server knows the truth now.
                    debug!("Rollback of {} superseded, refetching instead", key);
                    slot.stale = true;
                } else if index == slot.mutations.len() {
                    slot.write(failed.previous);
                    changed = true;
                    debug!("Rolled back {} to revision {}", key, slot.revision);
                } else {
                    // A newer optimistic write sits on top; it inherits this snapshot.
                    slot.mutations[index].previous = failed.previous;
                    debug!("Rollback of {} deferred to newer mutation", key);
                }
            }

            let refetch = slot.stale && slot.mutations.is_empty();
            let callbacks = if changed { slot.callbacks() } else { Vec::new() };
            (callbacks, refetch)
        };

        notify(key, callbacks);
        refetch
    }

    /// Number of optimistic writes still waiting for the server.
    pub fn pending_mutations(&self, key: &ResourceKey) -> usize {
        self.inner.slots.get(key).map_or(0, |slot| slot.mutations.len())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entry_count", &self.inner.slots.len())
            .field("registry", &self.inner.registry)
            .field("retry", &self.inner.retry)
            .finish()
    }
}

/// What a failed fetch needs to try again.
struct Retry {
    fetcher: Arc<dyn Fetcher>,
    freshness: Duration,
    attempt: u32,
}

fn notify(key: &ResourceKey, callbacks: Vec<Callback>) {
    for callback in callbacks {
        callback(key);
    }
}

/// Live subscription to one key. Dropping it unsubscribes.
pub struct Subscription {
    store: CacheStore,
    key: ResourceKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.active {
            self.active = false;
            self.store.unsubscribe(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use super::*;
    use crate::error::ErrorKind;
    use crate::fetch::fetcher_fn;

    fn store() -> CacheStore {
        CacheStore::new(&SyncConfig::default())
    }

    fn watchlist() -> ResourceKey {
        ResourceKey::new("watchlist")
    }

    /// Fetcher that counts calls and returns the call number.
    fn counting_fetcher(calls: Arc<AtomicUsize>) -> Arc<dyn Fetcher> {
        fetcher_fn(move |_| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, RawError>(n)
            }
        })
    }

    /// Fetcher that blocks until `gate` is notified.
    fn gated_fetcher(calls: Arc<AtomicUsize>, gate: Arc<Notify>, value: Vec<&'static str>) -> Arc<dyn Fetcher> {
        fetcher_fn(move |_| {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<_, RawError>(value)
            }
        })
    }

    fn failing_fetcher(calls: Arc<AtomicUsize>, status: u16) -> Arc<dyn Fetcher> {
        fetcher_fn(move |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<usize, _>(RawError::status(status, "upstream failure"))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ensure_fresh_fetches_once() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        store
            .registry()
            .register("watchlist", gated_fetcher(Arc::clone(&calls), Arc::clone(&gate), vec!["AAA"]));

        for _ in 0..10 {
            store.ensure_fresh(&watchlist()).unwrap();
        }
        assert!(store.get(&watchlist()).is_validating);

        let handle = store.refetch(&watchlist()).unwrap();
        tokio::task::yield_now().await;
        gate.notify_one();
        handle.finished().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let entry = store.get_as::<Vec<&str>>(&watchlist()).unwrap();
        assert_eq!(entry.data.as_deref(), Some(&vec!["AAA"]));
        assert!(!entry.is_validating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_window_respected() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(Arc::clone(&calls));
        let window = Duration::from_secs(60);

        store.ensure_fresh_with(&watchlist(), Arc::clone(&fetcher), window);
        tokio::time::sleep(Duration::from_millis(1)).await;
        store.ensure_fresh_with(&watchlist(), Arc::clone(&fetcher), window);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        store.ensure_fresh_with(&watchlist(), fetcher, window);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortening_window_keeps_fresh_data_fresh() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(Arc::clone(&calls));

        store.ensure_fresh_with(&watchlist(), Arc::clone(&fetcher), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;

        store.ensure_fresh_with(&watchlist(), fetcher, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_notified_once_per_settle() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        store.registry().register("watchlist", counting_fetcher(calls));

        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));
        let hits_other = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&hits_a);
        let _sub_a = store.subscribe(&watchlist(), move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let b = Arc::clone(&hits_b);
        let _sub_b = store.subscribe(&watchlist(), move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });
        let other = Arc::clone(&hits_other);
        let _sub_other = store.subscribe(&ResourceKey::new("holdings"), move |_| {
            other.fetch_add(1, Ordering::SeqCst);
        });

        store.revalidate(&watchlist()).await.unwrap();

        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
        assert_eq!(hits_other.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_notifications_but_fetch_still_lands() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        store
            .registry()
            .register("watchlist", gated_fetcher(calls, Arc::clone(&gate), vec!["AAA"]));

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = store.subscribe(&watchlist(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.subscriber_count(&watchlist()), 1);

        let handle = store.refetch(&watchlist()).unwrap();
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(&watchlist()), 0);

        tokio::task::yield_now().await;
        gate.notify_one();
        handle.finished().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(store.get(&watchlist()).data.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_terminal_statuses() {
        for status in [429, 404, 401, 403] {
            let store = store();
            let calls = Arc::new(AtomicUsize::new(0));
            store
                .registry()
                .register("watchlist", failing_fetcher(Arc::clone(&calls), status));

            store.revalidate(&watchlist()).await.unwrap();
            assert!(!store.retry_scheduler().is_pending(&watchlist()));

            tokio::time::sleep(Duration::from_secs(300)).await;
            assert_eq!(calls.load(Ordering::SeqCst), 1, "status {status}");
            assert!(store.get(&watchlist()).error.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retries_exactly_once() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        store
            .registry()
            .register("watchlist", failing_fetcher(Arc::clone(&calls), 500));

        store.revalidate(&watchlist()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.retry_scheduler().is_pending(&watchlist()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let entry = store.get(&watchlist());
        assert_eq!(entry.error.as_ref().map(|e| e.kind), Some(ErrorKind::Transient));
        assert!(!entry.is_validating);
        assert!(!entry.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_blocks_automatic_but_not_explicit() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        store
            .registry()
            .register("watchlist", failing_fetcher(Arc::clone(&calls), 429));

        store.revalidate(&watchlist()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        store.ensure_fresh(&watchlist()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.revalidate(&watchlist()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_resolving_after_write_is_discarded() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        store
            .registry()
            .register("watchlist", gated_fetcher(calls, Arc::clone(&gate), vec!["stale"]));

        let handle = store.refetch(&watchlist()).unwrap();
        store.set(&watchlist(), vec!["fresh"]);

        tokio::task::yield_now().await;
        gate.notify_one();
        handle.finished().await;

        let entry = store.get_as::<Vec<&str>>(&watchlist()).unwrap();
        assert_eq!(entry.data.as_deref(), Some(&vec!["fresh"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_refetches_mounted_key() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        store
            .registry()
            .register("stock", counting_fetcher(Arc::clone(&calls)));

        let abc = ResourceKey::new("stock:ABC:preview");
        let xyz = ResourceKey::new("stock:XYZ:preview");
        store.revalidate(&abc).await.unwrap();
        store.revalidate(&xyz).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let _sub = store.subscribe(&abc, |_| {});
        store.invalidate_family("stock");
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Only the mounted key refetches immediately.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        store.ensure_fresh(&xyz).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_get_as_type_mismatch() {
        let store = store();
        store.set(&watchlist(), 42_u32);

        let err = store.get_as::<String>(&watchlist()).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert_eq!(store.get_as::<u32>(&watchlist()).unwrap().data.as_deref(), Some(&42));
    }

    #[test]
    fn test_missing_fetcher_is_an_error() {
        let store = store();
        let err = store.ensure_fresh(&watchlist()).unwrap_err();
        assert_eq!(err, StoreError::NoFetcher("watchlist".to_string()));
    }
}
