//! Revalidation driver - turns triggers into `ensure_fresh` calls.
//!
//! Triggers that fire together collapse on their own: `ensure_fresh` is a
//! no-op while a fetch is in flight or the data is fresh.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::Trigger;
use crate::error::StoreError;
use crate::store::{CacheStore, ResourceKey};

/// Environment events that may revalidate mounted keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Focus,
    Reconnect,
}

impl From<LifecycleEvent> for Trigger {
    fn from(event: LifecycleEvent) -> Self {
        match event {
            LifecycleEvent::Focus => Trigger::Focus,
            LifecycleEvent::Reconnect => Trigger::Reconnect,
        }
    }
}

struct Poller {
    refs: usize,
    handle: AbortHandle,
}

struct RevalidatorInner {
    store: CacheStore,
    pollers: DashMap<ResourceKey, Poller>,
}

/// Applies revalidation policies to the store.
#[derive(Clone)]
pub struct Revalidator {
    inner: Arc<RevalidatorInner>,
}

impl Revalidator {
    pub fn new(store: CacheStore) -> Self {
        Self {
            inner: Arc::new(RevalidatorInner {
                store,
                pollers: DashMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Fire one trigger for a key, if its policy enables it.
    pub fn trigger(&self, key: &ResourceKey, trigger: Trigger) -> Result<(), StoreError> {
        let store = &self.inner.store;
        if !store.policy_for(key).allows(trigger) {
            return Ok(());
        }

        debug!("{:?} trigger for {}", trigger, key);
        match trigger {
            Trigger::Explicit => store.refetch(key).map(drop),
            _ => store.ensure_fresh(key),
        }
    }

    /// Deliver a focus/reconnect event to every mounted key.
    ///
    /// Returns how many keys had the trigger enabled.
    pub fn notify(&self, event: LifecycleEvent) -> usize {
        let trigger = Trigger::from(event);
        let store = &self.inner.store;
        let mut triggered = 0;

        for key in store.mounted_keys() {
            if !store.policy_for(&key).allows(trigger) {
                continue;
            }
            triggered += 1;
            if let Err(err) = store.ensure_fresh(&key) {
                warn!("{:?} revalidation failed for {}: {}", event, key, err);
            }
        }

        debug!("{:?} event revalidated {} keys", event, triggered);
        triggered
    }

    /// Forward lifecycle events from a channel until it closes.
    pub fn listen(&self, mut events: broadcast::Receiver<LifecycleEvent>) -> JoinHandle<()> {
        let revalidator = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        revalidator.notify(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Lifecycle listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Lifecycle event channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Keep the key's poller running while the guard lives.
    ///
    /// One poller runs per key no matter how many consumers mount it.
    /// Returns `None` when the key's policy has no refresh interval.
    pub fn acquire_poller(&self, key: &ResourceKey) -> Option<PollGuard> {
        let every = self.inner.store.policy_for(key).refresh_interval?;

        let mut poller = self.inner.pollers.entry(key.clone()).or_insert_with(|| Poller {
            refs: 0,
            handle: self.spawn_poller(key.clone(), every),
        });
        poller.refs += 1;

        Some(PollGuard {
            revalidator: self.clone(),
            key: key.clone(),
        })
    }

    fn spawn_poller(&self, key: ResourceKey, every: Duration) -> AbortHandle {
        debug!("Starting poller for {} every {:?}", key, every);
        let store = self.inner.store.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = store.ensure_fresh(&key) {
                    warn!("Interval revalidation failed for {}: {}", key, err);
                }
            }
        })
        .abort_handle()
    }

    fn release_poller(&self, key: &ResourceKey) {
        if let Entry::Occupied(mut poller) = self.inner.pollers.entry(key.clone()) {
            poller.get_mut().refs -= 1;
            if poller.get().refs == 0 {
                let (_, stopped) = poller.remove_entry();
                stopped.handle.abort();
                debug!("Stopped poller for {}", key);
            }
        }
    }

    pub fn active_pollers(&self) -> usize {
        self.inner.pollers.len()
    }
}

impl std::fmt::Debug for Revalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revalidator")
            .field("active_pollers", &self.inner.pollers.len())
            .finish()
    }
}

/// Keeps a key's poller alive. Dropping the last guard stops it.
pub struct PollGuard {
    revalidator: Revalidator,
    key: ResourceKey,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.revalidator.release_poller(&self.key);
    }
}
