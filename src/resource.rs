//! Subscriber binding: a typed, mounted view over one cache key.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::warn;

use crate::context::SyncContext;
use crate::error::{ClassifiedError, ErrorKind, StoreError};
use crate::policy::{PollGuard, Revalidator, Trigger};
use crate::store::{CacheStore, ResourceKey, Subscription};

/// Snapshot of a resource for rendering.
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ClassifiedError>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running (with or without data).
    pub is_validating: bool,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_validating: false,
        }
    }
}

/// A mounted resource. Dropping it unsubscribes and releases its poller;
/// a fetch already in flight still lands in the store.
pub struct Resource<T> {
    key: ResourceKey,
    store: CacheStore,
    revalidator: Revalidator,
    _subscription: Subscription,
    poller: Option<PollGuard>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Resource<T>
where
    T: Send + Sync + 'static,
{
    /// Subscribe to `key`, fire the mount trigger and start its poller
    /// (if the key's policy polls).
    pub fn mount<F>(ctx: &SyncContext, key: ResourceKey, on_change: F) -> Self
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        let subscription = ctx.store.subscribe(&key, on_change);
        let poller = ctx.revalidator.acquire_poller(&key);

        if let Err(err) = ctx.revalidator.trigger(&key, Trigger::Mount) {
            warn!("Cannot load {}: {}", key, err);
            let mut error = ClassifiedError::new(ErrorKind::Unknown, err.to_string());
            error.code = Some("no_fetcher".to_string());
            ctx.store.set_error(&key, error);
        }

        Self {
            key,
            store: ctx.store.clone(),
            revalidator: ctx.revalidator.clone(),
            _subscription: subscription,
            poller,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Current state. Never blocks on I/O.
    pub fn state(&self) -> ResourceState<T> {
        match self.store.get_as::<T>(&self.key) {
            Ok(entry) => ResourceState {
                is_loading: entry.is_loading(),
                is_validating: entry.is_validating,
                data: entry.data,
                error: entry.error,
            },
            Err(err) => {
                warn!("Resource {} unreadable: {}", self.key, err);
                ResourceState {
                    error: Some(ClassifiedError::new(ErrorKind::Unknown, err.to_string())),
                    ..ResourceState::default()
                }
            }
        }
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    /// Explicit revalidation: refetch regardless of freshness and wait for
    /// the result to land.
    pub async fn mutate(&self) -> Result<(), StoreError> {
        self.store.revalidate(&self.key).await
    }

    /// Fire a non-blocking explicit trigger.
    pub fn refresh(&self) -> Result<(), StoreError> {
        self.revalidator.trigger(&self.key, Trigger::Explicit)
    }
}

impl<T> std::fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("key", &self.key)
            .field("polling", &self.poller.is_some())
            .finish()
    }
}
