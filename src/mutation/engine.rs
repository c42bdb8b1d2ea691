//! Mutation engine.
//!
//! A mutation optionally writes a speculative value into the store, runs the
//! remote call, and then either reconciles with the server or rolls back.
//! Snapshots are tracked per mutation (a stack per key), so overlapping
//! writes to the same key roll back in the right order.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{MutationError, RawError, StoreError, classify};
use crate::store::{AnyData, CacheStore, MutationTicket, OptimisticFn, ResourceKey, ServerValue};

type Updater<T> = Box<dyn FnOnce(Option<&T>) -> T + Send>;
type Populate<T, R> = Box<dyn FnOnce(&R, Option<&T>) -> Option<T> + Send>;

/// One remote write against a cached resource of type `T`, answering `R`.
pub struct Mutation<T, R> {
    remote: BoxFuture<'static, Result<R, RawError>>,
    optimistic: Option<Updater<T>>,
    populate: Option<Populate<T, R>>,
    revalidate: bool,
}

impl<T, R> Mutation<T, R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Wrap the remote call. It does not run until the mutation is executed.
    pub fn new<F>(remote: F) -> Self
    where
        F: Future<Output = Result<R, RawError>> + Send + 'static,
    {
        Self {
            remote: remote.boxed(),
            optimistic: None,
            populate: None,
            revalidate: false,
        }
    }

    /// Show `update(current)` immediately, before the server answers.
    #[must_use]
    pub fn optimistic<F>(mut self, update: F) -> Self
    where
        F: FnOnce(Option<&T>) -> T + Send + 'static,
    {
        self.optimistic = Some(Box::new(update));
        self
    }

    /// Derive the confirmed value from the server response.
    ///
    /// `populate(response, base)` gets the value from before this mutation's
    /// optimistic write, so an endpoint that echoes one item can be merged
    /// into the list it came from. If that base moves before the mutation
    /// confirms, the derived value is dropped and the key refetched.
    #[must_use]
    pub fn populate<F>(mut self, populate: F) -> Self
    where
        F: FnOnce(&R, Option<&T>) -> Option<T> + Send + 'static,
    {
        self.populate = Some(Box::new(populate));
        self
    }

    /// Refetch the key once the write succeeds (for endpoints that don't echo
    /// full state).
    #[must_use]
    pub fn revalidate(mut self, revalidate: bool) -> Self {
        self.revalidate = revalidate;
        self
    }
}

/// Executes mutations against the shared store.
#[derive(Clone, Debug)]
pub struct MutationEngine {
    store: CacheStore,
}

impl MutationEngine {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Run a mutation against `key`.
    ///
    /// On failure the optimistic value is rolled back before the classified
    /// error is returned. Dropping the returned future before it completes
    /// also rolls back.
    pub async fn mutate<T, R>(&self, key: &ResourceKey, mutation: Mutation<T, R>) -> Result<R, MutationError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
    {
        let Mutation {
            remote,
            optimistic,
            populate,
            revalidate,
        } = mutation;

        let optimistic = optimistic.map(|update| erase_updater(key, update));
        let ticket = self.store.begin_mutation(key, optimistic)?;
        let mut pending = PendingMutation {
            store: &self.store,
            ticket: Some(ticket),
        };

        match remote.await {
            Ok(response) => {
                let server = match (populate, pending.ticket.as_ref()) {
                    (Some(populate), Some(ticket)) => apply_populate(&self.store, ticket, populate, &response),
                    _ => None,
                };
                pending.confirm(server, revalidate);
                debug!("Mutation on {} confirmed", key);
                Ok(response)
            }
            Err(raw) => {
                let err = classify(raw);
                warn!("Mutation on {} failed: {}", key, err);
                pending.rollback();
                Err(MutationError::Remote(err))
            }
        }
    }

    fn refetch(store: &CacheStore, key: &ResourceKey) {
        match store.refetch(key) {
            Ok(handle) => drop(handle),
            Err(err) => debug!("Not refetching {} after mutation: {}", key, err),
        }
    }
}

/// Type-erase a typed updater for the store.
fn erase_updater<T>(key: &ResourceKey, update: Updater<T>) -> OptimisticFn
where
    T: Send + Sync + 'static,
{
    let key = key.to_string();
    Box::new(move |current: Option<&AnyData>| {
        let typed = match current {
            Some(data) => Some((**data).downcast_ref::<T>().ok_or(StoreError::TypeMismatch {
                key,
                expected: type_name::<T>(),
            })?),
            None => None,
        };
        Ok(Arc::new(update(typed)) as AnyData)
    })
}

/// Run `populate` against the mutation's base value.
fn apply_populate<T, R>(
    store: &CacheStore,
    ticket: &MutationTicket,
    populate: Populate<T, R>,
    response: &R,
) -> Option<ServerValue>
where
    T: Send + Sync + 'static,
{
    let base = store.mutation_base(ticket);
    let typed = match &base {
        Some(data) => match (**data).downcast_ref::<T>() {
            Some(value) => Some(value),
            None => {
                warn!("Cached {} is not a {}, skipping populate", ticket.key, type_name::<T>());
                return None;
            }
        },
        None => None,
    };
    let data = Arc::new(populate(response, typed)?) as AnyData;
    Some(ServerValue { base, data })
}

/// Settles the ticket exactly once; rolls back if dropped unsettled.
struct PendingMutation<'a> {
    store: &'a CacheStore,
    ticket: Option<MutationTicket>,
}

impl PendingMutation<'_> {
    fn confirm(&mut self, server: Option<ServerValue>, revalidate: bool) {
        if let Some(ticket) = self.ticket.take()
            && self.store.confirm_mutation(&ticket, server, revalidate)
        {
            MutationEngine::refetch(self.store, &ticket.key);
        }
    }

    fn rollback(&mut self) {
        if let Some(ticket) = self.ticket.take()
            && self.store.rollback_mutation(&ticket)
        {
            MutationEngine::refetch(self.store, &ticket.key);
        }
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            debug!("Mutation dropped before settling, rolling back");
            self.rollback();
        }
    }
}
