//! Session wiring: one store, its revalidator and mutation engine.

use crate::config::SyncConfig;
use crate::mutation::MutationEngine;
use crate::policy::Revalidator;
use crate::resource::Resource;
use crate::store::{CacheStore, ResourceKey};

/// Everything a feature needs to read and write cached resources.
///
/// Build one per app session and clone it into repositories; all clones
/// share the same store.
#[derive(Clone, Debug)]
pub struct SyncContext {
    pub store: CacheStore,
    pub revalidator: Revalidator,
    pub mutations: MutationEngine,
}

impl SyncContext {
    pub fn new(config: &SyncConfig) -> Self {
        let store = CacheStore::new(config);
        Self {
            revalidator: Revalidator::new(store.clone()),
            mutations: MutationEngine::new(store.clone()),
            store,
        }
    }

    /// Mount a typed view over `key`. See [`Resource::mount`].
    pub fn mount<T, F>(&self, key: ResourceKey, on_change: F) -> Resource<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        Resource::mount(self, key, on_change)
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}
