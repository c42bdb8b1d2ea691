//! Fetcher registry - maps resource keys to the code that loads them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::RawError;
use crate::policy::RevalidationPolicy;
use crate::store::{AnyData, ResourceKey};

/// Loads fresh data for a key from the remote side.
///
/// Implementations return the canonical value already translated; the store
/// never looks inside it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, key: &ResourceKey) -> Result<AnyData, RawError>;
}

/// Adapter turning an async closure into a [`Fetcher`].
pub struct FnFetcher<F>(F);

#[async_trait]
impl<F, Fut, T> Fetcher for FnFetcher<F>
where
    F: Fn(ResourceKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, RawError>> + Send,
    T: Send + Sync + 'static,
{
    async fn fetch(&self, key: &ResourceKey) -> Result<AnyData, RawError> {
        let value = (self.0)(key.clone()).await?;
        Ok(Arc::new(value))
    }
}

/// Wrap an async closure as a shareable fetcher.
pub fn fetcher_fn<F, Fut, T>(f: F) -> Arc<dyn Fetcher>
where
    F: Fn(ResourceKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RawError>> + Send + 'static,
    T: Send + Sync + 'static,
{
    Arc::new(FnFetcher(f))
}

#[derive(Default)]
struct Registrations {
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
    policies: HashMap<String, RevalidationPolicy>,
}

/// Central registry of fetchers and per-family revalidation policies.
///
/// Names are either a full key path (`stock:ABC:preview`) or a family
/// (`stock`). Lookups try the exact path first, then the family.
pub struct FetcherRegistry {
    inner: RwLock<Registrations>,
    default_policy: RevalidationPolicy,
}

impl FetcherRegistry {
    pub fn new(default_policy: RevalidationPolicy) -> Self {
        Self {
            inner: RwLock::new(Registrations::default()),
            default_policy,
        }
    }

    /// Register a fetcher using the default policy.
    pub fn register(&self, name: impl Into<String>, fetcher: Arc<dyn Fetcher>) {
        let name = name.into();
        debug!("Registering fetcher: {}", name);
        self.inner.write().fetchers.insert(name, fetcher);
    }

    /// Register a fetcher together with its revalidation policy.
    pub fn register_with_policy(
        &self,
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        policy: RevalidationPolicy,
    ) {
        let name = name.into();
        debug!("Registering fetcher: {} ({:?})", name, policy);
        let mut inner = self.inner.write();
        inner.fetchers.insert(name.clone(), fetcher);
        inner.policies.insert(name, policy);
    }

    /// Replace the policy for a name.
    ///
    /// Data fetched under the previous window keeps its original freshness,
    /// so shortening a window never makes cached data stale retroactively.
    pub fn set_policy(&self, name: impl Into<String>, policy: RevalidationPolicy) {
        self.inner.write().policies.insert(name.into(), policy);
    }

    /// Fetcher for a key, by exact path then family.
    pub fn fetcher_for(&self, key: &ResourceKey) -> Option<Arc<dyn Fetcher>> {
        let inner = self.inner.read();
        inner
            .fetchers
            .get(key.path())
            .or_else(|| inner.fetchers.get(key.family()))
            .cloned()
    }

    /// Policy for a key, by exact path then family, then the default.
    pub fn policy_for(&self, key: &ResourceKey) -> RevalidationPolicy {
        let inner = self.inner.read();
        inner
            .policies
            .get(key.path())
            .or_else(|| inner.policies.get(key.family()))
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().fetchers.contains_key(name)
    }

    /// Names of all registered fetchers.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().fetchers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("FetcherRegistry")
            .field("fetchers", &inner.fetchers.keys().collect::<Vec<_>>())
            .field("policies", &inner.policies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn registry() -> FetcherRegistry {
        FetcherRegistry::new(RevalidationPolicy::default())
    }

    #[test]
    fn test_exact_path_wins_over_family() {
        let registry = registry();
        registry.register("stock", fetcher_fn(|_| async { Ok::<_, RawError>("family") }));
        registry.register_with_policy(
            "stock:ABC:preview",
            fetcher_fn(|_| async { Ok::<_, RawError>("exact") }),
            RevalidationPolicy::reference_data(),
        );

        let exact = ResourceKey::new("stock:ABC:preview");
        let other = ResourceKey::new("stock:XYZ:preview");

        assert!(registry.fetcher_for(&exact).is_some());
        assert!(registry.fetcher_for(&other).is_some());
        assert_eq!(
            registry.policy_for(&exact).freshness,
            RevalidationPolicy::reference_data().freshness
        );
        assert_eq!(
            registry.policy_for(&other).freshness,
            RevalidationPolicy::default().freshness
        );
    }

    #[test]
    fn test_unknown_key_has_no_fetcher() {
        let registry = registry();
        assert!(registry.fetcher_for(&ResourceKey::new("watchlist")).is_none());
        assert!(!registry.contains("watchlist"));
    }

    #[test]
    fn test_set_policy_without_fetcher() {
        let registry = registry();
        registry.set_policy(
            "alerts",
            RevalidationPolicy::default().freshness(Duration::from_secs(5)),
        );
        let key = ResourceKey::new("alerts:triggered");
        assert_eq!(registry.policy_for(&key).freshness, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fn_fetcher_wraps_value() {
        let fetcher = fetcher_fn(|key: ResourceKey| async move {
            Ok::<_, RawError>(key.path().to_uppercase())
        });
        let data = fetcher.fetch(&ResourceKey::new("watchlist")).await.unwrap();
        assert_eq!(data.downcast_ref::<String>().map(String::as_str), Some("WATCHLIST"));
    }
}
