//! Portfolio holdings repository.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use super::{decode, encode, upsert, without};
use crate::adapters::holding::{self, RemoteHolding};
use crate::adapters::Holding;
use crate::api::{Method, RemoteApi};
use crate::context::SyncContext;
use crate::error::{MutationError, RawError};
use crate::fetch::fetcher_fn;
use crate::mutation::Mutation;
use crate::resource::Resource;
use crate::store::ResourceKey;

const KEY: &str = "portfolio:holdings";

pub struct HoldingsRepository {
    ctx: SyncContext,
    api: Arc<dyn RemoteApi>,
    next_draft: AtomicU64,
}

impl HoldingsRepository {
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        let fetch_api = Arc::clone(&api);
        ctx.store.registry().register(
            KEY,
            fetcher_fn(move |_| {
                let api = Arc::clone(&fetch_api);
                async move {
                    let remote: Vec<RemoteHolding> = decode(api.get("portfolio/holdings").await?)?;
                    Ok::<_, RawError>(remote.into_iter().map(holding::to_canonical).collect::<Vec<_>>())
                }
            }),
        );

        Self {
            ctx: ctx.clone(),
            api,
            next_draft: AtomicU64::new(1),
        }
    }

    pub fn key() -> ResourceKey {
        ResourceKey::new(KEY)
    }

    pub fn mount<F>(&self, on_change: F) -> Resource<Vec<Holding>>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::key(), on_change)
    }

    pub fn holdings(&self) -> Option<Arc<Vec<Holding>>> {
        self.ctx.store.get_as::<Vec<Holding>>(&Self::key()).ok()?.data
    }

    /// Cost of all cached positions in `currency`.
    pub fn cost_total(&self, currency: &str) -> f64 {
        self.holdings().map_or(0.0, |holdings| {
            holdings
                .iter()
                .filter(|holding| holding.currency == currency)
                .map(Holding::cost_total)
                .sum()
        })
    }

    /// Create (empty id) or update a position.
    pub async fn save(&self, mut position: Holding) -> Result<Holding, MutationError> {
        position.symbol = position.symbol.trim().to_uppercase();
        let body = holding::to_remote(&position);
        let api = Arc::clone(&self.api);
        let is_new = position.id.is_empty();

        let (method, path) = if is_new {
            position.id = format!("draft-{}", self.next_draft.fetch_add(1, Ordering::Relaxed));
            (Method::Post, "portfolio/holdings".to_string())
        } else {
            (Method::Put, format!("portfolio/holdings/{}", position.id))
        };

        let mutation = Mutation::new(async move {
            let saved: RemoteHolding = decode(api.send(method, &path, Some(encode(&body)?)).await?)?;
            Ok::<_, RawError>(holding::to_canonical(saved))
        })
        .optimistic(move |current: Option<&Vec<Holding>>| {
            let id = position.id.clone();
            upsert(current, position, |existing| existing.id == id)
        })
        .populate(|saved: &Holding, base: Option<&Vec<Holding>>| {
            Some(upsert(base, saved.clone(), |existing| existing.id == saved.id))
        });

        let saved = self.ctx.mutations.mutate(&Self::key(), mutation).await?;
        info!("Saved holding {} ({} shares of {})", saved.id, saved.shares, saved.symbol);
        Ok(saved)
    }

    pub async fn remove(&self, id: &str) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("portfolio/holdings/{id}");
        let id = id.to_string();

        let mutation = Mutation::new(async move { api.send(Method::Delete, &path, None).await.map(drop) })
            .optimistic(move |current: Option<&Vec<Holding>>| without(current, |holding| holding.id == id));

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }
}
