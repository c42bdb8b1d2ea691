//! Watchlist repository.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::{decode, encode, upsert, without};
use crate::adapters::watchlist::{self, RemoteWatchlist, RemoteWatchlistItem, normalize_symbol};
use crate::adapters::WatchlistItem;
use crate::api::{Method, RemoteApi};
use crate::context::SyncContext;
use crate::error::{MutationError, RawError};
use crate::fetch::fetcher_fn;
use crate::mutation::Mutation;
use crate::resource::Resource;
use crate::store::ResourceKey;

const KEY: &str = "watchlist";

/// The signed-in user's watchlist.
pub struct WatchlistRepository {
    ctx: SyncContext,
    api: Arc<dyn RemoteApi>,
}

impl WatchlistRepository {
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        let fetch_api = Arc::clone(&api);
        ctx.store.registry().register(
            KEY,
            fetcher_fn(move |_| {
                let api = Arc::clone(&fetch_api);
                async move {
                    let remote: RemoteWatchlist = decode(api.get("watchlist").await?)?;
                    Ok::<_, RawError>(watchlist::list_to_canonical(remote))
                }
            }),
        );

        Self { ctx: ctx.clone(), api }
    }

    pub fn key() -> ResourceKey {
        ResourceKey::new(KEY)
    }

    pub fn mount<F>(&self, on_change: F) -> Resource<Vec<WatchlistItem>>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::key(), on_change)
    }

    /// Cached items, if loaded.
    pub fn items(&self) -> Option<Arc<Vec<WatchlistItem>>> {
        self.ctx.store.get_as::<Vec<WatchlistItem>>(&Self::key()).ok()?.data
    }

    pub fn contains(&self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        self.items()
            .is_some_and(|items| items.iter().any(|item| item.symbol == symbol))
    }

    /// Add a ticker. It shows up immediately and is replaced by the server's
    /// copy (company name, timestamps) once the write is confirmed.
    pub async fn add(&self, symbol: &str) -> Result<WatchlistItem, MutationError> {
        let item = WatchlistItem::new(symbol);
        let api = Arc::clone(&self.api);
        let body = watchlist::to_remote(&item);
        let pending = item.clone();

        let mutation = Mutation::new(async move {
            let created: RemoteWatchlistItem = decode(api.send(Method::Post, "watchlist", Some(encode(&body)?)).await?)?;
            Ok::<_, RawError>(watchlist::to_canonical(created))
        })
        .optimistic(move |current: Option<&Vec<WatchlistItem>>| {
            let mut items = current.cloned().unwrap_or_default();
            if !items.iter().any(|existing| existing.symbol == pending.symbol) {
                items.push(pending);
            }
            items
        })
        .populate(|created: &WatchlistItem, base: Option<&Vec<WatchlistItem>>| {
            Some(upsert(base, created.clone(), |existing| existing.symbol == created.symbol))
        });

        let created = self.ctx.mutations.mutate(&Self::key(), mutation).await?;
        info!("Added {} to watchlist", created.symbol);
        Ok(created)
    }

    pub async fn remove(&self, symbol: &str) -> Result<(), MutationError> {
        let symbol = normalize_symbol(symbol);
        let api = Arc::clone(&self.api);
        let path = format!("watchlist/{symbol}");

        let mutation = Mutation::new(async move { api.send(Method::Delete, &path, None).await.map(drop) })
            .optimistic(move |current: Option<&Vec<WatchlistItem>>| {
                without(current, |item| item.symbol == symbol)
            });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }

    pub async fn update_notes(&self, symbol: &str, notes: &str) -> Result<(), MutationError> {
        let symbol = normalize_symbol(symbol);
        let notes = notes.trim().to_string();
        let api = Arc::clone(&self.api);
        let path = format!("watchlist/{symbol}");
        let body = json!({ "notes": notes });

        let mutation = Mutation::new(async move { api.send(Method::Patch, &path, Some(body)).await.map(drop) })
            .optimistic(move |current: Option<&Vec<WatchlistItem>>| {
                let mut items = current.cloned().unwrap_or_default();
                if let Some(item) = items.iter_mut().find(|item| item.symbol == symbol) {
                    item.notes = notes;
                }
                items
            });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeApi;
    use crate::error::{ErrorKind, RawError};

    fn symbols(repo: &WatchlistRepository) -> Vec<String> {
        repo.items()
            .map(|items| items.iter().map(|item| item.symbol.clone()).collect())
            .unwrap_or_default()
    }

    fn setup(api: &Arc<FakeApi>) -> WatchlistRepository {
        api.respond(
            Method::Get,
            "watchlist",
            Ok(json!({"items": [{"ticker": "AAA"}, {"ticker": "BBB"}]})),
        );
        let ctx = SyncContext::default();
        WatchlistRepository::new(&ctx, Arc::clone(api) as Arc<dyn RemoteApi>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_add_rolls_back() {
        let api = Arc::new(FakeApi::new());
        let repo = setup(&api);
        let _resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(symbols(&repo), vec!["AAA", "BBB"]);

        api.respond(Method::Post, "watchlist", Err(RawError::status(500, "boom")));
        let err = repo.add("CCC").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(symbols(&repo), vec!["AAA", "BBB"]);
        assert_eq!(api.calls(Method::Post, "watchlist"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_confirms_with_server_copy() {
        let api = Arc::new(FakeApi::new());
        let repo = setup(&api);
        let _resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        api.respond(
            Method::Post,
            "watchlist",
            Ok(json!({"ticker": "CCC", "company_name": "Ccc Resources"})),
        );

        let created = repo.add(" ccc ").await.unwrap();
        assert_eq!(created.name.as_deref(), Some("Ccc Resources"));
        assert_eq!(api.last_body(Method::Post, "watchlist"), Some(json!({"ticker": "CCC", "tags": []})));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.calls(Method::Get, "watchlist"), 1);
        let items = repo.items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].name.as_deref(), Some("Ccc Resources"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_notes() {
        let api = Arc::new(FakeApi::new());
        let repo = setup(&api);
        let _resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        api.respond(Method::Patch, "watchlist/AAA", Ok(serde_json::Value::Null));
        repo.update_notes("aaa", " earnings in May ").await.unwrap();
        assert_eq!(repo.items().unwrap()[0].notes, "earnings in May");

        api.respond(Method::Delete, "watchlist/BBB", Ok(serde_json::Value::Null));
        repo.remove("bbb").await.unwrap();
        assert_eq!(symbols(&repo), vec!["AAA"]);
        assert!(!repo.contains("BBB"));
        assert!(repo.contains(" aaa"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_remove_restores_item() {
        let api = Arc::new(FakeApi::new());
        let repo = setup(&api);
        let _resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        api.respond(Method::Delete, "watchlist/AAA", Err(RawError::status(403, "forbidden")));
        let err = repo.remove("AAA").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(symbols(&repo), vec!["AAA", "BBB"]);
    }
}
