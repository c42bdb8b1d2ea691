//! Stock reference data (`stock:<SYMBOL>:preview`).

use std::sync::Arc;

use super::decode;
use crate::adapters::stock_preview::{self, RemoteStockPreview};
use crate::adapters::StockPreview;
use crate::adapters::watchlist::normalize_symbol;
use crate::api::RemoteApi;
use crate::context::SyncContext;
use crate::error::{RawError, StoreError};
use crate::fetch::fetcher_fn;
use crate::policy::RevalidationPolicy;
use crate::resource::Resource;
use crate::store::ResourceKey;

const FAMILY: &str = "stock";

/// Stock previews. Reference data changes slowly, so the whole family uses
/// a long freshness window.
pub struct StockRepository {
    ctx: SyncContext,
}

impl StockRepository {
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        ctx.store.registry().register_with_policy(
            FAMILY,
            fetcher_fn(move |key: ResourceKey| {
                let api = Arc::clone(&api);
                async move {
                    let symbol = key
                        .segment(1)
                        .filter(|symbol| !symbol.is_empty())
                        .ok_or_else(|| RawError::other(format!("no symbol in key {key}")))?;
                    let path = format!("stocks/{symbol}/preview");
                    let remote: RemoteStockPreview = decode(api.get(&path).await?)?;
                    Ok::<_, RawError>(stock_preview::to_canonical(remote))
                }
            }),
            RevalidationPolicy::reference_data(),
        );

        Self { ctx: ctx.clone() }
    }

    pub fn preview_key(symbol: &str) -> ResourceKey {
        ResourceKey::new(format!("{FAMILY}:{}:preview", normalize_symbol(symbol)))
    }

    pub fn mount<F>(&self, symbol: &str, on_change: F) -> Resource<StockPreview>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::preview_key(symbol), on_change)
    }

    pub fn preview(&self, symbol: &str) -> Option<Arc<StockPreview>> {
        self.ctx.store.get_as::<StockPreview>(&Self::preview_key(symbol)).ok()?.data
    }

    /// Warm the cache (e.g. on hover) without mounting.
    pub fn prefetch(&self, symbol: &str) -> Result<(), StoreError> {
        self.ctx.store.ensure_fresh(&Self::preview_key(symbol))
    }

    /// Mark every preview stale, e.g. after market close.
    pub fn invalidate_all(&self) {
        self.ctx.store.invalidate_family(FAMILY);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::api::Method;
    use crate::api::fake::FakeApi;
    use crate::error::ErrorKind;

    fn setup() -> (Arc<FakeApi>, StockRepository) {
        let api = Arc::new(FakeApi::new());
        api.respond(
            Method::Get,
            "stocks/ABCD/preview",
            Ok(json!({"ticker": "abcd", "company_name": "Abcd Mining", "quote": {"last": 0.42, "volume": 120000}})),
        );
        let ctx = SyncContext::default();
        let repo = StockRepository::new(&ctx, Arc::clone(&api) as Arc<dyn RemoteApi>);
        (api, repo)
    }

    #[test]
    fn test_preview_key() {
        assert_eq!(StockRepository::preview_key(" abcd ").to_string(), "stock:ABCD:preview");
    }

    #[tokio::test(start_paused = true)]
    async fn test_previews_are_reference_data() {
        let (api, repo) = setup();

        repo.prefetch("abcd").unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let preview = repo.preview("ABCD").unwrap();
        assert_eq!(preview.name, "Abcd Mining");
        assert_eq!(preview.price, Some(0.42));

        // Well past the default window, still inside the reference-data one.
        tokio::time::sleep(Duration::from_secs(600)).await;
        let _resource = repo.mount("ABCD", |_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.calls(Method::Get, "stocks/ABCD/preview"), 1);

        repo.invalidate_all();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.calls(Method::Get, "stocks/ABCD/preview"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_symbol_is_not_found() {
        let (api, repo) = setup();

        let resource = repo.mount("ZZZZ", |_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        let state = resource.state();
        assert!(state.data.is_none());
        assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::NotFound));
        assert_eq!(api.calls(Method::Get, "stocks/ZZZZ/preview"), 1);
    }
}
