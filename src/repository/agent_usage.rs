//! AI research agent usage. Read-only; the counters move on the server when
//! a question is asked.

use std::sync::Arc;

use super::decode;
use crate::adapters::agent_usage::{self, RemoteAgentUsage};
use crate::adapters::AgentUsage;
use crate::api::RemoteApi;
use crate::error::RawError;
use crate::context::SyncContext;
use crate::fetch::fetcher_fn;
use crate::resource::Resource;
use crate::store::ResourceKey;

const KEY: &str = "agent:usage";

pub struct AgentUsageRepository {
    ctx: SyncContext,
}

impl AgentUsageRepository {
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        ctx.store.registry().register(
            KEY,
            fetcher_fn(move |_| {
                let api = Arc::clone(&api);
                async move {
                    let remote: RemoteAgentUsage = decode(api.get("agent/usage").await?)?;
                    Ok::<_, RawError>(agent_usage::to_canonical(remote))
                }
            }),
        );

        Self { ctx: ctx.clone() }
    }

    pub fn key() -> ResourceKey {
        ResourceKey::new(KEY)
    }

    pub fn mount<F>(&self, on_change: F) -> Resource<AgentUsage>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::key(), on_change)
    }

    pub fn usage(&self) -> Option<Arc<AgentUsage>> {
        self.ctx.store.get_as::<AgentUsage>(&Self::key()).ok()?.data
    }

    /// Whether another question may be asked. Unknown usage allows it; the
    /// server enforces the limit anyway.
    pub fn can_ask(&self) -> bool {
        self.usage().is_none_or(|usage| !usage.is_exhausted())
    }

    /// Call after a question was answered so the counters catch up.
    pub fn query_recorded(&self) {
        self.ctx.store.invalidate(&Self::key());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::adapters::Plan;
    use crate::api::Method;
    use crate::api::fake::FakeApi;

    #[tokio::test(start_paused = true)]
    async fn test_usage_refreshes_after_query() {
        let api = Arc::new(FakeApi::new());
        api.respond(Method::Get, "agent/usage", Ok(json!({"tier": "pro", "queries_used": 49, "query_limit": 50})));
        api.respond(Method::Get, "agent/usage", Ok(json!({"tier": "pro", "queries_used": 50, "query_limit": 50})));

        let ctx = SyncContext::default();
        let repo = AgentUsageRepository::new(&ctx, Arc::clone(&api) as Arc<dyn RemoteApi>);
        assert!(repo.can_ask());

        let _resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        let usage = repo.usage().unwrap();
        assert_eq!(usage.plan, Plan::Pro);
        assert_eq!(usage.remaining(), 1);
        assert!(repo.can_ask());

        repo.query_recorded();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!repo.can_ask());
        assert_eq!(api.calls(Method::Get, "agent/usage"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defaults_for_sparse_payload() {
        let api = Arc::new(FakeApi::new());
        api.respond(Method::Get, "agent/usage", Ok(json!({})));

        let ctx = SyncContext::default();
        let repo = AgentUsageRepository::new(&ctx, Arc::clone(&api) as Arc<dyn RemoteApi>);
        let resource = repo.mount(|_| {});
        tokio::time::sleep(Duration::from_millis(1)).await;

        let usage = resource.data().unwrap();
        assert_eq!(usage.plan, Plan::Free);
        assert_eq!(usage.limit, 10);
        assert_eq!(usage.used, 0);
    }
}
