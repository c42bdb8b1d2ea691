//! Triggered alerts inbox.

use std::sync::Arc;
use std::time::Duration;

use super::{decode, without};
use crate::adapters::triggered_alert::{self, RemoteTriggeredAlert};
use crate::adapters::TriggeredAlert;
use crate::api::{Method, RemoteApi};
use crate::context::SyncContext;
use crate::error::{MutationError, RawError};
use crate::fetch::fetcher_fn;
use crate::mutation::Mutation;
use crate::policy::RevalidationPolicy;
use crate::resource::Resource;
use crate::store::ResourceKey;

const KEY: &str = "alerts:triggered";

/// Alerts that have fired, unread first.
pub struct TriggeredAlertsRepository {
    ctx: SyncContext,
    api: Arc<dyn RemoteApi>,
}

impl TriggeredAlertsRepository {
    /// With `poll` set, the inbox refreshes on that interval while mounted.
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>, poll: Option<Duration>) -> Self {
        let fetch_api = Arc::clone(&api);
        let fetcher = fetcher_fn(move |_| {
            let api = Arc::clone(&fetch_api);
            async move {
                let remote: Vec<RemoteTriggeredAlert> = decode(api.get("alerts/triggered").await?)?;
                let mut alerts: Vec<TriggeredAlert> = remote.into_iter().map(triggered_alert::to_canonical).collect();
                triggered_alert::sort_for_inbox(&mut alerts);
                Ok::<_, RawError>(alerts)
            }
        });

        match poll {
            Some(every) => ctx
                .store
                .registry()
                .register_with_policy(KEY, fetcher, RevalidationPolicy::live(every)),
            None => ctx.store.registry().register(KEY, fetcher),
        }

        Self { ctx: ctx.clone(), api }
    }

    pub fn key() -> ResourceKey {
        ResourceKey::new(KEY)
    }

    pub fn mount<F>(&self, on_change: F) -> Resource<Vec<TriggeredAlert>>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::key(), on_change)
    }

    pub fn alerts(&self) -> Option<Arc<Vec<TriggeredAlert>>> {
        self.ctx.store.get_as::<Vec<TriggeredAlert>>(&Self::key()).ok()?.data
    }

    pub fn unread_count(&self) -> usize {
        self.alerts()
            .map_or(0, |alerts| alerts.iter().filter(|alert| !alert.read).count())
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("alerts/triggered/{id}/read");
        let id = id.to_string();

        let mutation = Mutation::new(async move { api.send(Method::Post, &path, None).await.map(drop) })
            .optimistic(move |current: Option<&Vec<TriggeredAlert>>| {
                mark(current, |alert| alert.id == id)
            });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }

    pub async fn mark_all_read(&self) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);

        let mutation = Mutation::new(async move {
            api.send(Method::Post, "alerts/triggered/read-all", None).await.map(drop)
        })
        .optimistic(|current: Option<&Vec<TriggeredAlert>>| mark(current, |_| true));

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }

    pub async fn dismiss(&self, id: &str) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("alerts/triggered/{id}");
        let id = id.to_string();

        let mutation = Mutation::new(async move { api.send(Method::Delete, &path, None).await.map(drop) })
            .optimistic(move |current: Option<&Vec<TriggeredAlert>>| {
                without(current, |alert| alert.id == id)
            });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }
}

fn mark(current: Option<&Vec<TriggeredAlert>>, matches: impl Fn(&TriggeredAlert) -> bool) -> Vec<TriggeredAlert> {
    let mut alerts = current.cloned().unwrap_or_default();
    for alert in alerts.iter_mut().filter(|alert| matches(alert)) {
        alert.read = true;
    }
    triggered_alert::sort_for_inbox(&mut alerts);
    alerts
}
