//! Alert rules repository.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tracing::info;

use super::{TriggeredAlertsRepository, decode, encode, upsert, without};
use crate::adapters::alert_rule::{self, RemoteAlertRule};
use crate::adapters::AlertRule;
use crate::api::{Method, RemoteApi};
use crate::context::SyncContext;
use crate::error::{MutationError, RawError};
use crate::fetch::fetcher_fn;
use crate::mutation::Mutation;
use crate::resource::Resource;
use crate::store::ResourceKey;

const KEY: &str = "alerts:rules";

/// Alert rules the user has configured.
pub struct AlertRulesRepository {
    ctx: SyncContext,
    api: Arc<dyn RemoteApi>,
    next_draft: AtomicU64,
}

impl AlertRulesRepository {
    pub fn new(ctx: &SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        let fetch_api = Arc::clone(&api);
        ctx.store.registry().register(
            KEY,
            fetcher_fn(move |_| {
                let api = Arc::clone(&fetch_api);
                async move {
                    let remote: Vec<RemoteAlertRule> = decode(api.get("alerts/rules").await?)?;
                    Ok::<_, RawError>(remote.into_iter().map(alert_rule::to_canonical).collect::<Vec<_>>())
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

    pub fn mount<F>(&self, on_change: F) -> Resource<Vec<AlertRule>>
    where
        F: Fn(&ResourceKey) + Send + Sync + 'static,
    {
        self.ctx.mount(Self::key(), on_change)
    }

    pub fn rules(&self) -> Option<Arc<Vec<AlertRule>>> {
        self.ctx.store.get_as::<Vec<AlertRule>>(&Self::key()).ok()?.data
    }

    /// Rules watching one ticker.
    pub fn rules_for(&self, symbol: &str) -> Vec<AlertRule> {
        let symbol = symbol.trim().to_uppercase();
        self.rules()
            .map(|rules| rules.iter().filter(|rule| rule.symbol == symbol).cloned().collect())
            .unwrap_or_default()
    }

    /// Create a rule. A draft with a placeholder id is shown until the
    /// server's copy replaces it.
    pub async fn create(&self, mut draft: AlertRule) -> Result<AlertRule, MutationError> {
        draft.symbol = draft.symbol.trim().to_uppercase();
        let mut body = alert_rule::to_remote(&draft);
        body.id.clear();

        draft.id = format!("draft-{}", self.next_draft.fetch_add(1, Ordering::Relaxed));
        let api = Arc::clone(&self.api);

        let mutation = Mutation::new(async move {
            let created: RemoteAlertRule = decode(api.send(Method::Post, "alerts/rules", Some(encode(&body)?)).await?)?;
            Ok::<_, RawError>(alert_rule::to_canonical(created))
        })
        .optimistic(move |current: Option<&Vec<AlertRule>>| {
            let mut rules = current.cloned().unwrap_or_default();
            rules.push(draft);
            rules
        })
        .populate(|created: &AlertRule, base: Option<&Vec<AlertRule>>| {
            Some(upsert(base, created.clone(), |existing| existing.id == created.id))
        });

        let created = self.ctx.mutations.mutate(&Self::key(), mutation).await?;
        info!("Created alert rule {} for {}", created.id, created.symbol);
        Ok(created)
    }

    /// Replace a rule with an edited copy.
    pub async fn update(&self, rule: AlertRule) -> Result<AlertRule, MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("alerts/rules/{}", rule.id);
        let body = alert_rule::to_remote(&rule);

        let mutation = Mutation::new(async move {
            let saved: RemoteAlertRule = decode(api.send(Method::Put, &path, Some(encode(&body)?)).await?)?;
            Ok::<_, RawError>(alert_rule::to_canonical(saved))
        })
        .optimistic(move |current: Option<&Vec<AlertRule>>| {
            let id = rule.id.clone();
            upsert(current, rule, |existing| existing.id == id)
        })
        .populate(|saved: &AlertRule, base: Option<&Vec<AlertRule>>| {
            Some(upsert(base, saved.clone(), |existing| existing.id == saved.id))
        });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("alerts/rules/{id}");
        let id = id.to_string();

        let mutation = Mutation::new(async move {
            api.send(Method::Patch, &path, Some(json!({ "is_active": enabled })))
                .await
                .map(drop)
        })
        .optimistic(move |current: Option<&Vec<AlertRule>>| {
            let mut rules = current.cloned().unwrap_or_default();
            if let Some(rule) = rules.iter_mut().find(|rule| rule.id == id) {
                rule.enabled = enabled;
            }
            rules
        });

        self.ctx.mutations.mutate(&Self::key(), mutation).await
    }

    /// Delete a rule. Its triggered alerts go with it, so the inbox is
    /// invalidated too.
    pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
        let api = Arc::clone(&self.api);
        let path = format!("alerts/rules/{id}");
        let id = id.to_string();

        let mutation = Mutation::new(async move { api.send(Method::Delete, &path, None).await.map(drop) })
            .optimistic(move |current: Option<&Vec<AlertRule>>| without(current, |rule| rule.id == id));

        self.ctx.mutations.mutate(&Self::key(), mutation).await?;
        self.ctx.store.invalidate(&TriggeredAlertsRepository::key());
        Ok(())
    }
}
