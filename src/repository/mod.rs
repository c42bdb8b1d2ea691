//! Feature repositories.
//!
//! Each repository registers the fetchers for its keys on construction and
//! exposes typed reads plus mutations. Wire shapes never leave this module;
//! fetchers translate through [`crate::adapters`] before data reaches the
//! store.

mod agent_usage;
mod alert_rules;
mod holdings;
mod stocks;
mod triggered_alerts;
mod watchlist;

pub use agent_usage::AgentUsageRepository;
pub use alert_rules::AlertRulesRepository;
pub use holdings::HoldingsRepository;
pub use stocks::StockRepository;
pub use triggered_alerts::TriggeredAlertsRepository;
pub use watchlist::WatchlistRepository;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RawError;

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RawError> {
    Ok(serde_json::from_value(value)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RawError> {
    Ok(serde_json::to_value(value)?)
}

/// Replace the item matching `matches` or append it.
fn upsert<T: Clone>(current: Option<&Vec<T>>, item: T, matches: impl Fn(&T) -> bool) -> Vec<T> {
    let mut list = current.cloned().unwrap_or_default();
    match list.iter_mut().find(|existing| matches(existing)) {
        Some(existing) => *existing = item,
        None => list.push(item),
    }
    list
}

fn without<T: Clone>(current: Option<&Vec<T>>, remove: impl Fn(&T) -> bool) -> Vec<T> {
    current
        .map(|list| list.iter().filter(|item| !remove(item)).cloned().collect())
        .unwrap_or_default()
}
