//! smallcap-sync - data-sync core for the small-cap research dashboard
//!
//! A reactive resource cache with deduplicated fetches,
//! stale-while-revalidate reads, optimistic mutations with rollback and
//! status-based error classification.
//!
//! ## Architecture
//!
//! - `store` - Cache store, resource keys, subscriptions, fetch dedup
//! - `fetch` - Fetcher trait and registry (key/family to fetcher + policy)
//! - `policy` - Revalidation triggers, pollers, retry scheduling
//! - `mutation` - Optimistic writes with per-key snapshot stacks
//! - `error` - Error taxonomy and classification
//! - `adapters` - Wire shape to canonical model translation
//! - `resource` - Typed mounted view for UI consumers
//! - `api` - HTTP client for the dashboard API
//! - `repository` - Feature repositories (watchlist, alerts, portfolio, ...)
//! - `config` - Environment configuration

pub mod adapters;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod mutation;
pub mod policy;
pub mod repository;
pub mod resource;
pub mod store;

pub use context::SyncContext;
pub use error::{ClassifiedError, ErrorKind, MutationError, RawError, StoreError, classify};
pub use mutation::{Mutation, MutationEngine};
pub use resource::{Resource, ResourceState};
pub use store::{CacheEntry, CacheStore, ResourceKey};
