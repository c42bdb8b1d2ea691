//! Reactive resource cache.
//!
//! ## Architecture
//!
//! - `ResourceKey` - identifies one remote resource (`watchlist`, `stock:ABC:preview`)
//! - `CacheStore` - shared key to entry map with deduplicated fetches,
//!   per-key revisions, and per-key subscriptions
//! - `CacheEntry` - read-only snapshot handed to consumers
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = CacheStore::new(&SyncConfig::default());
//! store.registry().register("watchlist", watchlist_fetcher);
//!
//! let _sub = store.subscribe(&key, |key| println!("{key} changed"));
//! store.ensure_fresh(&key)?;
//! let entry = store.get_as::<Vec<WatchlistItem>>(&key)?;
//! ```

mod cache_store;
mod entry;
mod key;

pub use cache_store::{CacheStore, Callback, FetchHandle, Subscription};
pub(crate) use cache_store::{MutationTicket, OptimisticFn, ServerValue};
pub use entry::{AnyData, CacheEntry};
pub use key::ResourceKey;
