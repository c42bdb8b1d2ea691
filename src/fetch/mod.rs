//! Fetchers and the registry that maps keys to them.

mod registry;

pub use registry::{Fetcher, FetcherRegistry, FnFetcher, fetcher_fn};
