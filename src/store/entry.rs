//! Read-only views of cache entries.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::ResourceKey;
use crate::error::ClassifiedError;

/// Type-erased cached value. Typed views downcast it on read.
pub type AnyData = Arc<dyn Any + Send + Sync>;

/// Snapshot of one key's state at the moment it was read.
#[derive(Clone)]
pub struct CacheEntry<T = AnyData> {
    pub key: ResourceKey,
    /// Last known value, possibly stale.
    pub data: Option<T>,
    /// Last classified failure for this key.
    pub error: Option<ClassifiedError>,
    /// When the current data was fetched from the server.
    pub fetched_at: Option<DateTime<Utc>>,
    /// A fetch is in flight.
    pub is_validating: bool,
    pub subscribers: usize,
    /// Bumped on every data write.
    pub revision: u64,
}

impl<T> CacheEntry<T> {
    pub(crate) fn empty(key: ResourceKey) -> Self {
        Self {
            key,
            data: None,
            error: None,
            fetched_at: None,
            is_validating: false,
            subscribers: 0,
            revision: 0,
        }
    }

    /// No data has arrived yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_validating
    }

    /// Convert the data while keeping the metadata.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<CacheEntry<U>, E> {
        let data = self.data.map(f).transpose()?;
        Ok(CacheEntry {
            key: self.key,
            data,
            error: self.error,
            fetched_at: self.fetched_at,
            is_validating: self.is_validating,
            subscribers: self.subscribers,
            revision: self.revision,
        })
    }
}

impl<T> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("has_data", &self.data.is_some())
            .field("error", &self.error)
            .field("fetched_at", &self.fetched_at)
            .field("is_validating", &self.is_validating)
            .field("subscribers", &self.subscribers)
            .field("revision", &self.revision)
            .finish()
    }
}
