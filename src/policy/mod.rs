//! When to refetch, and whether to try again after a failure.
//!
//! - `RevalidationPolicy` - per-family freshness window and enabled triggers
//! - `Revalidator` - drives mount/explicit/interval/focus/reconnect triggers
//! - `RetryScheduler` - bounded, classification-aware retries

mod retry;
mod revalidation;
mod revalidator;

pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use revalidation::{RevalidationPolicy, Trigger};
pub use revalidator::{LifecycleEvent, PollGuard, Revalidator};
