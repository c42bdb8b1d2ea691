//! Retry scheduling for failed fetches.
//!
//! | kind         | retry?     | delay |
//! |--------------|------------|-------|
//! | NotFound     | never      | -     |
//! | Unauthorized | never      | -     |
//! | RateLimited  | never      | -     |
//! | Transient    | at most 1  | fixed |
//! | Unknown      | at most 1  | fixed |

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{ClassifiedError, ErrorKind};
use crate::store::ResourceKey;

/// Retry budget for one failure episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(30),
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    GiveUp,
    RetryAfter(Duration),
}

impl RetryPolicy {
    /// Decide what to do after attempt number `attempt` failed.
    /// The first fetch is attempt 0.
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if kind.is_retryable() && attempt < self.max_retries {
            RetryDecision::RetryAfter(self.delay)
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Holds at most one pending retry timer per key.
pub struct RetryScheduler {
    policy: RetryPolicy,
    pending: Arc<DashMap<ResourceKey, (u64, AbortHandle)>>,
    next_id: AtomicU64,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Schedule `action` after the policy delay, if the error allows a retry.
    ///
    /// Replaces any timer already pending for the key. Returns whether a
    /// retry was scheduled.
    pub fn schedule<F>(&self, key: &ResourceKey, error: &ClassifiedError, attempt: u32, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = match self.policy.decide(error.kind, attempt) {
            RetryDecision::GiveUp => {
                debug!("No retry for {} after attempt {} ({})", key, attempt, error.kind);
                return false;
            }
            RetryDecision::RetryAfter(delay) => delay,
        };

        debug!("Retrying {} in {:?} (attempt {})", key, delay, attempt + 1);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove_if(&task_key, |_, (task_id, _)| *task_id == id);
            action();
        });

        if let Some((_, previous)) = self.pending.insert(key.clone(), (id, handle.abort_handle())) {
            previous.abort();
        }

        true
    }

    /// Cancel the pending retry for a key. Returns whether one was pending.
    pub fn cancel(&self, key: &ResourceKey) -> bool {
        match self.pending.remove(key) {
            Some((_, (_, handle))) => {
                handle.abort();
                debug!("Cancelled pending retry for {}", key);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &ResourceKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("policy", &self.policy)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn error(kind: ErrorKind) -> ClassifiedError {
        ClassifiedError::new(kind, "test")
    }

    #[test]
    fn test_policy_table() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(ErrorKind::NotFound, 0), RetryDecision::GiveUp);
        assert_eq!(policy.decide(ErrorKind::Unauthorized, 0), RetryDecision::GiveUp);
        assert_eq!(policy.decide(ErrorKind::RateLimited, 0), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(ErrorKind::Transient, 0),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
        assert_eq!(
            policy.decide(ErrorKind::Unknown, 0),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
        assert_eq!(policy.decide(ErrorKind::Transient, 1), RetryDecision::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_runs_after_delay() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let key = ResourceKey::new("watchlist");
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        assert!(scheduler.schedule(&key, &error(ErrorKind::Transient), 0, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(scheduler.is_pending(&key));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_schedule_for_terminal_kinds() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let key = ResourceKey::new("watchlist");

        for kind in [ErrorKind::NotFound, ErrorKind::Unauthorized, ErrorKind::RateLimited] {
            assert!(!scheduler.schedule(&key, &error(kind), 0, || {}));
        }
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let key = ResourceKey::new("watchlist");
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        scheduler.schedule(&key, &error(ErrorKind::Unknown), 0, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(&key));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
