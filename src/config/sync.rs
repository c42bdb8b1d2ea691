//! Global sync defaults.

use std::time::Duration;

use crate::policy::{RetryPolicy, RevalidationPolicy};

/// Session-wide defaults for the cache and its revalidation triggers.
///
/// Resource families can override any of these through their own
/// [`RevalidationPolicy`]; this is what they start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Data younger than this is served without refetching.
    pub freshness: Duration,

    /// Delay before the single retry of a transient failure.
    pub retry_delay: Duration,

    /// Retries allowed per failure episode.
    pub max_retries: u32,

    /// Refetch when the dashboard regains focus.
    /// Off by default: every mounted key firing at once trips upstream rate limits.
    pub revalidate_on_focus: bool,

    /// Refetch when the network comes back. Off by default.
    pub revalidate_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(60),
            retry_delay: Duration::from_secs(30),
            max_retries: 1,
            revalidate_on_focus: false,
            revalidate_on_reconnect: false,
        }
    }
}

impl SyncConfig {
    /// Set the default freshness window.
    #[must_use]
    pub fn freshness(mut self, duration: Duration) -> Self {
        self.freshness = duration;
        self
    }

    /// Set the delay before a retry.
    #[must_use]
    pub fn retry_delay(mut self, duration: Duration) -> Self {
        self.retry_delay = duration;
        self
    }

    /// Enable or disable focus revalidation.
    #[must_use]
    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }

    /// Enable or disable reconnect revalidation.
    #[must_use]
    pub fn revalidate_on_reconnect(mut self, enabled: bool) -> Self {
        self.revalidate_on_reconnect = enabled;
        self
    }

    /// Retry policy derived from these defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: self.retry_delay,
        }
    }

    /// Revalidation policy used by families that register without one.
    pub fn default_policy(&self) -> RevalidationPolicy {
        RevalidationPolicy {
            freshness: self.freshness,
            refresh_interval: None,
            revalidate_on_focus: self.revalidate_on_focus,
            revalidate_on_reconnect: self.revalidate_on_reconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_focus_and_reconnect() {
        let config = SyncConfig::default();
        assert!(!config.revalidate_on_focus);
        assert!(!config.revalidate_on_reconnect);
        assert_eq!(config.max_retries, 1);

        let policy = config.default_policy();
        assert!(!policy.revalidate_on_focus);
        assert!(policy.refresh_interval.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = SyncConfig::default()
            .freshness(Duration::from_secs(5))
            .retry_delay(Duration::from_secs(10))
            .revalidate_on_focus(true);

        assert_eq!(config.default_policy().freshness, Duration::from_secs(5));
        assert_eq!(config.retry_policy().delay, Duration::from_secs(10));
        assert!(config.default_policy().revalidate_on_focus);
    }
}
