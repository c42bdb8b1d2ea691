//! Revalidation policy.

use std::time::Duration;

/// What asked for a refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A consumer started watching the key.
    Mount,
    /// The caller asked for fresh data. Skips the freshness check.
    Explicit,
    /// Polling tick.
    Interval,
    /// The dashboard regained focus.
    Focus,
    /// The network came back.
    Reconnect,
}

/// Per-family rules for when cached data is refetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevalidationPolicy {
    /// Data younger than this is never refetched automatically.
    pub freshness: Duration,

    /// Poll while the key is mounted. Should be longer than `freshness`,
    /// otherwise ticks that land inside the window do nothing.
    pub refresh_interval: Option<Duration>,

    pub revalidate_on_focus: bool,
    pub revalidate_on_reconnect: bool,
}

impl Default for RevalidationPolicy {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(60),
            refresh_interval: None,
            revalidate_on_focus: false,
            revalidate_on_reconnect: false,
        }
    }
}

impl RevalidationPolicy {
    /// Set the freshness window.
    #[must_use]
    pub fn freshness(mut self, duration: Duration) -> Self {
        self.freshness = duration;
        self
    }

    /// Poll every `interval` while mounted.
    #[must_use]
    pub fn refresh_every(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }

    #[must_use]
    pub fn on_reconnect(mut self, enabled: bool) -> Self {
        self.revalidate_on_reconnect = enabled;
        self
    }

    /// Policy for rarely changing reference data (company profiles, sectors).
    /// Long window, no polling.
    pub fn reference_data() -> Self {
        Self {
            freshness: Duration::from_secs(3600), // 1 hour
            ..Default::default()
        }
    }

    /// Policy for feeds that should keep moving while visible.
    pub fn live(interval: Duration) -> Self {
        Self {
            freshness: interval / 2,
            refresh_interval: Some(interval),
            ..Default::default()
        }
    }

    /// Whether this trigger is enabled at all.
    pub fn allows(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Mount | Trigger::Explicit => true,
            Trigger::Interval => self.refresh_interval.is_some(),
            Trigger::Focus => self.revalidate_on_focus,
            Trigger::Reconnect => self.revalidate_on_reconnect,
        }
    }
}
