//! Configuration module for the sync client.
//!
//! Loads configuration from environment variables.

mod sync;

pub use sync::SyncConfig;

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the dashboard API.
    pub api_base_url: Url,

    /// Static bearer token. Optional - requests go out unauthenticated without it.
    pub api_token: Option<String>,

    /// Polling interval for triggered alerts. `None` disables polling.
    pub alerts_poll_interval: Option<Duration>,

    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns error if `API_BASE_URL` is missing or any value fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw_url = env::var("API_BASE_URL").context("API_BASE_URL must be set")?;
        let api_base_url = Url::parse(&raw_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {raw_url}"))?;

        let api_token = env::var("API_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            freshness: env_secs("SYNC_FRESHNESS_SECS")?.unwrap_or(defaults.freshness),
            retry_delay: env_secs("SYNC_RETRY_DELAY_SECS")?.unwrap_or(defaults.retry_delay),
            revalidate_on_focus: env_flag("SYNC_REVALIDATE_ON_FOCUS")
                .unwrap_or(defaults.revalidate_on_focus),
            revalidate_on_reconnect: env_flag("SYNC_REVALIDATE_ON_RECONNECT")
                .unwrap_or(defaults.revalidate_on_reconnect),
            ..defaults
        };

        Ok(Self {
            api_base_url,
            api_token,
            alerts_poll_interval: env_secs("SYNC_POLL_SECS")?,
            sync,
        })
    }
}

/// Read a whole number of seconds. Unset or empty yields `None`.
fn env_secs(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            let secs = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{name} must be a number of seconds, got {value:?}"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        _ => Ok(None),
    }
}

/// Read a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`).
fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
