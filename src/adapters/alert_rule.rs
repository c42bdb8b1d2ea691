//! Alert rule models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a rule may fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AlertFrequency {
    #[serde(rename = "Real-time")]
    RealTime,
    #[default]
    Daily,
    Weekly,
}

impl AlertFrequency {
    /// Label shown in the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            Self::RealTime => "Real-time",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
        }
    }
}

/// What the rule watches for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlertCondition {
    PriceAbove,
    PriceBelow,
    PercentChange,
    VolumeSpike,
    NewFiling,
    /// Rule type this client doesn't know about yet.
    Unsupported,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationChannel {
    Email,
    Push,
    InApp,
}

/// Alert rule as the dashboard sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: String,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: Option<f64>,
    pub frequency: AlertFrequency,
    pub enabled: bool,
    pub channels: Vec<NotificationChannel>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFrequency {
    Instant,
    #[default]
    Daily,
    Weekly,
    /// Cadence this client doesn't know; treated as daily.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRuleType {
    PriceAbove,
    PriceBelow,
    PctChange,
    VolumeSpike,
    SecFiling,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChannel {
    Email,
    Push,
    InApp,
    /// Delivery channel this client can't route; dropped on the way in.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteAlertRule {
    #[serde(default)]
    pub id: String,
    pub ticker: String,
    pub rule_type: RemoteRuleType,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub frequency: RemoteFrequency,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_channels")]
    pub channels: Vec<RemoteChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

fn default_channels() -> Vec<RemoteChannel> {
    vec![RemoteChannel::InApp]
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

impl From<RemoteFrequency> for AlertFrequency {
    fn from(frequency: RemoteFrequency) -> Self {
        match frequency {
            RemoteFrequency::Instant => Self::RealTime,
            RemoteFrequency::Daily | RemoteFrequency::Unrecognized => Self::Daily,
            RemoteFrequency::Weekly => Self::Weekly,
        }
    }
}

impl From<AlertFrequency> for RemoteFrequency {
    fn from(frequency: AlertFrequency) -> Self {
        match frequency {
            AlertFrequency::RealTime => Self::Instant,
            AlertFrequency::Daily => Self::Daily,
            AlertFrequency::Weekly => Self::Weekly,
        }
    }
}

impl From<RemoteRuleType> for AlertCondition {
    fn from(rule_type: RemoteRuleType) -> Self {
        match rule_type {
            RemoteRuleType::PriceAbove => Self::PriceAbove,
            RemoteRuleType::PriceBelow => Self::PriceBelow,
            RemoteRuleType::PctChange => Self::PercentChange,
            RemoteRuleType::VolumeSpike => Self::VolumeSpike,
            RemoteRuleType::SecFiling => Self::NewFiling,
            RemoteRuleType::Unknown => Self::Unsupported,
        }
    }
}

impl From<AlertCondition> for RemoteRuleType {
    fn from(condition: AlertCondition) -> Self {
        match condition {
            AlertCondition::PriceAbove => Self::PriceAbove,
            AlertCondition::PriceBelow => Self::PriceBelow,
            AlertCondition::PercentChange => Self::PctChange,
            AlertCondition::VolumeSpike => Self::VolumeSpike,
            AlertCondition::NewFiling => Self::SecFiling,
            AlertCondition::Unsupported => Self::Unknown,
        }
    }
}

fn channel_to_canonical(channel: RemoteChannel) -> Option<NotificationChannel> {
    match channel {
        RemoteChannel::Email => Some(NotificationChannel::Email),
        RemoteChannel::Push => Some(NotificationChannel::Push),
        RemoteChannel::InApp => Some(NotificationChannel::InApp),
        RemoteChannel::Unknown => None,
    }
}

fn channels_to_canonical(channels: Vec<RemoteChannel>) -> Vec<NotificationChannel> {
    let known: Vec<_> = channels.into_iter().filter_map(channel_to_canonical).collect();
    if known.is_empty() {
        vec![NotificationChannel::InApp]
    } else {
        known
    }
}

impl From<NotificationChannel> for RemoteChannel {
    fn from(channel: NotificationChannel) -> Self {
        match channel {
            NotificationChannel::Email => Self::Email,
            NotificationChannel::Push => Self::Push,
            NotificationChannel::InApp => Self::InApp,
        }
    }
}

pub fn to_canonical(remote: RemoteAlertRule) -> AlertRule {
    AlertRule {
        id: remote.id,
        symbol: remote.ticker.to_uppercase(),
        condition: remote.rule_type.into(),
        threshold: remote.threshold,
        frequency: remote.frequency.into(),
        enabled: remote.is_active,
        channels: channels_to_canonical(remote.channels),
        note: remote.note,
        created_at: remote.created_at,
    }
}

pub fn to_remote(rule: &AlertRule) -> RemoteAlertRule {
    RemoteAlertRule {
        id: rule.id.clone(),
        ticker: rule.symbol.clone(),
        rule_type: rule.condition.into(),
        threshold: rule.threshold,
        frequency: rule.frequency.into(),
        is_active: rule.enabled,
        channels: rule.channels.iter().copied().map(Into::into).collect(),
        note: rule.note.clone(),
        created_at: rule.created_at,
    }
}
