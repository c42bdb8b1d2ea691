//! Triggered alert notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggeredAlert {
    pub id: String,
    pub rule_id: Option<String>,
    pub symbol: String,
    pub message: String,
    pub price: Option<f64>,
    pub read: bool,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTriggeredAlert {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    pub ticker: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<f64>,
    #[serde(default)]
    pub is_read: bool,
    pub triggered_at: DateTime<Utc>,
}

pub fn to_canonical(remote: RemoteTriggeredAlert) -> TriggeredAlert {
    TriggeredAlert {
        id: remote.id,
        rule_id: remote.alert_id,
        symbol: remote.ticker.to_uppercase(),
        message: remote.message,
        price: remote.trigger_price,
        read: remote.is_read,
        triggered_at: remote.triggered_at,
    }
}

pub fn to_remote(alert: &TriggeredAlert) -> RemoteTriggeredAlert {
    RemoteTriggeredAlert {
        id: alert.id.clone(),
        alert_id: alert.rule_id.clone(),
        ticker: alert.symbol.clone(),
        message: alert.message.clone(),
        trigger_price: alert.price,
        is_read: alert.read,
        triggered_at: alert.triggered_at,
    }
}

/// Unread alerts first, newest first within each group.
pub fn sort_for_inbox(alerts: &mut [TriggeredAlert]) {
    alerts.sort_by(|a, b| a.read.cmp(&b.read).then(b.triggered_at.cmp(&a.triggered_at)));
}
