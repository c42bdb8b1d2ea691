//! Watchlist models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistItem {
    pub symbol: String,
    pub name: Option<String>,
    pub notes: String,
    pub tags: Vec<String>,
    pub added_at: Option<DateTime<Utc>>,
}

impl WatchlistItem {
    /// Item for a ticker the user just typed in.
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            name: None,
            notes: String::new(),
            tags: Vec::new(),
            added_at: None,
        }
    }
}

/// Tickers are compared upper-case and without surrounding whitespace.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteWatchlistItem {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// List response: `{"items": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemoteWatchlist {
    #[serde(default)]
    pub items: Vec<RemoteWatchlistItem>,
}

pub fn to_canonical(remote: RemoteWatchlistItem) -> WatchlistItem {
    WatchlistItem {
        symbol: normalize_symbol(&remote.ticker),
        name: remote.company_name,
        notes: remote.notes.unwrap_or_default(),
        tags: remote.tags,
        added_at: remote.added_at,
    }
}

pub fn to_remote(item: &WatchlistItem) -> RemoteWatchlistItem {
    RemoteWatchlistItem {
        ticker: item.symbol.clone(),
        company_name: item.name.clone(),
        notes: (!item.notes.is_empty()).then(|| item.notes.clone()),
        tags: item.tags.clone(),
        added_at: item.added_at,
    }
}

pub fn list_to_canonical(remote: RemoteWatchlist) -> Vec<WatchlistItem> {
    remote.items.into_iter().map(to_canonical).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let item = WatchlistItem {
            symbol: "ABCD".to_string(),
            name: Some("Abcd Mining Corp".to_string()),
            notes: "watch the Q3 filing".to_string(),
            tags: vec!["mining".to_string()],
            added_at: None,
        };
        assert_eq!(to_canonical(to_remote(&item)), item);
        assert_eq!(to_canonical(to_remote(&WatchlistItem::new("xyz"))), WatchlistItem::new("XYZ"));
    }

    #[test]
    fn test_list_defaults() {
        let json = r#"{"items":[{"ticker":" abcd "},{"ticker":"EFG","company_name":"Efg Inc","tags":["bio"]}]}"#;
        let items = list_to_canonical(serde_json::from_str(json).unwrap());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].symbol, "ABCD");
        assert_eq!(items[0].notes, "");
        assert!(items[0].tags.is_empty());
        assert_eq!(items[1].name.as_deref(), Some("Efg Inc"));
    }

    #[test]
    fn test_empty_notes_not_sent() {
        let wire = serde_json::to_value(to_remote(&WatchlistItem::new("ABCD"))).unwrap();
        assert!(wire.get("notes").is_none());
    }
}
