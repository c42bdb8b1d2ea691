//! Stock preview cards (`stock:<SYMBOL>:preview`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockPreview {
    pub symbol: String,
    pub name: String,
    pub exchange: Option<String>,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RemoteQuote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteStockPreview {
    pub ticker: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default)]
    pub quote: RemoteQuote,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}

pub fn to_canonical(remote: RemoteStockPreview) -> StockPreview {
    StockPreview {
        symbol: remote.ticker.to_uppercase(),
        name: remote.company_name,
        exchange: remote.exchange,
        price: remote.quote.last,
        change_percent: remote.quote.change_pct,
        volume: remote.quote.volume,
        market_cap: remote.market_cap,
    }
}

pub fn to_remote(preview: &StockPreview) -> RemoteStockPreview {
    RemoteStockPreview {
        ticker: preview.symbol.clone(),
        company_name: preview.name.clone(),
        exchange: preview.exchange.clone(),
        quote: RemoteQuote {
            last: preview.price,
            change_pct: preview.change_percent,
            volume: preview.volume,
        },
        market_cap: preview.market_cap,
    }
}
