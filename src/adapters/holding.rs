//! Portfolio holdings.
//!
//! The API nests cost basis in its own object; the dashboard works with a
//! flat record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub id: String,
    pub symbol: String,
    pub shares: f64,
    pub avg_cost: f64,
    pub currency: String,
    pub account: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Holding {
    /// Total amount paid for the position.
    pub fn cost_total(&self) -> f64 {
        self.shares * self.avg_cost
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteCostBasis {
    pub average_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteHolding {
    #[serde(default)]
    pub id: String,
    pub ticker: String,
    pub quantity: f64,
    pub cost_basis: RemoteCostBasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".to_string()
}

pub fn to_canonical(remote: RemoteHolding) -> Holding {
    Holding {
        id: remote.id,
        symbol: remote.ticker.trim().to_uppercase(),
        shares: remote.quantity,
        avg_cost: remote.cost_basis.average_price,
        currency: remote.cost_basis.currency,
        account: remote.account,
        opened_at: remote.opened_at,
    }
}

pub fn to_remote(holding: &Holding) -> RemoteHolding {
    RemoteHolding {
        id: holding.id.clone(),
        ticker: holding.symbol.clone(),
        quantity: holding.shares,
        cost_basis: RemoteCostBasis {
            average_price: holding.avg_cost,
            currency: holding.currency.clone(),
        },
        account: holding.account.clone(),
        opened_at: holding.opened_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let holding = Holding {
            id: "h-1".to_string(),
            symbol: "ABCD".to_string(),
            shares: 1500.0,
            avg_cost: 0.84,
            currency: "CAD".to_string(),
            account: Some("TFSA".to_string()),
            opened_at: None,
        };
        assert_eq!(to_canonical(to_remote(&holding)), holding);
    }

    #[test]
    fn test_nested_cost_basis_flattened() {
        let json = r#"{"id":"h","ticker":"abcd","quantity":200,"cost_basis":{"average_price":1.5}}"#;
        let holding = to_canonical(serde_json::from_str(json).unwrap());

        assert_eq!(holding.symbol, "ABCD");
        assert_eq!(holding.currency, "USD");
        assert!((holding.cost_total() - 300.0).abs() < f64::EPSILON);
    }
}
