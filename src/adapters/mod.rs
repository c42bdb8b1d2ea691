//! Translation adapters between the API's wire shapes and canonical models.
//!
//! Every function here is pure: no caching, no I/O. Fetchers and
//! repositories call them after decoding a response and before encoding a
//! request body.

pub mod agent_usage;
pub mod alert_rule;
pub mod holding;
pub mod stock_preview;
pub mod triggered_alert;
pub mod watchlist;

pub use agent_usage::{AgentUsage, Plan};
pub use alert_rule::{AlertCondition, AlertFrequency, AlertRule, NotificationChannel};
pub use holding::Holding;
pub use stock_preview::StockPreview;
pub use triggered_alert::TriggeredAlert;
pub use watchlist::WatchlistItem;
