//! Account domain: orders, balances, positions and full account snapshots.

mod convert;
pub mod wire;

use crate::domain::Extra;
use crate::shared::{Side, Topic};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order, as far as the venue reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// A venue status string with no standard counterpart.
    Other(String),
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// One of the caller's orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub remaining_size: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub extra: Extra,
}

/// Holdings of one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub total: Decimal,
    pub available: Decimal,
    pub locked: Decimal,
    pub extra: Extra,
}

/// An open position in one instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Option<Side>,
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub extra: Extra,
}

/// A complete account snapshot, reassembled from every page of one sequence.
///
/// Only one of `balances`/`positions` is populated, depending on the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountUpdate {
    pub topic: Topic,
    pub balances: Vec<Balance>,
    pub positions: Vec<Position>,
    pub total_equity: Option<Decimal>,
    pub available_margin: Option<Decimal>,
    pub update_time: Option<DateTime<Utc>>,
    pub page_count: u32,
    pub extra: Extra,
}
