//! Conversions: WS wire types → account domain types.

use super::wire::{Entities, MergedUpdate, WsBalance, WsOrder, WsPosition};
use super::{AccountUpdate, Balance, Order, OrderStatus, Position};

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "open" | "new" | "live" => Self::Open,
            "partially_filled" | "partial" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "cancelled" | "canceled" => Self::Cancelled,
            "rejected" => Self::Rejected,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl From<WsOrder> for Order {
    fn from(o: WsOrder) -> Self {
        let remaining = (o.size - o.filled).max(rust_decimal::Decimal::ZERO);
        Order {
            status: OrderStatus::from(o.status.as_str()),
            order_id: o.order_id,
            client_order_id: o.client_order_id,
            symbol: o.symbol,
            side: o.side,
            price: o.price,
            size: o.size,
            filled_size: o.filled,
            remaining_size: remaining,
            timestamp: o.timestamp,
            extra: o.extra,
        }
    }
}

impl From<WsBalance> for Balance {
    fn from(b: WsBalance) -> Self {
        Balance {
            asset: b.asset,
            total: b.total,
            available: b.available,
            locked: b.locked,
            extra: b.extra,
        }
    }
}

impl From<WsPosition> for Position {
    fn from(p: WsPosition) -> Self {
        Position {
            symbol: p.symbol,
            side: p.side,
            size: p.size,
            entry_price: p.entry_price,
            unrealized_pnl: p.unrealized_pnl,
            leverage: p.leverage,
            extra: p.extra,
        }
    }
}

impl From<MergedUpdate> for AccountUpdate {
    fn from(merged: MergedUpdate) -> Self {
        let (balances, positions) = match merged.entities {
            Entities::Balances(b) => (b.into_iter().map(Balance::from).collect(), Vec::new()),
            Entities::Positions(p) => (Vec::new(), p.into_iter().map(Position::from).collect()),
        };
        AccountUpdate {
            topic: merged.topic,
            balances,
            positions,
            total_equity: merged.summary.total_equity,
            available_margin: merged.summary.available_margin,
            update_time: merged.summary.update_time,
            page_count: merged.page_count,
            extra: merged.summary.extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::wire::SnapshotSummary;
    use crate::domain::Extra;
    use crate::shared::{Side, Topic};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_ws_order(status: &str) -> WsOrder {
        WsOrder {
            order_id: "o-1".to_string(),
            client_order_id: None,
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            price: Some(Decimal::new(64000, 0)),
            size: Decimal::new(3, 0),
            filled: Decimal::new(1, 0),
            status: status.to_string(),
            timestamp: Utc::now(),
            extra: Extra::new(),
        }
    }

    #[test]
    fn test_order_conversion() {
        let order: Order = sample_ws_order("partially_filled").into();
        assert_eq!(order.remaining_size, Decimal::TWO);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert!(!order.status.is_terminal());
    }

    #[test]
    fn test_order_status_unknown_kept() {
        let order: Order = sample_ws_order("mmp_canceled").into();
        assert_eq!(order.status, OrderStatus::Other("mmp_canceled".to_string()));
        let order: Order = sample_ws_order("Canceled").into();
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_merged_positions_to_account_update() {
        let merged = MergedUpdate {
            topic: Topic::from("positions"),
            page_count: 2,
            entities: Entities::Positions(vec![WsPosition {
                symbol: "ETH-USDT".to_string(),
                side: Some(Side::Sell),
                size: Decimal::ONE,
                entry_price: None,
                unrealized_pnl: None,
                leverage: None,
                extra: Extra::new(),
            }]),
            summary: SnapshotSummary {
                total_equity: Some(Decimal::new(500, 0)),
                ..Default::default()
            },
        };
        let update: AccountUpdate = merged.into();
        assert!(update.balances.is_empty());
        assert_eq!(update.positions.len(), 1);
        assert_eq!(update.page_count, 2);
        assert_eq!(update.total_equity, Some(Decimal::new(500, 0)));
    }
}
