//! Wire types for public market-data feeds.
//!
//! Every struct captures unknown fields in `extra` so venue-specific data
//! survives decoding and reaches the domain type untouched.

use crate::domain::Extra;
use crate::shared::serde_util::timestamp_ms;
use crate::shared::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// WS ticker update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsTicker {
    #[serde(alias = "instId", alias = "s")]
    pub symbol: String,
    #[serde(alias = "lastPrice")]
    pub last: Decimal,
    #[serde(default, alias = "bidPx")]
    pub best_bid: Option<Decimal>,
    #[serde(default, alias = "askPx")]
    pub best_ask: Option<Decimal>,
    #[serde(default, alias = "vol24h")]
    pub volume_24h: Option<Decimal>,
    #[serde(with = "timestamp_ms", alias = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One `[price, size]` level of a depth update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsLevel(pub Decimal, pub Decimal);

/// WS order book depth update (snapshot or delta, as the venue decides).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsDepth {
    #[serde(alias = "instId", alias = "s")]
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<WsLevel>,
    #[serde(default)]
    pub asks: Vec<WsLevel>,
    #[serde(default, alias = "seqId")]
    pub seq: Option<u64>,
    #[serde(with = "timestamp_ms", alias = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// WS public trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsTrade {
    #[serde(alias = "instId", alias = "s")]
    pub symbol: String,
    #[serde(alias = "tradeId")]
    pub trade_id: String,
    #[serde(alias = "px")]
    pub price: Decimal,
    #[serde(alias = "sz")]
    pub size: Decimal,
    pub side: Side,
    #[serde(with = "timestamp_ms", alias = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// WS candle (kline) update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsCandle {
    #[serde(alias = "instId", alias = "s")]
    pub symbol: String,
    #[serde(alias = "bar")]
    pub interval: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(with = "timestamp_ms", alias = "ts")]
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ticker_keeps_unknown_fields() {
        let json = r#"{
            "symbol": "BTC-USDT",
            "last": "64000.5",
            "best_bid": "64000.0",
            "timestamp": 1700000000000,
            "markPrice": "64001.2"
        }"#;
        let t: WsTicker = serde_json::from_str(json).unwrap();
        assert_eq!(t.symbol, "BTC-USDT");
        assert_eq!(t.last, Decimal::from_str("64000.5").unwrap());
        assert_eq!(t.best_ask, None);
        assert_eq!(t.extra.get("markPrice").and_then(|v| v.as_str()), Some("64001.2"));
    }

    #[test]
    fn test_depth_levels_as_pairs() {
        let json = r#"{
            "instId": "ETH-USDT",
            "bids": [["3000.1", "2"], ["3000.0", "1.5"]],
            "asks": [["3000.2", "0.7"]],
            "ts": "1700000000000"
        }"#;
        let d: WsDepth = serde_json::from_str(json).unwrap();
        assert_eq!(d.symbol, "ETH-USDT");
        assert_eq!(d.bids.len(), 2);
        assert_eq!(d.asks[0].1, Decimal::from_str("0.7").unwrap());
        assert!(d.extra.is_empty());
    }

    #[test]
    fn test_trade_missing_price_fails() {
        let json = r#"{"symbol":"BTC-USDT","trade_id":"1","size":"1","side":"buy","timestamp":1}"#;
        assert!(serde_json::from_str::<WsTrade>(json).is_err());
    }
}
