//! Conversions from WS wire types to market domain types.

use super::wire::{WsCandle, WsDepth, WsLevel, WsTicker, WsTrade};
use super::{Candle, Depth, PriceLevel, Ticker, Trade};

impl From<WsTicker> for Ticker {
    fn from(t: WsTicker) -> Self {
        Self {
            symbol: t.symbol,
            last: t.last,
            best_bid: t.best_bid,
            best_ask: t.best_ask,
            volume_24h: t.volume_24h,
            timestamp: t.timestamp,
            extra: t.extra,
        }
    }
}

impl From<WsLevel> for PriceLevel {
    fn from(level: WsLevel) -> Self {
        Self {
            price: level.0,
            size: level.1,
        }
    }
}

impl From<WsDepth> for Depth {
    fn from(d: WsDepth) -> Self {
        Self {
            symbol: d.symbol,
            bids: d.bids.into_iter().map(PriceLevel::from).collect(),
            asks: d.asks.into_iter().map(PriceLevel::from).collect(),
            seq: d.seq,
            timestamp: d.timestamp,
            extra: d.extra,
        }
    }
}

impl From<WsTrade> for Trade {
    fn from(t: WsTrade) -> Self {
        Self {
            symbol: t.symbol,
            trade_id: t.trade_id,
            price: t.price,
            size: t.size,
            side: t.side,
            timestamp: t.timestamp,
            extra: t.extra,
        }
    }
}

impl From<WsCandle> for Candle {
    fn from(c: WsCandle) -> Self {
        Self {
            symbol: c.symbol,
            interval: c.interval,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            start: c.start,
            confirmed: c.confirmed,
            extra: c.extra,
        }
    }
}
