//! Shared newtypes and utilities used across all modules.
//!
//! These types are serialization-transparent: they serialize/deserialize identically
//! to the raw strings the venue sends, so they can be used directly in wire types.

pub mod serde_util;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// ─── Topic ───────────────────────────────────────────────────────────────────

/// Routing key of one logical subscription (e.g. `"tickers.BTC-USDT"`).
///
/// Unique within a connection; the registry, the reassembler and the drop
/// counters are all keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl FromStr for Topic {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Topic(s.to_string()))
    }
}

impl Serialize for Topic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Topic(s))
    }
}

// ─── TopicFormat ─────────────────────────────────────────────────────────────

/// Builds topic names of the shape `<feed>[<param>]<sep><symbol>[,<symbol>...]`.
///
/// Venues disagree on separators and case, so the grammar is data rather than
/// code. The default yields `tickers.BTC-USDT` and `candle1m.BTC-USDT,ETH-USDT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFormat {
    pub feed_separator: String,
    pub symbol_separator: String,
    pub uppercase: bool,
}

impl Default for TopicFormat {
    fn default() -> Self {
        Self {
            feed_separator: ".".to_string(),
            symbol_separator: ",".to_string(),
            uppercase: true,
        }
    }
}

impl TopicFormat {
    /// Topic for a feed on one or more symbols.
    ///
    /// An empty symbol list yields the bare feed name (account-level feeds).
    pub fn topic<S: AsRef<str>>(&self, feed: &str, param: Option<&str>, symbols: &[S]) -> Topic {
        let mut name = String::from(feed);
        if let Some(p) = param {
            name.push_str(p);
        }
        if symbols.is_empty() {
            return Topic(name);
        }

        let joined = symbols
            .iter()
            .map(|s| {
                if self.uppercase {
                    s.as_ref().to_uppercase()
                } else {
                    s.as_ref().to_lowercase()
                }
            })
            .collect::<Vec<_>>()
            .join(&self.symbol_separator);

        name.push_str(&self.feed_separator);
        name.push_str(&joined);
        Topic(name)
    }
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// Order or trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "bid", alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(alias = "ask", alias = "SELL", alias = "Sell")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_serde() {
        let topic = Topic::from("tickers.BTC-USDT");
        let json = serde_json::to_string(&topic).unwrap();
        assert_eq!(json, "\"tickers.BTC-USDT\"");
        let back: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(topic, back);
    }

    #[test]
    fn test_topic_format_default() {
        let fmt = TopicFormat::default();
        assert_eq!(fmt.topic("tickers", None, &["btc-usdt"]).as_str(), "tickers.BTC-USDT");
        assert_eq!(
            fmt.topic("candle", Some("1m"), &["BTC-USDT", "eth-usdt"]).as_str(),
            "candle1m.BTC-USDT,ETH-USDT"
        );
    }

    #[test]
    fn test_topic_format_bare_feed() {
        let fmt = TopicFormat::default();
        let none: [&str; 0] = [];
        assert_eq!(fmt.topic("balances", None, &none).as_str(), "balances");
    }

    #[test]
    fn test_topic_format_custom() {
        let fmt = TopicFormat {
            feed_separator: ":".to_string(),
            symbol_separator: "|".to_string(),
            uppercase: false,
        };
        assert_eq!(fmt.topic("trade", None, &["BTCUSDT", "ETHUSDT"]).as_str(), "trade:btcusdt|ethusdt");
    }

    #[test]
    fn test_side_serde() {
        let buy: Side = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(buy, Side::Buy);
        let sell: Side = serde_json::from_str("\"ask\"").unwrap();
        assert_eq!(sell, Side::Sell);
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
    }
}
