//! Domain modules organized as vertical slices.
//!
//! Each sub-module contains:
//! - `mod.rs`: Domain types handed to the caller
//! - `wire.rs`: Raw serde structs matching the venue's payloads
//! - `convert.rs`: `From`/`TryFrom` conversions from wire to domain

pub mod account;
pub mod market;

use std::collections::BTreeMap;

/// Venue-specific fields with no place in the typed model.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Output category of a delivered event. One bounded queue exists per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Ticker,
    Depth,
    Trade,
    Candle,
    Order,
    Balance,
    Position,
    Account,
    SystemMessage,
    SystemError,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Ticker,
        Category::Depth,
        Category::Trade,
        Category::Candle,
        Category::Order,
        Category::Balance,
        Category::Position,
        Category::Account,
        Category::SystemMessage,
        Category::SystemError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Depth => "depth",
            Self::Trade => "trade",
            Self::Candle => "candle",
            Self::Order => "order",
            Self::Balance => "balance",
            Self::Position => "position",
            Self::Account => "account",
            Self::SystemMessage => "system_message",
            Self::SystemError => "system_error",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully converted event, ready for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Ticker(market::Ticker),
    Depth(market::Depth),
    Trade(market::Trade),
    Candle(market::Candle),
    Order(account::Order),
    Balance(account::Balance),
    Position(account::Position),
    Account(account::AccountUpdate),
}

impl DomainEvent {
    pub fn category(&self) -> Category {
        match self {
            Self::Ticker(_) => Category::Ticker,
            Self::Depth(_) => Category::Depth,
            Self::Trade(_) => Category::Trade,
            Self::Candle(_) => Category::Candle,
            Self::Order(_) => Category::Order,
            Self::Balance(_) => Category::Balance,
            Self::Position(_) => Category::Position,
            Self::Account(_) => Category::Account,
        }
    }
}
