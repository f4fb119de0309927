//! # venue-stream
//!
//! Real-time event-streaming client for trading venues: one WebSocket
//! connection, many logical subscriptions, paginated snapshot reassembly and
//! bounded per-category delivery.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: Shared newtypes, domain models, wire types and conversions
//! 2. **Auth**: Credentials and HMAC login signing
//! 3. **WebSocket**: Connection, heartbeat, router, registry, reassembler, fan-out
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use venue_stream::prelude::*;
//!
//! let client = StreamClient::new(WsConfig::new("wss://stream.example.com/ws"))
//!     .with_credentials(Credentials::new(api_key, secret));
//!
//! client.connect().await?;
//! client.subscribe(SubscriptionSpec::ticker("tickers.BTC-USDT")).await?;
//! client.login().await?;
//! client.subscribe(SubscriptionSpec::account_snapshot("balances")).await?;
//!
//! while let Some(ticker) = client.tickers().recv().await {
//!     println!("{} {}", ticker.symbol, ticker.last);
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all domains.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions.
pub mod domain;

/// Unified SDK error types.
pub mod error;

// ── Layer 2: Auth ────────────────────────────────────────────────────────────

/// Credentials and login signing.
pub mod auth;

// ── Layer 3: WebSocket ───────────────────────────────────────────────────────

/// Streaming client: connection, subscriptions, routing, delivery.
pub mod ws;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{Side, Topic, TopicFormat};

    // Domain types
    pub use crate::domain::account::{AccountUpdate, Balance, Order, OrderStatus, Position};
    pub use crate::domain::market::{Candle, Depth, PriceLevel, Ticker, Trade};
    pub use crate::domain::{Category, DomainEvent, Extra};

    // Errors
    pub use crate::error::{
        AuthError, ConnectionError, DecodeError, ReassemblyTimeout, SdkError, SdkResult,
        SubscriptionError,
    };

    // Auth
    pub use crate::auth::{Credentials, LoginScheme, SignatureEncoding, TimestampUnit};

    // WebSocket types
    pub use crate::ws::{
        decoders, ConnectionState, Converter, EventQueue, JsonProtocol, MessageOut, NativeEvent,
        Protocol, StandardConverter, StreamClient, StreamStats, SubscriptionSpec, SystemError,
        SystemMessage, SystemMessageKind, WsConfig,
    };
}
