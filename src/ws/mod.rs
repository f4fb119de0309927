//! WebSocket layer: connection, routing, reassembly, delivery.
//!
//! One physical connection carries many logical subscriptions:
//!
//! ```text
//! socket ─► router ─► registry decoder ─► worker[hash(topic) % n]
//!                                             │
//!                                  snapshot?  ├─► reassembler ─► converter
//!                                             └─────────────────► converter ─► category queue
//! ```
//!
//! This module defines the shared message/event types.

pub mod client;
pub mod config;
pub mod connection;
pub mod convert;
pub mod fanout;
pub mod heartbeat;
pub mod protocol;
pub mod reassembly;
pub mod router;
pub mod subscriptions;

use crate::domain::account::wire::{PartialUpdate, WsBalance, WsOrder, WsPosition};
use crate::domain::market::wire::{WsCandle, WsDepth, WsTicker, WsTrade};
use crate::error::SdkError;
use crate::shared::Topic;
use serde::Serialize;

pub use client::StreamClient;
pub use config::WsConfig;
pub use connection::ConnectionState;
pub use convert::{Converter, StandardConverter};
pub use fanout::{EventQueue, StreamStats};
pub use protocol::{Inbound, InboundFrame, JsonProtocol, Protocol};
pub use subscriptions::{decoders, Decoder, SubscriptionSpec};

// ─── Outbound messages ───────────────────────────────────────────────────────

/// Messages sent from client to server.
///
/// Serializes as `{"op": "<name>", "args": [...]}`; `Ping` carries no args.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "lowercase")]
pub enum MessageOut {
    Subscribe(Vec<Topic>),
    Unsubscribe(Vec<Topic>),
    /// `[api_key, timestamp, signature]`
    Login(String, String, String),
    Ping,
}

impl MessageOut {
    pub fn subscribe(topic: Topic) -> Self {
        Self::Subscribe(vec![topic])
    }

    pub fn unsubscribe(topic: Topic) -> Self {
        Self::Unsubscribe(vec![topic])
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Login(..) => "login",
            Self::Ping => "ping",
        }
    }
}

// ─── Native events ───────────────────────────────────────────────────────────

/// A decoded payload, still in the venue's wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    Ticker(WsTicker),
    Depth(WsDepth),
    Trade(WsTrade),
    Candle(WsCandle),
    Order(WsOrder),
    Balance(WsBalance),
    Position(WsPosition),
    /// One page of a paginated account snapshot.
    Snapshot(PartialUpdate),
}

impl NativeEvent {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }
}

// ─── System categories ───────────────────────────────────────────────────────

/// Kind of a non-data notice from the venue or the client itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessageKind {
    Subscribed,
    Unsubscribed,
    LoggedIn,
    Notice,
}

/// A non-data notice: acks and other informational control frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub kind: SystemMessageKind,
    pub topic: Option<Topic>,
    pub text: String,
}

/// A recovered error, reported out of band.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemError {
    pub topic: Option<Topic>,
    pub error: SdkError,
}

impl SystemError {
    pub fn new(topic: Option<Topic>, error: impl Into<SdkError>) -> Self {
        Self {
            topic,
            error: error.into(),
        }
    }
}
