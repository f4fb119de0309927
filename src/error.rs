//! Unified SDK error types.
//!
//! Every payload is a `String` (or a `Topic`) so all errors are `Clone` and can
//! travel on the system-error queue as well as out of public calls.

use std::time::Duration;

use thiserror::Error;

use crate::shared::Topic;

/// Top-level SDK error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyTimeout),

    /// An error frame sent by the venue.
    #[error("Venue error {code:?}: {message}")]
    Venue {
        code: Option<String>,
        message: String,
    },
}

/// Socket-level errors. Fatal to the call, not to the connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Write attempted after close")]
    WriteAfterClose,

    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },
}

/// Authentication errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Login attempted while not connected")]
    NotConnected,

    #[error("No credentials configured")]
    MissingCredentials,

    #[error("Login already in flight")]
    LoginInFlight,

    #[error("Login rejected: {0}")]
    Rejected(String),

    #[error("No login acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Login frame not sent: {0}")]
    Send(ConnectionError),
}

/// Subscription errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("Subscription change attempted while not connected")]
    NotConnected,

    #[error("Topic {0} requires an authenticated connection")]
    AuthRequired(Topic),

    #[error("Not subscribed to topic {0}")]
    UnknownTopic(Topic),

    #[error("Subscription frame not sent: {0}")]
    Send(ConnectionError),
}

/// Malformed inbound data. Always recovered locally; the frame is dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame carries no routing key")]
    MissingTopic,

    #[error("No subscription bound to topic {0}")]
    UnboundTopic(Topic),

    #[error("Bad payload on {topic}: {message}")]
    Payload { topic: Topic, message: String },

    #[error("Snapshot pages on {topic} disagree on entity kind")]
    MixedSnapshot { topic: Topic },

    #[error("Conversion failed on {topic}: {message}")]
    Conversion { topic: Topic, message: String },
}

/// An incomplete snapshot sequence outlived its buffer lifetime and was discarded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Snapshot on {topic} incomplete after {age:?}: {pages_received} page(s) buffered, last page {last_page:?}"
)]
pub struct ReassemblyTimeout {
    pub topic: Topic,
    pub pages_received: usize,
    pub last_page: Option<u32>,
    pub age: Duration,
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed => ConnectionError::Closed {
                code: Some(1000),
                reason: "Connection closed normally".to_string(),
            },
            Error::AlreadyClosed => ConnectionError::WriteAfterClose,
            Error::Url(e) => ConnectionError::InvalidUrl(e.to_string()),
            Error::Http(resp) => {
                ConnectionError::Handshake(format!("HTTP error: {:?}", resp.status()))
            }
            Error::HttpFormat(e) => ConnectionError::Handshake(e.to_string()),
            Error::Io(e) => ConnectionError::SendFailed(e.to_string()),
            other => ConnectionError::SendFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

/// Result alias for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_lift_into_sdk_error() {
        let err: SdkError = SubscriptionError::NotConnected.into();
        assert!(matches!(err, SdkError::Subscription(SubscriptionError::NotConnected)));

        let err: SdkError = AuthError::MissingCredentials.into();
        assert_eq!(err.to_string(), "Auth error: No credentials configured");
    }

    #[test]
    fn test_io_error_on_open_socket_is_send_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err: ConnectionError = tokio_tungstenite::tungstenite::Error::Io(io).into();
        assert!(matches!(err, ConnectionError::SendFailed(_)));
    }

    #[test]
    fn test_serde_error_maps_to_malformed() {
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DecodeError = parse.into();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_reassembly_timeout_message() {
        let err = ReassemblyTimeout {
            topic: Topic::new("balances"),
            pages_received: 2,
            last_page: None,
            age: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("balances"));
        assert!(msg.contains("2 page(s)"));
    }
}
