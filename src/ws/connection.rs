//! Physical socket ownership and the single serialized write path.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ConnectionError;
use crate::ws::MessageOut;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

// ─── ConnectionState ─────────────────────────────────────────────────────────

/// Lifecycle of one connection. Ordered: `Connected < Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Authenticated = 3,
    Closing = 4,
    Closed = 5,
}

impl ConnectionState {
    /// Socket is open and usable for subscriptions.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        *self == Self::Authenticated
    }
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Authenticated,
            4 => Self::Closing,
            5 => Self::Closed,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// Shared by the client, the router and the heartbeat. Every write goes
/// through `sink`'s mutex, so frames never interleave.
pub(crate) struct Connection {
    state: AtomicU8,
    sink: Mutex<Option<WsSink>>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            sink: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            tracing::debug!("Connection state {} -> {}", previous, state);
        }
    }

    /// Move `from → to` only if the state is still `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if swapped {
            tracing::debug!("Connection state {} -> {}", from, to);
        }
        swapped
    }

    /// Dial `url` and install the write half. Returns the read half for the router.
    pub async fn open(&self, url: &str, timeout: Duration) -> Result<WsSource, ConnectionError> {
        let (sink, source) = dial(url, timeout).await?;
        *self.sink.lock().await = Some(sink);
        Ok(source)
    }

    /// Serialize and write one outbound message.
    pub async fn send(&self, msg: &MessageOut) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(msg)
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
        self.send_message(Message::Text(json.into())).await
    }

    pub async fn send_message(&self, message: Message) -> Result<(), ConnectionError> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send(message).await.map_err(ConnectionError::from),
            None => Err(self.no_sink_error()),
        }
    }

    /// Send a normal close frame and drop the write half, bounded by `timeout`.
    ///
    /// Returns `false` if the handshake did not finish in time; the write half
    /// is dropped either way once the lock is obtained.
    pub async fn close_sink(&self, timeout: Duration) -> bool {
        let handshake = async {
            if let Some(mut sink) = self.sink.lock().await.take() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Client disconnect".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!("Close frame not sent: {}", e);
                }
                let _ = sink.close().await;
            }
        };
        match tokio::time::timeout(timeout, handshake).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Close handshake did not finish within {:?}", timeout);
                false
            }
        }
    }

    /// Drop the write half without a close handshake (peer already gone).
    pub async fn drop_sink(&self) {
        self.sink.lock().await.take();
    }

    fn no_sink_error(&self) -> ConnectionError {
        match self.state() {
            ConnectionState::Closing | ConnectionState::Closed => ConnectionError::WriteAfterClose,
            _ => ConnectionError::NotConnected,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Establish a WebSocket connection, bounded by `timeout`.
async fn dial(url: &str, timeout: Duration) -> Result<(WsSink, WsSource), ConnectionError> {
    if url.is_empty() {
        return Err(ConnectionError::InvalidUrl("empty URL".to_string()));
    }
    let (ws_stream, _) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
        .map_err(handshake_error)?;
    Ok(ws_stream.split())
}

/// Map a dial failure. I/O errors here mean the handshake never completed.
fn handshake_error(err: tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::Io(e) => ConnectionError::Handshake(e.to_string()),
        other => ConnectionError::from(other),
    }
}

/// Extract close code and reason from an optional CloseFrame.
pub(crate) fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(ConnectionState::Authenticated > ConnectionState::Connected);
        assert!(ConnectionState::Connected > ConnectionState::Connecting);
        assert!(ConnectionState::Authenticated.is_connected());
        assert!(!ConnectionState::Closing.is_connected());
        assert_eq!(ConnectionState::from(ConnectionState::Closed as u8), ConnectionState::Closed);
    }

    #[test]
    fn test_transition_only_from_expected() {
        let conn = Connection::new();
        assert!(!conn.transition(ConnectionState::Connected, ConnectionState::Authenticated));
        conn.set_state(ConnectionState::Connected);
        assert!(conn.transition(ConnectionState::Connected, ConnectionState::Authenticated));
        assert_eq!(conn.state(), ConnectionState::Authenticated);
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let conn = Connection::new();
        let result = conn.send(&MessageOut::Ping).await;
        assert_eq!(result, Err(ConnectionError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let conn = Connection::new();
        conn.set_state(ConnectionState::Closed);
        let result = conn.send(&MessageOut::Ping).await;
        assert_eq!(result, Err(ConnectionError::WriteAfterClose));
    }

    #[tokio::test]
    async fn test_open_rejects_empty_url() {
        let conn = Connection::new();
        let result = conn.open("", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ConnectionError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_dial_refused_is_handshake_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let conn = Connection::new();
        let result = conn.open(&format!("ws://{}", addr), Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ConnectionError::Handshake(_))));
    }

    #[test]
    fn test_handshake_error_maps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            handshake_error(tungstenite::Error::Io(io)),
            ConnectionError::Handshake(_)
        ));
        assert_eq!(
            handshake_error(tungstenite::Error::AlreadyClosed),
            ConnectionError::WriteAfterClose
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_sink_bounded_by_timeout() {
        let conn = Connection::new();
        // A writer stuck on the lock must not stall the close.
        let _writer = conn.sink.lock().await;
        assert!(!conn.close_sink(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_close_sink_without_socket() {
        let conn = Connection::new();
        assert!(conn.close_sink(Duration::from_secs(1)).await);
    }

    #[test]
    fn test_extract_close_with_frame() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "maintenance".into(),
        };
        let (code, reason) = extract_close(Some(&frame));
        assert_eq!(code, 1001);
        assert_eq!(reason, "maintenance");
    }

    #[test]
    fn test_extract_close_no_frame() {
        let (code, reason) = extract_close(None);
        assert_eq!(code, 1006);
        assert_eq!(reason, "No close frame");
    }
}
