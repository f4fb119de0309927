//! Inbound read loop.
//!
//! One router per connection. It classifies each frame, answers control
//! frames inline, decodes data frames with the topic's bound decoder and
//! hands the result to the conversion workers. A bad frame is counted,
//! reported and dropped; only the socket ending stops the loop.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{ConnectionError, DecodeError, SdkError};
use crate::shared::Topic;
use crate::ws::connection::{extract_close, Connection, ConnectionState, WsSource};
use crate::ws::fanout::{Dispatcher, Job, OutputQueues};
use crate::ws::protocol::{Inbound, Protocol};
use crate::ws::subscriptions::Registry;
use crate::ws::{SystemError, SystemMessage, SystemMessageKind};

/// The venue's answer to a login frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoginOutcome {
    pub success: bool,
    pub message: Option<String>,
}

/// Slot for the one login awaiting acknowledgement.
#[derive(Clone, Default)]
pub(crate) struct PendingLogin(Arc<Mutex<Option<oneshot::Sender<LoginOutcome>>>>);

impl PendingLogin {
    /// Register a waiter. Returns `None` if one is already registered.
    pub fn register(&self) -> Option<oneshot::Receiver<LoginOutcome>> {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Some(rx)
    }

    /// Complete the waiter, if any. Returns `false` when nobody was waiting.
    pub fn complete(&self, outcome: LoginOutcome) -> bool {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Drop the waiter; its receiver sees the sender closed.
    pub fn cancel(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub(crate) struct Router<P> {
    pub protocol: Arc<P>,
    pub conn: Arc<Connection>,
    pub registry: Arc<Registry>,
    pub dispatcher: Dispatcher,
    pub outputs: Arc<OutputQueues>,
    pub pending_login: PendingLogin,
}

impl<P: Protocol> Router<P> {
    pub async fn run(self, mut source: WsSource, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Router shutting down");
                        break;
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => self.handle_text(text).await,
                        Err(e) => self.decode_failed(None, DecodeError::Malformed(e.to_string())),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.conn.send_message(Message::Pong(data)).await {
                            tracing::debug!("Pong not sent: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        self.connection_lost(Some(code), reason, &shutdown).await;
                        break;
                    }
                    Some(Ok(_)) => {} // WS-level pong, raw frame
                    Some(Err(e)) => {
                        self.connection_lost(None, e.to_string(), &shutdown).await;
                        break;
                    }
                    None => {
                        self.connection_lost(None, "Stream ended".to_string(), &shutdown).await;
                        break;
                    }
                },
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let inbound = match self.protocol.classify(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.decode_failed(None, e);
                return;
            }
        };

        match inbound {
            Inbound::Pong => tracing::trace!("Pong received"),
            Inbound::LoginAck { success, message } => {
                let outcome = LoginOutcome {
                    success,
                    message: message.clone(),
                };
                if !self.pending_login.complete(outcome) {
                    tracing::debug!("Unsolicited login ack (success={})", success);
                    self.outputs.system_message(SystemMessage {
                        kind: SystemMessageKind::LoggedIn,
                        topic: None,
                        text: message.unwrap_or_else(|| format!("login success={}", success)),
                    });
                }
            }
            Inbound::Ack { kind, topic, text } => {
                tracing::debug!("{:?} ack: {}", kind, text);
                self.outputs.system_message(SystemMessage { kind, topic, text });
            }
            Inbound::ServerError {
                code,
                message,
                topic,
            } => {
                // A topic-less error while a login is pending answers the login.
                if topic.is_none() && self.pending_login.is_waiting() {
                    self.pending_login.complete(LoginOutcome {
                        success: false,
                        message: Some(message),
                    });
                    return;
                }
                tracing::warn!("Venue error {:?}: {}", code, message);
                self.outputs
                    .system_error(SystemError::new(topic, SdkError::Venue { code, message }));
            }
            Inbound::Data(frame) => {
                let Some((decoder, paginated)) = self.registry.lookup(&frame.topic).await else {
                    let topic = frame.topic;
                    self.decode_failed(Some(topic.clone()), DecodeError::UnboundTopic(topic));
                    return;
                };
                match decoder(frame.payload()) {
                    Ok(event) => {
                        let dispatched = self.dispatcher.dispatch(Job::Event {
                            topic: frame.topic,
                            event,
                            paginated,
                        });
                        if !dispatched {
                            tracing::debug!("Conversion workers gone, frame dropped");
                        }
                    }
                    Err(e) => {
                        let topic = frame.topic;
                        let error = match e {
                            DecodeError::Malformed(message) => DecodeError::Payload {
                                topic: topic.clone(),
                                message,
                            },
                            other => other,
                        };
                        self.decode_failed(Some(topic), error);
                    }
                }
            }
        }
    }

    fn decode_failed(&self, topic: Option<Topic>, error: DecodeError) {
        tracing::warn!("Dropped frame: {}", error);
        self.outputs.counters.decode_error();
        self.outputs.system_error(SystemError::new(topic, error));
    }

    /// The socket ended. Silent during shutdown; otherwise reported and the
    /// connection is marked closed.
    async fn connection_lost(&self, code: Option<u16>, reason: String, shutdown: &watch::Receiver<bool>) {
        let state = self.conn.state();
        if *shutdown.borrow() || matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
            tracing::debug!("Socket ended during shutdown: {}", reason);
            return;
        }

        tracing::error!("Connection lost: code={:?} reason={}", code, reason);
        self.conn.set_state(ConnectionState::Closed);
        self.conn.drop_sink().await;
        self.pending_login.cancel();
        self.outputs.system_error(SystemError::new(
            None,
            ConnectionError::Closed { code, reason },
        ));
    }
}
