//! Inbound frame classification.
//!
//! A [`Protocol`] turns raw socket text into either a control frame handled
//! inline by the router or a data frame carrying a routing key and an opaque
//! payload for the registry's decoder.

use std::collections::HashMap;

use serde_json::value::RawValue;

use crate::error::DecodeError;
use crate::shared::Topic;
use crate::ws::SystemMessageKind;

/// A data frame: routing key plus the still-encoded payload.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub topic: Topic,
    payload: Box<RawValue>,
}

impl InboundFrame {
    pub fn new(topic: Topic, payload: Box<RawValue>) -> Self {
        Self { topic, payload }
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.get().as_bytes()
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Application-level heartbeat reply.
    Pong,
    LoginAck {
        success: bool,
        message: Option<String>,
    },
    /// Subscription ack or informational notice.
    Ack {
        kind: SystemMessageKind,
        topic: Option<Topic>,
        text: String,
    },
    ServerError {
        code: Option<String>,
        message: String,
        topic: Option<Topic>,
    },
    Data(InboundFrame),
}

/// Venue framing seam.
pub trait Protocol: Send + Sync + 'static {
    fn classify(&self, text: &str) -> Result<Inbound, DecodeError>;
}

// ─── JsonProtocol ────────────────────────────────────────────────────────────

/// JSON envelope protocol.
///
/// Data frames: `{"<topic_field>": "...", "<data_field>": {...}}`. When the
/// data field is absent the whole frame is the payload.
///
/// Control frames carry an `event` field: `pong`, `login`, `subscribe`,
/// `unsubscribe`, `error`; any other event is passed on as a notice.
#[derive(Debug, Clone)]
pub struct JsonProtocol {
    pub topic_field: String,
    pub data_field: String,
    pub event_field: String,
}

impl Default for JsonProtocol {
    fn default() -> Self {
        Self {
            topic_field: "topic".to_string(),
            data_field: "data".to_string(),
            event_field: "event".to_string(),
        }
    }
}

impl JsonProtocol {
    pub fn with_topic_field(mut self, field: impl Into<String>) -> Self {
        self.topic_field = field.into();
        self
    }

    pub fn with_data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = field.into();
        self
    }
}

type Fields = HashMap<String, Box<RawValue>>;

fn string_field(fields: &Fields, name: &str) -> Option<String> {
    let raw = fields.get(name)?;
    match serde_json::from_str::<serde_json::Value>(raw.get()).ok()? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn bool_field(fields: &Fields, name: &str) -> Option<bool> {
    fields
        .get(name)
        .and_then(|raw| serde_json::from_str::<bool>(raw.get()).ok())
}

impl Protocol for JsonProtocol {
    fn classify(&self, text: &str) -> Result<Inbound, DecodeError> {
        if text.trim() == "pong" {
            return Ok(Inbound::Pong);
        }

        let mut fields: Fields = serde_json::from_str(text)?;
        let topic = string_field(&fields, &self.topic_field).map(Topic::from);

        if let Some(event) = string_field(&fields, &self.event_field) {
            let message = string_field(&fields, "message").or_else(|| string_field(&fields, "msg"));
            let inbound = match event.as_str() {
                "pong" => Inbound::Pong,
                "login" => Inbound::LoginAck {
                    success: bool_field(&fields, "success").unwrap_or(false),
                    message,
                },
                "subscribe" | "subscribed" => Inbound::Ack {
                    kind: SystemMessageKind::Subscribed,
                    topic,
                    text: message.unwrap_or(event),
                },
                "unsubscribe" | "unsubscribed" => Inbound::Ack {
                    kind: SystemMessageKind::Unsubscribed,
                    topic,
                    text: message.unwrap_or(event),
                },
                "error" => Inbound::ServerError {
                    code: string_field(&fields, "code"),
                    message: message.unwrap_or_default(),
                    topic,
                },
                _ => Inbound::Ack {
                    kind: SystemMessageKind::Notice,
                    topic,
                    text: message.unwrap_or(event),
                },
            };
            return Ok(inbound);
        }

        let topic = topic.ok_or(DecodeError::MissingTopic)?;
        let payload = match fields.remove(&self.data_field) {
            Some(data) => data,
            None => RawValue::from_string(text.to_string())?,
        };
        Ok(Inbound::Data(InboundFrame::new(topic, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Result<Inbound, DecodeError> {
        JsonProtocol::default().classify(text)
    }

    #[test]
    fn test_data_frame() {
        let inbound = classify(r#"{"topic":"tickers.BTC-USDT","data":{"last":"1"}}"#).unwrap();
        match inbound {
            Inbound::Data(frame) => {
                assert_eq!(frame.topic.as_str(), "tickers.BTC-USDT");
                assert_eq!(frame.payload(), br#"{"last":"1"}"#);
            }
            other => panic!("Expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_data_frame_without_data_field_uses_whole_frame() {
        let text = r#"{"topic":"t","last":"1"}"#;
        match classify(text).unwrap() {
            Inbound::Data(frame) => assert_eq!(frame.payload(), text.as_bytes()),
            other => panic!("Expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_topic_field() {
        let protocol = JsonProtocol::default().with_topic_field("channel");
        let inbound = protocol.classify(r#"{"channel":"c","data":[]}"#).unwrap();
        assert!(matches!(inbound, Inbound::Data(f) if f.topic.as_str() == "c"));
    }

    #[test]
    fn test_pong_variants() {
        assert!(matches!(classify(r#"{"event":"pong"}"#).unwrap(), Inbound::Pong));
        assert!(matches!(classify("pong").unwrap(), Inbound::Pong));
    }

    #[test]
    fn test_login_ack() {
        match classify(r#"{"event":"login","success":false,"message":"bad sign"}"#).unwrap() {
            Inbound::LoginAck { success, message } => {
                assert!(!success);
                assert_eq!(message.as_deref(), Some("bad sign"));
            }
            other => panic!("Expected login ack, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_ack_and_error() {
        match classify(r#"{"event":"subscribe","topic":"trades.BTC-USDT"}"#).unwrap() {
            Inbound::Ack { kind, topic, .. } => {
                assert_eq!(kind, SystemMessageKind::Subscribed);
                assert_eq!(topic.unwrap().as_str(), "trades.BTC-USDT");
            }
            other => panic!("Expected ack, got {:?}", other),
        }
        match classify(r#"{"event":"error","code":60012,"message":"Invalid request"}"#).unwrap() {
            Inbound::ServerError { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("60012"));
                assert_eq!(message, "Invalid request");
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_and_missing_topic() {
        assert!(matches!(classify("{not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(classify(r#"{"data":{}}"#), Err(DecodeError::MissingTopic)));
    }
}
