//! Subscription registry: topic → decoder binding.
//!
//! The router takes a read lock per frame and clones the `Arc` decoder out, so
//! decoding never runs under the lock. Subscribe/unsubscribe take the write
//! lock only long enough to swap the binding.

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::RwLock;

use crate::error::DecodeError;
use crate::shared::Topic;
use crate::ws::NativeEvent;

/// Stateless payload decoder bound to one topic.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<NativeEvent, DecodeError> + Send + Sync>;

// ─── SubscriptionSpec ────────────────────────────────────────────────────────

/// What the caller asks for: a topic and how to decode it.
#[derive(Clone)]
pub struct SubscriptionSpec {
    pub topic: Topic,
    pub decoder: Decoder,
    /// Only allowed on an authenticated connection.
    pub requires_auth: bool,
    /// Snapshot pages on this topic go through reassembly.
    pub paginated: bool,
}

impl SubscriptionSpec {
    pub fn new(topic: impl Into<Topic>, decoder: Decoder) -> Self {
        Self {
            topic: topic.into(),
            decoder,
            requires_auth: false,
            paginated: false,
        }
    }

    pub fn private(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }

    pub fn ticker(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::ticker())
    }

    pub fn depth(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::depth())
    }

    pub fn trades(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::trade())
    }

    pub fn candles(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::candle())
    }

    pub fn orders(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::order()).private()
    }

    pub fn balances(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::balance()).private()
    }

    pub fn positions(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::position()).private()
    }

    /// Paginated account snapshot (balances or positions pages).
    pub fn account_snapshot(topic: impl Into<Topic>) -> Self {
        Self::new(topic, decoders::account_snapshot())
            .private()
            .paginated()
    }
}

impl std::fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("topic", &self.topic)
            .field("requires_auth", &self.requires_auth)
            .field("paginated", &self.paginated)
            .finish_non_exhaustive()
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// A live binding.
#[derive(Clone)]
pub struct Binding {
    pub decoder: Decoder,
    pub paginated: bool,
}

impl From<&SubscriptionSpec> for Binding {
    fn from(spec: &SubscriptionSpec) -> Self {
        Self {
            decoder: Arc::clone(&spec.decoder),
            paginated: spec.paginated,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    bindings: RwLock<HashMap<Topic, Binding>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `spec.topic`, replacing any previous decoder. Returns the replaced binding.
    pub async fn bind(&self, spec: &SubscriptionSpec) -> Option<Binding> {
        let mut bindings = self.bindings.write().await;
        let previous = bindings.insert(spec.topic.clone(), Binding::from(spec));
        if previous.is_some() {
            tracing::debug!("Replaced decoder for topic {}", spec.topic);
        } else {
            tracing::debug!("Tracking subscription: {}", spec.topic);
        }
        previous
    }

    /// Undo a `bind` whose frame could not be sent.
    pub async fn restore(&self, topic: &Topic, previous: Option<Binding>) {
        let mut bindings = self.bindings.write().await;
        match previous {
            Some(binding) => {
                bindings.insert(topic.clone(), binding);
            }
            None => {
                bindings.remove(topic);
            }
        }
    }

    pub async fn remove(&self, topic: &Topic) -> Option<Binding> {
        let removed = self.bindings.write().await.remove(topic);
        if removed.is_some() {
            tracing::debug!("Removed subscription from tracking: {}", topic);
        }
        removed
    }

    /// Decoder and pagination flag bound to `topic`.
    pub async fn lookup(&self, topic: &Topic) -> Option<(Decoder, bool)> {
        let bindings = self.bindings.read().await;
        bindings
            .get(topic)
            .map(|b| (Arc::clone(&b.decoder), b.paginated))
    }

    pub async fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.bindings.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.is_empty()
    }

    /// Drop every binding. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut bindings = self.bindings.write().await;
        let count = bindings.len();
        bindings.clear();
        count
    }
}

// ─── Standard decoders ───────────────────────────────────────────────────────

/// Decoders for the crate's native wire shapes.
///
/// Each accepts either a JSON object or a single-element array holding one,
/// since venues commonly wrap data in a one-item list.
pub mod decoders {
    use std::sync::Arc;

    use serde::de::DeserializeOwned;

    use super::Decoder;
    use crate::domain::account::wire::{PartialUpdate, WsSnapshotPage};
    use crate::error::DecodeError;
    use crate::ws::NativeEvent;

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'[') {
            let mut items: Vec<T> = serde_json::from_slice(bytes)?;
            if items.len() != 1 {
                return Err(DecodeError::Malformed(format!(
                    "Expected one item, got {}",
                    items.len()
                )));
            }
            return items
                .pop()
                .ok_or_else(|| DecodeError::Malformed("Empty data array".to_string()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decoder that deserializes `T` and wraps it with `wrap`.
    pub fn json<T, F>(wrap: F) -> Decoder
    where
        T: DeserializeOwned,
        F: Fn(T) -> NativeEvent + Send + Sync + 'static,
    {
        Arc::new(move |bytes| parse::<T>(bytes).map(&wrap))
    }

    pub fn ticker() -> Decoder {
        json(NativeEvent::Ticker)
    }

    pub fn depth() -> Decoder {
        json(NativeEvent::Depth)
    }

    pub fn trade() -> Decoder {
        json(NativeEvent::Trade)
    }

    pub fn candle() -> Decoder {
        json(NativeEvent::Candle)
    }

    pub fn order() -> Decoder {
        json(NativeEvent::Order)
    }

    pub fn balance() -> Decoder {
        json(NativeEvent::Balance)
    }

    pub fn position() -> Decoder {
        json(NativeEvent::Position)
    }

    pub fn account_snapshot() -> Decoder {
        Arc::new(|bytes| {
            let page: WsSnapshotPage = parse(bytes)?;
            PartialUpdate::try_from(page)
                .map(NativeEvent::Snapshot)
                .map_err(DecodeError::Malformed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_replaces_decoder() {
        let registry = Registry::new();
        let topic = Topic::from("tickers.BTC-USDT");

        assert!(registry.bind(&SubscriptionSpec::ticker(topic.clone())).await.is_none());
        let previous = registry.bind(&SubscriptionSpec::trades(topic.clone())).await;
        assert!(previous.is_some());
        assert_eq!(registry.len().await, 1);

        let (decoder, paginated) = registry.lookup(&topic).await.unwrap();
        assert!(!paginated);
        let payload = br#"{"symbol":"BTC-USDT","trade_id":"9","price":"1","size":"2","side":"sell","timestamp":1}"#;
        assert!(matches!(decoder(payload), Ok(NativeEvent::Trade(_))));
    }

    #[tokio::test]
    async fn test_restore_rolls_back() {
        let registry = Registry::new();
        let topic = Topic::from("balances");

        let previous = registry.bind(&SubscriptionSpec::balances(topic.clone())).await;
        registry.restore(&topic, previous).await;
        assert!(registry.is_empty().await);

        let first = registry.bind(&SubscriptionSpec::balances(topic.clone())).await;
        assert!(first.is_none());
        let replaced = registry.bind(&SubscriptionSpec::account_snapshot(topic.clone())).await;
        registry.restore(&topic, replaced).await;
        let (_, paginated) = registry.lookup(&topic).await.unwrap();
        assert!(!paginated);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let registry = Registry::new();
        registry.bind(&SubscriptionSpec::ticker("a")).await;
        registry.bind(&SubscriptionSpec::ticker("b")).await;
        assert!(registry.remove(&Topic::from("a")).await.is_some());
        assert!(registry.remove(&Topic::from("a")).await.is_none());
        assert_eq!(registry.topics().await, vec![Topic::from("b")]);
        assert_eq!(registry.clear().await, 1);
        assert!(registry.lookup(&Topic::from("b")).await.is_none());
    }

    #[test]
    fn test_spec_constructors_flags() {
        let spec = SubscriptionSpec::account_snapshot("positions");
        assert!(spec.requires_auth);
        assert!(spec.paginated);
        let spec = SubscriptionSpec::ticker("tickers.BTC-USDT");
        assert!(!spec.requires_auth);
        assert!(!spec.paginated);
    }

    #[test]
    fn test_decoder_accepts_single_item_array() {
        let decoder = decoders::balance();
        let one = br#"[{"asset":"USDT","total":"1","available":"1"}]"#;
        assert!(matches!(decoder(one), Ok(NativeEvent::Balance(_))));

        let two = br#"[{"asset":"USDT","total":"1","available":"1"},{"asset":"BTC","total":"1","available":"1"}]"#;
        assert!(matches!(decoder(two), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_snapshot_decoder() {
        let decoder = decoders::account_snapshot();
        let page = br#"{"page":1,"last":false,"positions":[{"symbol":"BTC-USDT","size":"1"}]}"#;
        match decoder(page).unwrap() {
            NativeEvent::Snapshot(p) => {
                assert_eq!(p.page_number, 1);
                assert!(!p.is_last_page);
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
        assert!(decoder(br#"{"page":0,"positions":[]}"#).is_err());
    }

    #[test]
    fn test_snapshot_decoder_string_update_time() {
        let decoder = decoders::account_snapshot();
        let numeric = br#"{"page":1,"last":true,"balances":[],"uTime":1700000000000}"#;
        let string = br#"{"page":1,"last":true,"balances":[],"uTime":"1700000000000"}"#;
        match (decoder(numeric).unwrap(), decoder(string).unwrap()) {
            (NativeEvent::Snapshot(a), NativeEvent::Snapshot(b)) => {
                assert!(a.summary.update_time.is_some());
                assert_eq!(a.summary.update_time, b.summary.update_time);
            }
            other => panic!("Expected snapshots, got {:?}", other),
        }
    }
}
