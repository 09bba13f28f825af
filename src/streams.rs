//! # In-Memory Stream Double
//!
//! Publish/subscribe stand-in. Channels are keyed by `(stream id, namespace)`
//! and deliver items to every active subscriber in publish order. Items cross
//! the channel as [`serde_json::Value`] so publisher and subscriber item types
//! only need to agree structurally.
//!
//! The subscriber registry is owned by the provider instance (and therefore
//! by the harness that built it); there is no process-wide state, so
//! concurrent harnesses cannot leak deliveries into each other.

use crate::error::{MockError, StreamError};
use crate::key::EntityKey;
use crate::ops::OpId;
use crate::tracker::{CallTracker, ReadinessTicket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub const OP_PUBLISH: &str = "publish";
pub const OP_SUBSCRIBE: &str = "subscribe";

/// Channel key for a stream: `(stream id, namespace)`.
pub fn stream_key(stream_id: Uuid, namespace: &str) -> EntityKey {
    EntityKey::compound(stream_id, namespace)
}

/// The in-memory stream provider double.
pub struct MemoryStreams {
    name: String,
    channels: Mutex<HashMap<EntityKey, Vec<mpsc::UnboundedSender<Value>>>>,
    tracker: Arc<CallTracker>,
    publish_op: OpId,
    subscribe_op: OpId,
}

impl MemoryStreams {
    pub fn new(name: impl Into<String>, tracker: Arc<CallTracker>) -> Self {
        let ops = tracker.operations();
        let publish_op = ops.intern(OP_PUBLISH);
        let subscribe_op = ops.intern(OP_SUBSCRIBE);
        Self {
            name: name.into(),
            channels: Mutex::new(HashMap::new()),
            tracker,
            publish_op,
            subscribe_op,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publishes one item to every active subscriber of the stream, in
    /// publish order. Returns how many subscribers received it.
    pub fn publish<T: Serialize>(
        &self,
        stream_id: Uuid,
        namespace: &str,
        item: &T,
    ) -> Result<usize, StreamError> {
        let key = stream_key(stream_id, namespace);
        let value = serde_json::to_value(item)?;
        let delivered = {
            let mut channels = self.channels.lock().unwrap();
            let subscribers = channels.entry(key.clone()).or_default();
            subscribers.retain(|tx| tx.send(value.clone()).is_ok());
            subscribers.len()
        };
        debug!(provider = %self.name, key = %key, delivered, "Published item");
        self.tracker.record(&self.name, self.publish_op, &key);
        Ok(delivered)
    }

    /// Subscribes to a stream. Items published after this call are delivered
    /// in order; items published before it are not replayed.
    pub fn subscribe<T: DeserializeOwned>(
        &self,
        stream_id: Uuid,
        namespace: &str,
    ) -> StreamSubscription<T> {
        let key = stream_key(stream_id, namespace);
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push(tx);
        debug!(provider = %self.name, key = %key, "Subscribed");
        self.tracker.record(&self.name, self.subscribe_op, &key);
        StreamSubscription {
            rx,
            _marker: PhantomData,
        }
    }

    /// Subscribes now and returns a future resolving once `count` items have
    /// been delivered, in publish order.
    ///
    /// The subscription is registered before this returns, so the caller can
    /// hold the future while driving the publishing side and await it later.
    pub fn collect<T: DeserializeOwned>(
        &self,
        stream_id: Uuid,
        namespace: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<T>, StreamError>> {
        let mut subscription = self.subscribe::<T>(stream_id, namespace);
        async move {
            let mut items = Vec::with_capacity(count);
            while items.len() < count {
                match subscription.recv().await? {
                    Some(item) => items.push(item),
                    None => return Err(StreamError::Closed),
                }
            }
            Ok(items)
        }
    }

    /// Registers a readiness ticket over this provider's operations
    /// (`"publish"` or `"subscribe"`) for one stream.
    pub fn await_operation(
        &self,
        stream_id: Uuid,
        namespace: &str,
        op: &'static str,
        calls: u32,
    ) -> Result<ReadinessTicket, MockError> {
        let op = self.tracker.operations().intern(op);
        self.tracker
            .ticket(self.name.clone(), op, stream_key(stream_id, namespace), calls)
    }
}

/// Typed receiving end of one stream subscription.
pub struct StreamSubscription<T> {
    rx: mpsc::UnboundedReceiver<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamSubscription<T> {
    /// Next item in publish order; `Ok(None)` once the provider is dropped.
    pub async fn recv(&mut self) -> Result<Option<T>, StreamError> {
        match self.rx.recv().await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OperationTable;

    fn streams() -> MemoryStreams {
        let ops = Arc::new(OperationTable::new());
        MemoryStreams::new("sms", Arc::new(CallTracker::new(ops)))
    }

    #[tokio::test]
    async fn delivers_in_publish_order_to_each_subscriber() {
        let streams = streams();
        let stream_id = Uuid::new_v4();

        let mut first = streams.subscribe::<u32>(stream_id, "numbers");
        let mut second = streams.subscribe::<u32>(stream_id, "numbers");
        for n in 1..=3u32 {
            assert_eq!(streams.publish(stream_id, "numbers", &n).unwrap(), 2);
        }

        for expected in 1..=3u32 {
            assert_eq!(first.recv().await.unwrap(), Some(expected));
        }
        assert_eq!(second.recv().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let streams = streams();
        let stream_id = Uuid::new_v4();

        let mut orders = streams.subscribe::<String>(stream_id, "orders");
        streams
            .publish(stream_id, "users", &"ignored".to_string())
            .unwrap();
        streams
            .publish(stream_id, "orders", &"kept".to_string())
            .unwrap();
        assert_eq!(orders.recv().await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn collect_resolves_after_count_items() {
        let streams = streams();
        let stream_id = Uuid::new_v4();

        let collected = streams.collect::<u32>(stream_id, "numbers", 3);
        for n in [7u32, 8, 9] {
            streams.publish(stream_id, "numbers", &n).unwrap();
        }
        assert_eq!(collected.await.unwrap(), vec![7, 8, 9]);
    }
}
