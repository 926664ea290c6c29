//! Message-broker capability: the pub/sub-style subscription the worker
//! drains and the topic it republishes to (for outbound jobs and the DLQ).
//!
//! Grounded on the `CheckpointStore`/`ProviderAdapter` capability-trait
//! style in `review-core::capabilities` (plain `async fn` in trait, no
//! `async-trait`, no `Box<dyn Trait>`). The streaming side uses an
//! associated `Stream` type rather than an async trait method returning a
//! stream, since GATs/impl-Trait-in-traits don't yet compose with streaming
//! return positions as cleanly as single futures.

use std::collections::HashMap;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// One message pulled off a subscription, before it's parsed into a `Job`.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub payload: Vec<u8>,
    pub delivery_attempt: u32,
    pub subscription: String,
}

/// `{ original_message_id, error, original_subscription, failed_at }`,
/// attached to a message before it's republished to the DLQ topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqInfo {
    pub original_message_id: String,
    pub error: String,
    pub original_subscription: String,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Capability for draining a subscription and publishing to topics
/// (outbound review-request jobs, and the dead-letter topic).
pub trait MessageBroker {
    type Error: std::error::Error + Send + Sync + 'static;
    type Stream: Stream<Item = InboundMessage> + Send + Unpin;

    /// Opens the streaming pull for this worker's subscription.
    fn subscribe(&self) -> Self::Stream;

    fn ack(&self, message_id: &str) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    fn nack(&self, message_id: &str) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Publishes `payload` with the given message attributes to `topic`,
    /// returning the broker-assigned message id.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> impl std::future::Future<Output = Result<String, Self::Error>> + Send;
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// In-memory broker: a fixed vector of inbound messages plays out as a
    /// stream; acks/nacks/publishes are recorded for assertions.
    pub struct FakeBroker {
        pub inbound: Mutex<Vec<InboundMessage>>,
        pub acked: Mutex<Vec<String>>,
        pub nacked: Mutex<Vec<String>>,
        pub published: Mutex<Vec<(String, Vec<u8>, HashMap<String, String>)>>,
        pub fail_publish_to: Mutex<Vec<String>>,
    }

    impl FakeBroker {
        pub fn new(inbound: Vec<InboundMessage>) -> Self {
            Self {
                inbound: Mutex::new(inbound),
                acked: Mutex::new(Vec::new()),
                nacked: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                fail_publish_to: Mutex::new(Vec::new()),
            }
        }

        pub fn fail_publishes_to(&self, topic: &str) {
            self.fail_publish_to.lock().unwrap().push(topic.to_string());
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake broker publish failure")]
    pub struct FakePublishError;

    impl MessageBroker for FakeBroker {
        type Error = FakePublishError;
        type Stream = futures::stream::Iter<std::vec::IntoIter<InboundMessage>>;

        fn subscribe(&self) -> Self::Stream {
            let msgs = std::mem::take(&mut *self.inbound.lock().unwrap());
            futures::stream::iter(msgs)
        }

        async fn ack(&self, message_id: &str) -> Result<(), Self::Error> {
            self.acked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn nack(&self, message_id: &str) -> Result<(), Self::Error> {
            self.nacked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            attributes: HashMap<String, String>,
        ) -> Result<String, Self::Error> {
            if self.fail_publish_to.lock().unwrap().iter().any(|t| t == topic) {
                return Err(FakePublishError);
            }
            let id = format!("msg-{}", self.published.lock().unwrap().len() + 1);
            self.published.lock().unwrap().push((topic.to_string(), payload, attributes));
            Ok(id)
        }
    }
}
