//! Redis Streams-backed [`MessageBroker`].
//!
//! Grounded on `dashflow-redis`'s use of `redis::aio::ConnectionManager` and
//! raw `redis::cmd` calls (the example pack's only real Redis integration)
//! — the fake in `broker::fakes` is for tests, this is the concrete
//! collaborator a running service wires up.
//!
//! A stream entry holds two fields: `payload` (the job bytes) and `attempt`
//! (a decimal string, starting at `"1"`). There is no separate
//! consumer-group pending-entries reclaim loop: `nack` acknowledges the
//! original entry and re-publishes it to the same stream with `attempt`
//! incremented, which is simpler to reason about than idle-time claiming
//! and matches the attempt counter `ReviewWorker` already expects on
//! [`InboundMessage::delivery_attempt`].

use std::collections::HashMap;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::{debug, warn};

use crate::broker::{InboundMessage, MessageBroker};

#[derive(Debug, thiserror::Error)]
pub enum RedisBrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("pending entry {0} not found when nacking (already claimed or trimmed)")]
    MissingPendingEntry(String),
}

/// A `MessageBroker` bound to one Redis stream key, consumer group, and
/// consumer name. Publishing to other topics (e.g. the DLQ) works against
/// any stream key, not just the one this broker subscribes to.
#[derive(Clone)]
pub struct RedisStreamBroker {
    conn: ConnectionManager,
    topic: String,
    group: String,
    consumer: String,
    block_ms: usize,
    batch_size: usize,
}

impl RedisStreamBroker {
    /// Connects to `redis_url` and ensures the consumer group exists on
    /// `topic` (creating the stream if needed). `consumer` should be unique
    /// per worker process — callers typically derive it from the hostname
    /// and pid.
    pub async fn connect(
        redis_url: &str,
        topic: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, RedisBrokerError> {
        let topic = topic.into();
        let group = group.into();
        let client = redis::Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let created: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&topic)
            .arg(&group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(e.into());
            }
        }

        Ok(Self {
            conn,
            topic,
            group,
            consumer: consumer.into(),
            block_ms: 5_000,
            batch_size: 10,
        })
    }

    async fn read_batch(
        conn: &mut ConnectionManager,
        topic: &str,
        group: &str,
        consumer: &str,
        block_ms: usize,
        batch_size: usize,
    ) -> Result<Vec<InboundMessage>, RedisBrokerError> {
        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(batch_size)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(topic)
            .arg(">")
            .query_async(conn)
            .await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let payload: Vec<u8> = id
                    .map
                    .get("payload")
                    .and_then(|v| match v {
                        redis::Value::BulkString(b) => Some(b.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                let attempt: u32 = id
                    .map
                    .get("attempt")
                    .and_then(|v| match v {
                        redis::Value::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
                        _ => None,
                    })
                    .unwrap_or(1);

                out.push(InboundMessage {
                    id: id.id,
                    payload,
                    delivery_attempt: attempt,
                    subscription: topic.to_string(),
                });
            }
        }
        Ok(out)
    }
}

impl MessageBroker for RedisStreamBroker {
    type Error = RedisBrokerError;
    type Stream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

    fn subscribe(&self) -> Self::Stream {
        let conn = self.conn.clone();
        let topic = self.topic.clone();
        let group = self.group.clone();
        let consumer = self.consumer.clone();
        let block_ms = self.block_ms;
        let batch_size = self.batch_size;

        stream::unfold(
            (conn, Vec::<InboundMessage>::new()),
            move |(mut conn, mut pending)| {
                let topic = topic.clone();
                let group = group.clone();
                let consumer = consumer.clone();
                async move {
                    loop {
                        if let Some(msg) = pending.pop() {
                            return Some((msg, (conn, pending)));
                        }
                        match Self::read_batch(
                            &mut conn, &topic, &group, &consumer, block_ms, batch_size,
                        )
                        .await
                        {
                            Ok(mut batch) => {
                                if batch.is_empty() {
                                    continue;
                                }
                                batch.reverse();
                                pending = batch;
                            }
                            Err(e) => {
                                warn!(error = %e, stream = %topic, "redis stream read failed, retrying");
                                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                            }
                        }
                    }
                }
            },
        )
        .boxed()
    }

    async fn ack(&self, message_id: &str) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.topic, &self.group, &[message_id]).await?;
        debug!(id = %message_id, stream = %self.topic, "acked");
        Ok(())
    }

    async fn nack(&self, message_id: &str) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();

        let entries: redis::streams::StreamRangeReply = redis::cmd("XRANGE")
            .arg(&self.topic)
            .arg(message_id)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;
        let entry = entries
            .ids
            .into_iter()
            .next()
            .ok_or_else(|| RedisBrokerError::MissingPendingEntry(message_id.to_string()))?;

        let payload: Vec<u8> = entry
            .map
            .get("payload")
            .and_then(|v| match v {
                redis::Value::BulkString(b) => Some(b.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let attempt: u32 = entry
            .map
            .get("attempt")
            .and_then(|v| match v {
                redis::Value::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
                _ => None,
            })
            .unwrap_or(1);

        let _: i64 = conn.xack(&self.topic, &self.group, &[message_id]).await?;
        let _: String = conn
            .xadd(
                &self.topic,
                "*",
                &[
                    ("payload", payload.as_slice()),
                    ("attempt", (attempt + 1).to_string().as_bytes()),
                ],
            )
            .await?;
        debug!(id = %message_id, stream = %self.topic, next_attempt = attempt + 1, "nacked and re-queued");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<String, Self::Error> {
        let mut conn = self.conn.clone();
        let attrs_json = serde_json::to_string(&attributes).unwrap_or_default();
        let id: String = conn
            .xadd(
                topic,
                "*",
                &[
                    ("payload", payload.as_slice()),
                    ("attempt", b"1".as_slice()),
                    ("attributes", attrs_json.as_bytes()),
                ],
            )
            .await?;
        Ok(id)
    }
}

/// Convenience: a `consumer` name derived from the hostname and pid, used
/// when the caller has no more specific identity to hand the broker.
pub fn default_consumer_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{host}-{}", std::process::id())
}
