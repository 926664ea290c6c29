//! Redis-backed [`review_core::checkpoint::CheckpointStore`].
//!
//! Grounded the same way as [`crate::redis_broker::RedisStreamBroker`]: a
//! `redis::aio::ConnectionManager` plus raw `redis::cmd` calls, the pack's
//! only real Redis integration. Each `(review_id, stage)` pair is one string
//! key holding the checkpoint's tagged JSON payload; there is no separate
//! index, since `review_core::workflow` only ever looks up a checkpoint by
//! the exact id/stage pair it just saved.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use review_core::checkpoint::CheckpointStore;
use serde_json::Value;

use crate::redis_broker::RedisBrokerError;

/// TTL applied to every checkpoint key so an abandoned review doesn't
/// accumulate state forever. 7 days comfortably outlives any single review's
/// expected wall-clock, including a resume after a crashed worker restart.
const CHECKPOINT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone)]
pub struct RedisCheckpointStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCheckpointStore {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, RedisBrokerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, review_id: &str, stage: &str) -> String {
        checkpoint_key(&self.key_prefix, review_id, stage)
    }
}

fn checkpoint_key(prefix: &str, review_id: &str, stage: &str) -> String {
    format!("{prefix}:{review_id}:{stage}")
}

impl CheckpointStore for RedisCheckpointStore {
    type Error = RedisBrokerError;

    async fn save(&self, review_id: &str, stage: &str, payload: Value) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_vec(&payload).unwrap_or_default();
        let key = self.key(review_id, stage);
        let _: () = conn.set_ex(&key, body, CHECKPOINT_TTL_SECS).await?;
        Ok(())
    }

    async fn load(&self, review_id: &str, stage: &str) -> Result<Option<Value>, Self::Error> {
        let mut conn = self.conn.clone();
        let key = self.key(review_id, stage);
        let raw: Option<Vec<u8>> = conn.get(&key).await?;
        Ok(raw.and_then(|bytes| serde_json::from_slice(&bytes).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespaced_by_prefix_review_and_stage() {
        assert_eq!(checkpoint_key("ckpt", "rev-1", "ingest_pr"), "ckpt:rev-1:ingest_pr");
    }
}
