//! Redis-backed [`review_core::budget::CostLedger`].
//!
//! Entries are stored in a single sorted set keyed by UTC timestamp (the
//! sort score), each member a small JSON record of `{cost_usd, repo}`. A
//! range query is one `ZRANGEBYSCORE`; repo-scoping is applied in-process
//! since sorted-set scores can't carry a second dimension. Grounded on
//! `redis_broker::RedisStreamBroker`'s `ConnectionManager` + raw `redis::cmd`
//! style; this is the crate's second (and last) direct Redis collaborator.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use review_core::budget::CostLedger;
use serde::{Deserialize, Serialize};

use crate::redis_broker::RedisBrokerError;

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    cost_usd: f64,
    repo: Option<String>,
}

#[derive(Clone)]
pub struct RedisCostLedger {
    conn: ConnectionManager,
    key: String,
}

impl RedisCostLedger {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, RedisBrokerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, key: key.into() })
    }

    /// Records one spend event. Called by the worker after a review
    /// completes (or after each model call, for finer-grained budget
    /// tracking) — `CostLedger`'s trait is read-only by design, so writing
    /// is a plain inherent method rather than part of the capability.
    pub async fn record(&self, at: DateTime<Utc>, cost_usd: f64, repo: Option<&str>) -> Result<(), RedisBrokerError> {
        let mut conn = self.conn.clone();
        let entry = Entry {
            cost_usd,
            repo: repo.map(str::to_string),
        };
        let member = serde_json::to_string(&entry).unwrap_or_default();
        let score = at.timestamp_millis() as f64;
        let _: () = conn.zadd(&self.key, member, score).await?;
        Ok(())
    }
}

impl CostLedger for RedisCostLedger {
    type Error = RedisBrokerError;

    async fn spend_since(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        repo: Option<&str>,
    ) -> Result<f64, Self::Error> {
        let mut conn = self.conn.clone();
        let min_score = since.timestamp_millis() as f64;
        let max_score = until.timestamp_millis() as f64;
        let members: Vec<String> = conn.zrangebyscore(&self.key, min_score, max_score).await?;

        let total = members
            .iter()
            .filter_map(|m| serde_json::from_str::<Entry>(m).ok())
            .filter(|e| repo.is_none() || e.repo.as_deref() == repo)
            .map(|e| e.cost_usd)
            .sum();
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_through_json() {
        let e = Entry {
            cost_usd: 1.5,
            repo: Some("acme/widgets".to_string()),
        };
        let s = serde_json::to_string(&e).unwrap();
        let back: Entry = serde_json::from_str(&s).unwrap();
        assert_eq!(back.cost_usd, 1.5);
        assert_eq!(back.repo.as_deref(), Some("acme/widgets"));
    }
}
