//! Workflow checkpoint persistence: tagged-value (de)serialization so a
//! `ReviewState` snapshot can round-trip through any KV/document store
//! without losing datetime fidelity.
//!
//! Grounded on the Python `FirestoreCheckpointer`'s `_serialize`/
//! `_deserialize` tagging convention (`{"_type": "...", "_data": ...}`),
//! reimplemented over `serde_json::Value` instead of Firestore's document
//! model.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::errors::Error;

const TAG_KEY: &str = "_type";
const DATA_KEY: &str = "_data";

/// Capability for storing/loading opaque checkpoint blobs keyed by review id
/// and stage name. Concrete backends (Redis, a document store, a local
/// file) live outside this crate.
pub trait CheckpointStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(
        &self,
        review_id: &str,
        stage: &str,
        payload: Value,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    fn load(
        &self,
        review_id: &str,
        stage: &str,
    ) -> impl std::future::Future<Output = Result<Option<Value>, Self::Error>> + Send;
}

/// Wraps a serializable value into the tagged `{"_type": "pydantic",
/// "_data": ...}` envelope used for workflow-state snapshots.
pub fn tag_pydantic<T: Serialize>(value: &T) -> Result<Value, Error> {
    let data = serde_json::to_value(value)?;
    Ok(json!({ TAG_KEY: "pydantic", DATA_KEY: data }))
}

/// Wraps a UTC timestamp into the tagged `{"_type": "datetime", "_data":
/// "<rfc3339>"}` envelope.
pub fn tag_datetime(value: DateTime<Utc>) -> Value {
    json!({ TAG_KEY: "datetime", DATA_KEY: value.to_rfc3339() })
}

/// Reverses `tag_pydantic`/`tag_datetime`. An unrecognized or missing tag
/// falls back to treating the whole value as raw, untagged payload rather
/// than erroring — older checkpoints written before a tag existed still
/// load.
pub fn untag(value: Value) -> Value {
    match value.get(TAG_KEY).and_then(|t| t.as_str()) {
        Some("pydantic") | Some("datetime") => value
            .get(DATA_KEY)
            .cloned()
            .unwrap_or(Value::Null),
        _ => value,
    }
}

/// Deserializes a tagged pydantic-style payload back into `T`.
pub fn untag_pydantic<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    let raw = untag(value);
    Ok(serde_json::from_value(raw)?)
}

/// Deserializes a tagged datetime payload back into a UTC timestamp.
pub fn untag_datetime(value: Value) -> Result<DateTime<Utc>, Error> {
    let raw = untag(value);
    let s = raw
        .as_str()
        .ok_or_else(|| Error::Parse("checkpoint datetime is not a string".to_string()))?;
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("invalid checkpoint datetime: {e}")))
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryCheckpointStore {
        entries: Mutex<HashMap<(String, String), Value>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("in-memory checkpoint store failure")]
    pub struct NeverFails;

    impl CheckpointStore for InMemoryCheckpointStore {
        type Error = NeverFails;

        async fn save(&self, review_id: &str, stage: &str, payload: Value) -> Result<(), Self::Error> {
            self.entries
                .lock()
                .unwrap()
                .insert((review_id.to_string(), stage.to_string()), payload);
            Ok(())
        }

        async fn load(&self, review_id: &str, stage: &str) -> Result<Option<Value>, Self::Error> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&(review_id.to_string(), stage.to_string()))
                .cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewConfig;

    #[test]
    fn pydantic_round_trips_through_tag() {
        let cfg = ReviewConfig::default();
        let tagged = tag_pydantic(&cfg).unwrap();
        assert_eq!(tagged[TAG_KEY], "pydantic");
        let back: ReviewConfig = untag_pydantic(tagged).unwrap();
        assert_eq!(back.max_suggestions, cfg.max_suggestions);
    }

    #[test]
    fn datetime_round_trips_through_tag() {
        let now = Utc::now();
        let tagged = tag_datetime(now);
        assert_eq!(tagged[TAG_KEY], "datetime");
        let back = untag_datetime(tagged).unwrap();
        assert_eq!(back.timestamp(), now.timestamp());
    }

    #[test]
    fn untag_falls_back_to_raw_value_for_unknown_tag() {
        let raw = json!({"foo": "bar"});
        assert_eq!(untag(raw.clone()), raw);
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_save_and_load() {
        use fakes::InMemoryCheckpointStore;
        let store = InMemoryCheckpointStore::default();
        let payload = json!({"stage": "ingest_pr"});
        store.save("rev-1", "ingest_pr", payload.clone()).await.unwrap();
        let loaded = store.load("rev-1", "ingest_pr").await.unwrap();
        assert_eq!(loaded, Some(payload));
        assert_eq!(store.load("rev-1", "other_stage").await.unwrap(), None);
    }
}
