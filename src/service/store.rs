use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::{CallPatch, CallRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage is unreachable; the analysis still completes, it just is
    /// not durably saved
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed record for call {0}: {1}")]
    Malformed(String, String),
}

/// Persistence collaborator for call records. Upserts are idempotent and
/// keyed by call id; concurrent upserts to the same id resolve
/// last-write-wins.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn upsert(&self, call_id: &str, patch: CallPatch) -> Result<(), StoreError>;
    async fn find_one(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError>;
}

/// Document store backed by one JSON file per call id under a data
/// directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, call_id: &str) -> PathBuf {
        // Call ids are caller-supplied; keep them inside the data directory
        let safe: String = call_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn read_document(&self, call_id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(call_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Unavailable(format!("{path:?}: {e}")))?;
        let value = serde_json::from_str(&text)
            .map_err(|e| StoreError::Malformed(call_id.to_string(), e.to_string()))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl CallStore for JsonFileStore {
    async fn upsert(&self, call_id: &str, patch: CallPatch) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| StoreError::Unavailable(format!("{:?}: {e}", self.root)))?;

        let mut document = match self.read_document(call_id)? {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        document.insert("call_id".to_string(), Value::String(call_id.to_string()));

        let patch_value = serde_json::to_value(&patch)
            .map_err(|e| StoreError::Malformed(call_id.to_string(), e.to_string()))?;
        if let Value::Object(fields) = patch_value {
            for (key, value) in fields {
                document.insert(key, value);
            }
        }

        let path = self.document_path(call_id);
        let text = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| StoreError::Malformed(call_id.to_string(), e.to_string()))?;
        std::fs::write(&path, text)
            .map_err(|e| StoreError::Unavailable(format!("{path:?}: {e}")))?;

        debug!("upserted call record {call_id}");
        Ok(())
    }

    async fn find_one(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError> {
        match self.read_document(call_id)? {
            Some(value) => {
                let record = serde_json::from_value(value)
                    .map_err(|e| StoreError::Malformed(call_id.to_string(), e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallScores, CallStatus};
    use serde_json::json;

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_find_one_missing() {
        let (_dir, store) = store();
        assert!(store.find_one("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_then_find() {
        let (_dir, store) = store();
        store.upsert("call-1", CallPatch::processing()).await.unwrap();

        let record = store.find_one("call-1").await.unwrap().unwrap();
        assert_eq!(record.call_id, "call-1");
        assert_eq!(record.status, CallStatus::Processing);
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_fields() {
        let (_dir, store) = store();
        store.upsert("call-1", CallPatch::processing()).await.unwrap();
        store
            .upsert(
                "call-1",
                CallPatch::completed(
                    json!({"summary_metrics": {"qa_score": 80}}),
                    CallScores {
                        qa: 80,
                        sop: 60,
                        sentiment: -65,
                        risk: 100,
                    },
                    "transcript text".to_string(),
                ),
            )
            .await
            .unwrap();

        let record = store.find_one("call-1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Completed);
        // started_at from the first patch survives the merge
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_some());
        assert_eq!(record.scores.unwrap().qa, 80);
        assert_eq!(record.transcript.as_deref(), Some("transcript text"));
    }

    #[tokio::test]
    async fn test_reanalysis_replaces_failure() {
        let (_dir, store) = store();
        store
            .upsert("call-1", CallPatch::failed("model exploded".to_string()))
            .await
            .unwrap();
        let record = store.find_one("call-1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("model exploded"));

        store.upsert("call-1", CallPatch::processing()).await.unwrap();
        let record = store.find_one("call-1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Processing);
    }

    #[tokio::test]
    async fn test_call_id_is_sanitized_into_directory() {
        let (dir, store) = store();
        store
            .upsert("../escape/attempt", CallPatch::processing())
            .await
            .unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].file_name().to_string_lossy().ends_with(".json"));
    }
}
