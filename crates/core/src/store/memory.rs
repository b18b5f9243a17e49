//! In-memory document store for development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tunepoll_common::AppResult;

use super::{DocumentStore, INITIAL_REVISION, StoredDocument};

type Key = (String, String);

/// Document store backed by a process-local map.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<RwLock<HashMap<Key, StoredDocument>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

fn key(collection: &str, doc_id: &str) -> Key {
    (collection.to_string(), doc_id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, doc_id: &str) -> AppResult<Option<StoredDocument>> {
        Ok(self.docs.read().await.get(&key(collection, doc_id)).cloned())
    }

    async fn create(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<bool> {
        let mut docs = self.docs.write().await;
        let key = key(collection, doc_id);
        if docs.contains_key(&key) {
            return Ok(false);
        }
        docs.insert(key, StoredDocument { body, revision: INITIAL_REVISION });
        Ok(true)
    }

    async fn set(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<i64> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .entry(key(collection, doc_id))
            .and_modify(|doc| doc.revision += 1)
            .or_insert(StoredDocument {
                body: Value::Null,
                revision: INITIAL_REVISION,
            });
        doc.body = body;
        Ok(doc.revision)
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        doc_id: &str,
        body: Value,
        expected_revision: i64,
    ) -> AppResult<bool> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(&key(collection, doc_id)) {
            Some(doc) if doc.revision == expected_revision => {
                doc.body = body;
                doc.revision += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
