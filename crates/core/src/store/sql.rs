//! PostgreSQL document store.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tunepoll_common::AppResult;
use tunepoll_db::DocumentRepository;

use super::{DocumentStore, StoredDocument};

/// Document store over the `document` table.
#[derive(Clone)]
pub struct SqlDocumentStore {
    repo: DocumentRepository,
}

impl SqlDocumentStore {
    /// Create a store on an open connection.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repo: DocumentRepository::new(db),
        }
    }
}

#[async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn get(&self, collection: &str, doc_id: &str) -> AppResult<Option<StoredDocument>> {
        Ok(self
            .repo
            .find(collection, doc_id)
            .await?
            .map(|model| StoredDocument {
                body: model.body,
                revision: model.revision,
            }))
    }

    async fn create(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<bool> {
        self.repo.insert_if_absent(collection, doc_id, body).await
    }

    async fn set(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<i64> {
        self.repo.upsert(collection, doc_id, body).await
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        doc_id: &str,
        body: Value,
        expected_revision: i64,
    ) -> AppResult<bool> {
        self.repo
            .update_if_revision(collection, doc_id, expected_revision, body)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;
    use tunepoll_db::entities::document;

    #[tokio::test]
    async fn test_get_maps_revision() {
        let model = document::Model {
            collection: "team/T1/users".to_string(),
            doc_id: "U1".to_string(),
            body: json!({ "id": "U1" }),
            revision: 7,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[model]])
                .into_connection(),
        );

        let store = SqlDocumentStore::new(db);
        let doc = store.get("team/T1/users", "U1").await.unwrap().unwrap();

        assert_eq!(doc.revision, 7);
        assert_eq!(doc.body["id"], "U1");
    }

    #[tokio::test]
    async fn test_compare_and_set_reports_conflict() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let store = SqlDocumentStore::new(db);
        let applied = store
            .compare_and_set("team/T1/weekly_polls", "p1", json!({}), 3)
            .await
            .unwrap();

        assert!(!applied);
    }
}
