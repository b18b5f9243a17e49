//! Document repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value as JsonValue;
use tunepoll_common::{AppError, AppResult};

use crate::entities::{Document, document};

/// Repository for document reads and conditional writes.
#[derive(Clone)]
pub struct DocumentRepository {
    db: Arc<DatabaseConnection>,
}

impl DocumentRepository {
    /// Create a new document repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a document by collection and ID.
    pub async fn find(&self, collection: &str, doc_id: &str) -> AppResult<Option<document::Model>> {
        Document::find_by_id((collection.to_string(), doc_id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a document unless one already exists at that key.
    ///
    /// Returns `true` when this call created the document.
    pub async fn insert_if_absent(
        &self,
        collection: &str,
        doc_id: &str,
        body: JsonValue,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let model = document::ActiveModel {
            collection: Set(collection.to_string()),
            doc_id: Set(doc_id.to_string()),
            body: Set(body),
            revision: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = Document::insert(model)
            .on_conflict(
                OnConflict::columns([document::Column::Collection, document::Column::DocId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(inserted == 1)
    }

    /// Write a document unconditionally, returning its new revision.
    pub async fn upsert(&self, collection: &str, doc_id: &str, body: JsonValue) -> AppResult<i64> {
        let now = Utc::now();
        let model = document::ActiveModel {
            collection: Set(collection.to_string()),
            doc_id: Set(doc_id.to_string()),
            body: Set(body),
            revision: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let stored = Document::insert(model)
            .on_conflict(
                OnConflict::columns([document::Column::Collection, document::Column::DocId])
                    .update_columns([document::Column::Body, document::Column::UpdatedAt])
                    .value(
                        document::Column::Revision,
                        Expr::col((Document, document::Column::Revision)).add(1),
                    )
                    .to_owned(),
            )
            .exec_with_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(stored.revision)
    }

    /// Replace a document only if its revision still equals `expected`.
    ///
    /// Returns `false` when another writer got there first.
    pub async fn update_if_revision(
        &self,
        collection: &str,
        doc_id: &str,
        expected: i64,
        body: JsonValue,
    ) -> AppResult<bool> {
        let result = Document::update_many()
            .col_expr(document::Column::Body, Expr::value(body))
            .col_expr(document::Column::Revision, Expr::value(expected + 1))
            .col_expr(document::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(document::Column::Collection.eq(collection))
            .filter(document::Column::DocId.eq(doc_id))
            .filter(document::Column::Revision.eq(expected))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}
