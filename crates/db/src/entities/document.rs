//! Document entity.
//!
//! Every aggregate (poll, user, installation) is stored as one JSON document
//! addressed by `(collection, doc_id)`, e.g. `("team/T123/weekly_polls", "2025-03-10")`.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Stored document.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document")]
pub struct Model {
    /// Collection path, `team/{team_id}/{kind}`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub collection: String,

    /// Document ID within the collection.
    #[sea_orm(primary_key, auto_increment = false)]
    pub doc_id: String,

    /// Full document body.
    #[sea_orm(column_type = "JsonBinary")]
    pub body: JsonValue,

    /// Incremented on every write; used for compare-and-set updates.
    pub revision: i64,

    /// When the document was first written.
    pub created_at: DateTime<Utc>,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
