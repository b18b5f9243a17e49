//! Document persistence.
//!
//! Aggregates are stored as whole JSON documents under composite collection
//! paths (`team/{team_id}/weekly_polls`, ...). Each document has a revision
//! that moves forward on every write so that read-modify-write cycles can
//! detect a concurrent writer.

mod aggregate;
mod memory;
mod sql;

use async_trait::async_trait;
use serde_json::Value;
use tunepoll_common::AppResult;

pub use aggregate::{Aggregate, AggregateStore};
pub use memory::MemoryDocumentStore;
pub use sql::SqlDocumentStore;

/// Revision of a freshly created document.
pub const INITIAL_REVISION: i64 = 1;

/// A document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Document body.
    pub body: Value,
    /// Revision the body was read at.
    pub revision: i64,
}

/// Kinds of documents kept per team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Weekly polls, keyed by poll id.
    WeeklyPolls,
    /// App users, keyed by Slack user id.
    Users,
    /// Slack installations.
    Installations,
    /// The Spotify connection.
    SpotifyInstallations,
}

impl Collection {
    /// Collection path for `team_id`.
    #[must_use]
    pub fn path(self, team_id: &str) -> String {
        let kind = match self {
            Self::WeeklyPolls => "weekly_polls",
            Self::Users => "users",
            Self::Installations => "installations",
            Self::SpotifyInstallations => "spotify_installations",
        };
        format!("team/{team_id}/{kind}")
    }
}

/// Cache key of a document.
#[must_use]
pub fn cache_key(collection: &str, doc_id: &str) -> String {
    format!("{collection}/{doc_id}")
}

/// Storage backend for JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document.
    async fn get(&self, collection: &str, doc_id: &str) -> AppResult<Option<StoredDocument>>;

    /// Write a document at [`INITIAL_REVISION`] unless one already exists.
    /// Returns whether it was written.
    async fn create(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<bool>;

    /// Overwrite a document unconditionally. Returns the new revision.
    async fn set(&self, collection: &str, doc_id: &str, body: Value) -> AppResult<i64>;

    /// Overwrite a document only if it is still at `expected_revision`.
    async fn compare_and_set(
        &self,
        collection: &str,
        doc_id: &str,
        body: Value,
        expected_revision: i64,
    ) -> AppResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_paths() {
        assert_eq!(Collection::WeeklyPolls.path("T1"), "team/T1/weekly_polls");
        assert_eq!(Collection::Users.path("T1"), "team/T1/users");
        assert_eq!(Collection::Installations.path("T1"), "team/T1/installations");
        assert_eq!(
            Collection::SpotifyInstallations.path("T1"),
            "team/T1/spotify_installations"
        );
        assert_eq!(cache_key("team/T1/users", "U1"), "team/T1/users/U1");
    }
}
