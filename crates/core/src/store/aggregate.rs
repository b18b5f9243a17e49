//! Typed, cached access to stored aggregates.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use tunepoll_common::{AppError, AppResult, DocumentCache};

use super::{Collection, DocumentStore, INITIAL_REVISION, StoredDocument, cache_key};

/// A type stored as one document per id.
pub trait Aggregate: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Per-team collection the documents live in.
    const COLLECTION: Collection;

    /// Migrate a document decoded from an older layout.
    fn upgrade(&mut self) {}
}

/// Reads go through the cache; read-modify-write cycles go to the store and
/// are retried on revision conflicts.
pub struct AggregateStore<T> {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn DocumentCache>,
    max_attempts: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AggregateStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            max_attempts: self.max_attempts,
            _marker: PhantomData,
        }
    }
}

impl<T: Aggregate> AggregateStore<T> {
    /// Create a store. `max_attempts` bounds [`update`](Self::update) retries.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn DocumentCache>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            cache,
            max_attempts: max_attempts.max(1),
            _marker: PhantomData,
        }
    }

    fn decode(body: Value) -> AppResult<T> {
        let mut value: T = serde_json::from_value(body)?;
        value.upgrade();
        Ok(value)
    }

    /// Find a document, consulting the cache first.
    pub async fn find(&self, team_id: &str, doc_id: &str) -> AppResult<Option<T>> {
        let collection = T::COLLECTION.path(team_id);
        let key = cache_key(&collection, doc_id);

        if let Some(body) = self.cache.get(&key).await {
            match Self::decode(body) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Some(value));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(&key).await;
                }
            }
        }

        debug!(key = %key, "Cache miss");
        let Some(doc) = self.store.get(&collection, doc_id).await? else {
            return Ok(None);
        };
        self.cache.set(&key, doc.revision, &doc.body).await;
        Self::decode(doc.body).map(Some)
    }

    /// Find a document, creating it with `init` if absent.
    ///
    /// Concurrent creators converge: whoever loses the create re-reads the
    /// winner's document.
    pub async fn get_or_create<F>(&self, team_id: &str, doc_id: &str, init: F) -> AppResult<T>
    where
        F: FnOnce() -> T + Send,
    {
        if let Some(value) = self.find(team_id, doc_id).await? {
            return Ok(value);
        }

        let collection = T::COLLECTION.path(team_id);
        let key = cache_key(&collection, doc_id);
        let value = init();
        let body = serde_json::to_value(&value)?;

        if self.store.create(&collection, doc_id, body.clone()).await? {
            debug!(key = %key, "Created document");
            self.cache.set(&key, INITIAL_REVISION, &body).await;
            return Ok(value);
        }

        let StoredDocument { body, revision } = self
            .store
            .get(&collection, doc_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("{key} vanished after create")))?;
        self.cache.set(&key, revision, &body).await;
        Self::decode(body)
    }

    /// Overwrite a document.
    pub async fn put(&self, team_id: &str, doc_id: &str, value: &T) -> AppResult<()> {
        let collection = T::COLLECTION.path(team_id);
        let body = serde_json::to_value(value)?;
        let revision = self.store.set(&collection, doc_id, body.clone()).await?;
        self.cache
            .set(&cache_key(&collection, doc_id), revision, &body)
            .await;
        Ok(())
    }

    /// Apply `apply` to the current document and write it back.
    ///
    /// The document is always read from the store, never the cache. When
    /// another writer changed it in between, the change is re-applied to the
    /// fresh copy. An error from `apply` aborts without writing.
    pub async fn update<R, F>(&self, team_id: &str, doc_id: &str, mut apply: F) -> AppResult<(T, R)>
    where
        F: FnMut(&mut T) -> AppResult<R> + Send,
        R: Send,
    {
        let collection = T::COLLECTION.path(team_id);
        let key = cache_key(&collection, doc_id);

        for attempt in 1..=self.max_attempts {
            let doc = self
                .store
                .get(&collection, doc_id)
                .await?
                .ok_or_else(|| AppError::NotFound(key.clone()))?;

            let mut value = Self::decode(doc.body)?;
            let outcome = apply(&mut value)?;
            let body = serde_json::to_value(&value)?;

            if self
                .store
                .compare_and_set(&collection, doc_id, body.clone(), doc.revision)
                .await?
            {
                self.cache.set(&key, doc.revision + 1, &body).await;
                return Ok((value, outcome));
            }

            debug!(key = %key, attempt, revision = doc.revision, "Revision conflict, retrying");
        }

        warn!(key = %key, attempts = self.max_attempts, "Gave up after repeated revision conflicts");
        Err(AppError::Conflict(format!("{key} is being modified concurrently")))
    }
}
