//! Spotify connection store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use tunepoll_common::{AppError, AppResult};

use crate::store::{Aggregate, AggregateStore, Collection};

const DOC_ID: &str = "spotify_installation";

/// A team's Spotify authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotifyInstallation {
    pub team_id: String,
    /// Slack user who connected Spotify.
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpotifyInstallation {
    /// Whether the access token expires within `margin_secs` of `now`.
    #[must_use]
    pub const fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at - margin_secs <= now
    }
}

impl Aggregate for SpotifyInstallation {
    const COLLECTION: Collection = Collection::SpotifyInstallations;
}

/// Persists each team's Spotify tokens.
#[derive(Clone)]
pub struct SpotifyInstallationService {
    store: AggregateStore<SpotifyInstallation>,
}

impl SpotifyInstallationService {
    /// Create a new Spotify installation service.
    #[must_use]
    pub const fn new(store: AggregateStore<SpotifyInstallation>) -> Self {
        Self { store }
    }

    pub async fn get(&self, team_id: &str) -> AppResult<Option<SpotifyInstallation>> {
        self.store.find(team_id, DOC_ID).await
    }

    /// Store a new connection, replacing any previous one.
    pub async fn save(
        &self,
        team_id: &str,
        installer_user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> AppResult<SpotifyInstallation> {
        let now = Utc::now();
        let installation = SpotifyInstallation {
            team_id: team_id.to_string(),
            user_id: installer_user_id.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            created_at: now,
            updated_at: now,
        };
        self.store.put(team_id, DOC_ID, &installation).await?;

        info!(team_id = %team_id, user_id = %installer_user_id, "Connected Spotify");
        Ok(installation)
    }

    /// Replace the tokens of an existing connection.
    pub async fn update_tokens(
        &self,
        team_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> AppResult<SpotifyInstallation> {
        let (installation, ()) = self
            .store
            .update(team_id, DOC_ID, |installation| {
                installation.access_token = access_token.to_string();
                installation.refresh_token = refresh_token.to_string();
                installation.expires_at = expires_at;
                installation.updated_at = Utc::now();
                Ok(())
            })
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::NotFound(format!("Spotify installation for team {team_id}"))
                }
                other => other,
            })?;
        Ok(installation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use std::sync::Arc;
    use tunepoll_common::MemoryCache;

    fn service() -> SpotifyInstallationService {
        SpotifyInstallationService::new(AggregateStore::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryCache::default()),
            3,
        ))
    }

    #[tokio::test]
    async fn test_save_get_update() {
        let service = service();
        assert!(service.get("T1").await.unwrap().is_none());

        service.save("T1", "U1", "at-1", "rt-1", 1_000).await.unwrap();
        let updated = service.update_tokens("T1", "at-2", "rt-2", 2_000).await.unwrap();
        assert_eq!(updated.user_id, "U1");

        let stored = service.get("T1").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "at-2");
        assert_eq!(stored.refresh_token, "rt-2");
        assert_eq!(stored.expires_at, 2_000);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn test_update_without_connection() {
        let err = service()
            .update_tokens("T1", "at", "rt", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_expires_within() {
        let installation = SpotifyInstallation {
            team_id: "T1".to_string(),
            user_id: "U1".to_string(),
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: 1_000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!installation.expires_within(900, 60));
        assert!(installation.expires_within(940, 60));
        assert!(installation.expires_within(2_000, 60));
    }
}
