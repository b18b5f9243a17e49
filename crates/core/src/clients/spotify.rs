//! Spotify accounts and Web API client.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use tunepoll_common::config::SpotifyConfig;
use tunepoll_common::{AppError, AppResult};

use super::music::{MusicCatalog, TrackMetadata};
use crate::models::TrackId;
use crate::services::{SpotifyInstallation, SpotifyInstallationService};

/// Tokens are refreshed when they expire within this many seconds.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Response of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Omitted on refresh when Spotify keeps the old refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyNamed>,
    album: SpotifyAlbum,
}

#[derive(Deserialize)]
struct SpotifyNamed {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

impl From<SpotifyTrack> for TrackMetadata {
    fn from(track: SpotifyTrack) -> Self {
        Self {
            title: track.name,
            artist: track
                .artists
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            album: track.album.name,
            image_url: track.album.images.into_iter().next().map(|i| i.url),
        }
    }
}

/// Spotify client for OAuth and track lookups.
#[derive(Clone)]
pub struct SpotifyClient {
    http_client: reqwest::Client,
    config: SpotifyConfig,
    redirect_uri: String,
    installations: SpotifyInstallationService,
}

impl SpotifyClient {
    /// Create a new Spotify client.
    #[must_use]
    pub fn new(
        config: SpotifyConfig,
        redirect_uri: String,
        installations: SpotifyInstallationService,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            redirect_uri,
            installations,
        }
    }

    /// URL of Spotify's consent page, carrying `state` through the redirect.
    pub fn authorize_url(&self, state: &str) -> AppResult<String> {
        let base = format!("{}/authorize", self.config.accounts_base.trim_end_matches('/'));
        let mut url = url::Url::parse(&base).map_err(|e| AppError::Config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AppResult<TokenGrant> {
        let url = format!("{}/api/token", self.config.accounts_base.trim_end_matches('/'));
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Spotify token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Spotify token error: {status} - {body}"
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse Spotify token response: {e}"))
        })
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> AppResult<TokenGrant> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    /// Complete the connect flow: exchange `code` and store the tokens.
    pub async fn connect(
        &self,
        team_id: &str,
        installer_user_id: &str,
        code: &str,
    ) -> AppResult<SpotifyInstallation> {
        let grant = self.exchange_code(code).await?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            AppError::ExternalService("Spotify did not return a refresh token".to_string())
        })?;

        self.installations
            .save(
                team_id,
                installer_user_id,
                &grant.access_token,
                &refresh_token,
                Utc::now().timestamp() + grant.expires_in,
            )
            .await
    }

    /// A usable access token for `team_id`, refreshed if about to expire.
    pub async fn access_token(&self, team_id: &str) -> AppResult<String> {
        let installation = self.installations.get(team_id).await?.ok_or_else(|| {
            AppError::ExternalService(format!("Spotify is not connected for team {team_id}"))
        })?;

        let now = Utc::now().timestamp();
        if !installation.expires_within(now, REFRESH_MARGIN_SECS) {
            return Ok(installation.access_token);
        }

        debug!(team_id = %team_id, "Refreshing Spotify token");
        let grant = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &installation.refresh_token),
            ])
            .await?;
        let refresh_token = grant.refresh_token.unwrap_or(installation.refresh_token);

        let updated = self
            .installations
            .update_tokens(
                team_id,
                &grant.access_token,
                &refresh_token,
                now + grant.expires_in,
            )
            .await?;
        info!(team_id = %team_id, "Refreshed Spotify token");
        Ok(updated.access_token)
    }
}

#[async_trait]
impl MusicCatalog for SpotifyClient {
    async fn track(&self, team_id: &str, track_id: &TrackId) -> AppResult<TrackMetadata> {
        let token = self.access_token(team_id).await?;
        let url = format!("{}/tracks/{track_id}", self.config.api_base.trim_end_matches('/'));

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Spotify track request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Spotify track {track_id}")));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Spotify track error: {status} - {body}"
            )));
        }

        let track: SpotifyTrack = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse Spotify track: {e}"))
        })?;
        Ok(track.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{AggregateStore, MemoryDocumentStore};
    use serde_json::json;
    use std::sync::Arc;
    use tunepoll_common::NoCache;

    fn client() -> SpotifyClient {
        let installations = SpotifyInstallationService::new(AggregateStore::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(NoCache),
            3,
        ));
        let config = SpotifyConfig {
            client_id: "spotify-client".to_string(),
            client_secret: "spotify-secret".to_string(),
            redirect_uri: None,
            accounts_base: "https://accounts.spotify.com".to_string(),
            api_base: "https://api.spotify.com/v1".to_string(),
        };
        SpotifyClient::new(
            config,
            "https://bot.example/spotify/callback".to_string(),
            installations,
        )
    }

    #[test]
    fn test_authorize_url() {
        let url = client().authorize_url("abc.def").unwrap();
        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=spotify-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=abc.def"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fbot.example%2Fspotify%2Fcallback"));
    }

    #[test]
    fn test_track_metadata_mapping() {
        let track: SpotifyTrack = serde_json::from_value(json!({
            "name": "Song",
            "artists": [{ "name": "A" }, { "name": "B" }],
            "album": {
                "name": "Record",
                "images": [{ "url": "https://i.scdn.co/640" }, { "url": "https://i.scdn.co/300" }]
            },
            "popularity": 50
        }))
        .unwrap();

        let meta = TrackMetadata::from(track);
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.artist, "A, B");
        assert_eq!(meta.album, "Record");
        assert_eq!(meta.image_url.as_deref(), Some("https://i.scdn.co/640"));
    }

    #[tokio::test]
    async fn test_access_token_without_connection() {
        let err = client().access_token("T1").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_as_is() {
        let client = client();
        client
            .installations
            .save("T1", "U1", "at-1", "rt-1", Utc::now().timestamp() + 3_600)
            .await
            .unwrap();

        assert_eq!(client.access_token("T1").await.unwrap(), "at-1");
    }
}
