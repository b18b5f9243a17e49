//! Music catalog lookups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tunepoll_common::AppResult;

use crate::models::TrackId;

/// Display metadata of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub image_url: Option<String>,
}

/// Resolves track ids to metadata.
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    /// Look up a track using the team's music service connection.
    async fn track(&self, team_id: &str, track_id: &TrackId) -> AppResult<TrackMetadata>;
}
