//! Spotify track links.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tunepoll_common::Rejection;

#[allow(clippy::expect_used)]
static TRACK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://open\.spotify\.com/track/([A-Za-z0-9]{22})(?:\?.*)?$")
        .expect("track link pattern")
});

/// A 22-character Spotify track identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Extract the track id from a share link such as
    /// `https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc`.
    ///
    /// Surrounding whitespace is ignored, as is the query string.
    pub fn parse_link(raw: &str) -> Result<Self, Rejection> {
        TRACK_LINK
            .captures(raw.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
            .ok_or(Rejection::InvalidLink)
    }

    /// Canonical share link for this track, without query parameters.
    #[must_use]
    pub fn link(&self) -> String {
        format!("https://open.spotify.com/track/{}", self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
