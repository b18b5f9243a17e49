//! Weekly poll aggregate.
//!
//! A [`WeeklyPoll`] moves through a fixed cycle of phases driven by admins:
//!
//! ```text
//! submissions_open -> voting_open -> closed -> submissions_open -> ...
//! ```
//!
//! Songs are keyed by track id, votes by voter. Every mutating method checks
//! the phase first and leaves the poll untouched when it returns a
//! [`Rejection`].

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tunepoll_common::Rejection;

use super::track::TrackId;

/// Current poll document layout.
pub const POLL_SCHEMA_VERSION: u32 = 1;

/// Number of songs listed in [`PollResults::top_songs`].
pub const TOP_SONGS: usize = 3;

/// Poll phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    #[default]
    SubmissionsOpen,
    VotingOpen,
    Closed,
}

impl PollStatus {
    /// The phase an admin advances to.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::SubmissionsOpen => Self::VotingOpen,
            Self::VotingOpen => Self::Closed,
            Self::Closed => Self::SubmissionsOpen,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmissionsOpen => "submissions_open",
            Self::VotingOpen => "voting_open",
            Self::Closed => "closed",
        }
    }
}

/// A submitted song. Never modified once in the poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    pub id: TrackId,
    pub link: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub submitted_by: String,
    /// Missing on songs stored before it was recorded; those sort first.
    #[serde(default)]
    pub submitted_at: DateTime<Utc>,
}

/// A single user's vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub voted_for: TrackId,
    pub voted_by: String,
    pub voted_at: DateTime<Utc>,
}

/// Ranked outcome of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    /// Best first, at most [`TOP_SONGS`] entries.
    pub top_songs: Vec<TrackId>,
    /// Vote count of every song that received at least one vote.
    pub votes_count: BTreeMap<TrackId, u32>,
    pub created_at: DateTime<Utc>,
}

/// One team's poll for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPoll {
    pub poll_id: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PollStatus,
    #[serde(default)]
    pub songs: BTreeMap<TrackId, SongInfo>,
    /// Keyed by voter user id.
    #[serde(default)]
    pub votes: BTreeMap<String, VoteInfo>,
    #[serde(default)]
    pub results: Option<PollResults>,
    #[serde(default)]
    pub schema_version: u32,
}

impl WeeklyPoll {
    /// A fresh poll accepting submissions.
    #[must_use]
    pub fn new(poll_id: impl Into<String>, category: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            poll_id: poll_id.into(),
            category: category.into(),
            created_at: now,
            status: PollStatus::SubmissionsOpen,
            songs: BTreeMap::new(),
            votes: BTreeMap::new(),
            results: None,
            schema_version: POLL_SCHEMA_VERSION,
        }
    }

    /// Bring a document written by an older version up to date.
    ///
    /// Version 0 documents carried a `vote_counts` map; it is not part of
    /// this struct and is dropped on decode. Counts come from `votes` alone.
    pub fn upgrade_schema(&mut self) {
        if self.schema_version < POLL_SCHEMA_VERSION {
            self.schema_version = POLL_SCHEMA_VERSION;
        }
    }

    /// Move to the next phase.
    ///
    /// Entering `closed` computes and stores the results; leaving it clears
    /// them. Songs and votes are kept.
    pub fn advance(&mut self, actor_is_admin: bool, now: DateTime<Utc>) -> Result<PollStatus, Rejection> {
        if !actor_is_admin {
            return Err(Rejection::PermissionDenied);
        }

        let next = self.status.next();
        self.results = match next {
            PollStatus::Closed => Some(self.tally(now)),
            PollStatus::SubmissionsOpen | PollStatus::VotingOpen => None,
        };
        self.status = next;
        Ok(next)
    }

    /// Fails with `WrongPhase` unless submissions are open.
    pub const fn ensure_submissions_open(&self) -> Result<(), Rejection> {
        match self.status {
            PollStatus::SubmissionsOpen => Ok(()),
            _ => Err(Rejection::WrongPhase),
        }
    }

    /// Fails with `WrongPhase` unless voting is open.
    pub const fn ensure_voting_open(&self) -> Result<(), Rejection> {
        match self.status {
            PollStatus::VotingOpen => Ok(()),
            _ => Err(Rejection::WrongPhase),
        }
    }

    /// Add a song. A second submission of the same track replaces the first.
    pub fn insert_song(&mut self, song: SongInfo) -> Result<(), Rejection> {
        self.ensure_submissions_open()?;
        self.songs.insert(song.id.clone(), song);
        Ok(())
    }

    /// Record `voter`'s vote for `track`.
    pub fn cast_vote(&mut self, voter: &str, track: &TrackId, now: DateTime<Utc>) -> Result<(), Rejection> {
        self.ensure_voting_open()?;
        if !self.songs.contains_key(track) {
            return Err(Rejection::UnknownSong);
        }
        if self.votes.contains_key(voter) {
            return Err(Rejection::AlreadyVoted);
        }

        self.votes.insert(
            voter.to_string(),
            VoteInfo {
                voted_for: track.clone(),
                voted_by: voter.to_string(),
                voted_at: now,
            },
        );
        self.results = None;
        Ok(())
    }

    /// Remove `voter`'s vote, returning it.
    pub fn retract_vote(&mut self, voter: &str) -> Result<VoteInfo, Rejection> {
        self.ensure_voting_open()?;
        let vote = self.votes.remove(voter).ok_or(Rejection::NotVoted)?;
        self.results = None;
        Ok(vote)
    }

    #[must_use]
    pub fn vote_of(&self, voter: &str) -> Option<&VoteInfo> {
        self.votes.get(voter)
    }

    /// Number of votes `track` currently has.
    #[must_use]
    pub fn votes_for(&self, track: &TrackId) -> u32 {
        self.votes.values().filter(|v| &v.voted_for == track).count() as u32
    }

    /// Rank songs by votes.
    ///
    /// Ties go to the song submitted first, then to the lower track id.
    #[must_use]
    pub fn tally(&self, now: DateTime<Utc>) -> PollResults {
        let mut votes_count: BTreeMap<TrackId, u32> = BTreeMap::new();
        for vote in self.votes.values() {
            *votes_count.entry(vote.voted_for.clone()).or_default() += 1;
        }

        let mut ranked: Vec<(&TrackId, u32)> = votes_count.iter().map(|(id, n)| (id, *n)).collect();
        ranked.sort_by_key(|(id, count)| {
            let submitted_at = self.songs.get(*id).map(|s| s.submitted_at);
            (Reverse(*count), submitted_at.unwrap_or(DateTime::<Utc>::MAX_UTC), *id)
        });

        PollResults {
            top_songs: ranked
                .into_iter()
                .take(TOP_SONGS)
                .map(|(id, _)| id.clone())
                .collect(),
            votes_count,
            created_at: now,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, minute, 0).unwrap()
    }

    fn song(id: &str, by: &str, minute: u32) -> SongInfo {
        SongInfo {
            id: TrackId::from(id),
            link: format!("https://open.spotify.com/track/{id}"),
            title: format!("Title {id}"),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            image_url: None,
            submitted_by: by.to_string(),
            submitted_at: t(minute),
        }
    }

    fn voting_poll(songs: &[SongInfo]) -> WeeklyPoll {
        let mut poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        for s in songs {
            poll.insert_song(s.clone()).unwrap();
        }
        poll.advance(true, t(30)).unwrap();
        poll
    }

    #[test]
    fn test_new_poll() {
        let poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        assert_eq!(poll.status, PollStatus::SubmissionsOpen);
        assert!(poll.songs.is_empty());
        assert!(poll.votes.is_empty());
        assert!(poll.results.is_none());
        assert_eq!(poll.schema_version, POLL_SCHEMA_VERSION);
    }

    #[test]
    fn test_advance_cycles_through_phases() {
        let mut poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        assert_eq!(poll.advance(true, t(1)).unwrap(), PollStatus::VotingOpen);
        assert_eq!(poll.advance(true, t(2)).unwrap(), PollStatus::Closed);
        assert!(poll.results.is_some());
        assert_eq!(poll.advance(true, t(3)).unwrap(), PollStatus::SubmissionsOpen);
        assert!(poll.results.is_none());
    }

    #[test]
    fn test_advance_requires_admin() {
        let mut poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        assert_eq!(poll.advance(false, t(1)), Err(Rejection::PermissionDenied));
        assert_eq!(poll.status, PollStatus::SubmissionsOpen);
    }

    #[test]
    fn test_wraparound_keeps_songs_and_votes() {
        let mut poll = voting_poll(&[song("A", "u1", 1)]);
        poll.cast_vote("u2", &TrackId::from("A"), t(31)).unwrap();
        poll.advance(true, t(40)).unwrap();
        poll.advance(true, t(41)).unwrap();

        assert_eq!(poll.status, PollStatus::SubmissionsOpen);
        assert_eq!(poll.songs.len(), 1);
        assert_eq!(poll.votes.len(), 1);
    }

    #[test]
    fn test_insert_song_outside_submissions() {
        let mut poll = voting_poll(&[]);
        assert_eq!(poll.insert_song(song("A", "u1", 1)), Err(Rejection::WrongPhase));
        assert!(poll.songs.is_empty());
    }

    #[test]
    fn test_same_track_from_two_users_last_write_wins() {
        let mut poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        poll.insert_song(song("A", "u1", 1)).unwrap();
        poll.insert_song(song("A", "u2", 2)).unwrap();

        assert_eq!(poll.songs.len(), 1);
        assert_eq!(poll.songs[&TrackId::from("A")].submitted_by, "u2");
    }

    #[test]
    fn test_cast_vote_rejections() {
        let mut poll = WeeklyPoll::new("2025-03-10", "general", t(0));
        poll.insert_song(song("A", "u1", 1)).unwrap();
        let a = TrackId::from("A");

        assert_eq!(poll.cast_vote("u1", &a, t(2)), Err(Rejection::WrongPhase));

        poll.advance(true, t(3)).unwrap();
        assert_eq!(
            poll.cast_vote("u1", &TrackId::from("B"), t(4)),
            Err(Rejection::UnknownSong)
        );

        poll.cast_vote("u1", &a, t(5)).unwrap();
        assert_eq!(poll.cast_vote("u1", &a, t(6)), Err(Rejection::AlreadyVoted));
        assert_eq!(poll.votes.len(), 1);
    }

    #[test]
    fn test_unvote_then_vote_replaces() {
        let mut poll = voting_poll(&[song("A", "u1", 1), song("B", "u2", 2)]);
        let a = TrackId::from("A");
        let b = TrackId::from("B");

        poll.cast_vote("u3", &a, t(31)).unwrap();
        let removed = poll.retract_vote("u3").unwrap();
        assert_eq!(removed.voted_for, a);
        poll.cast_vote("u3", &b, t(32)).unwrap();

        assert_eq!(poll.votes.len(), 1);
        assert_eq!(poll.vote_of("u3").unwrap().voted_for, b);
        assert_eq!(poll.votes_for(&a), 0);
    }

    #[test]
    fn test_retract_without_vote() {
        let mut poll = voting_poll(&[song("A", "u1", 1)]);
        assert_eq!(poll.retract_vote("u3"), Err(Rejection::NotVoted));
    }

    #[test]
    fn test_closed_poll_is_frozen() {
        let mut poll = voting_poll(&[song("A", "u1", 1), song("B", "u2", 2)]);
        let a = TrackId::from("A");
        poll.cast_vote("u1", &a, t(31)).unwrap();
        poll.cast_vote("u2", &TrackId::from("B"), t(32)).unwrap();
        assert_eq!(poll.advance(true, t(40)).unwrap(), PollStatus::Closed);
        let frozen = poll.clone();

        assert_eq!(poll.cast_vote("u3", &a, t(41)), Err(Rejection::WrongPhase));
        assert_eq!(poll.retract_vote("u1"), Err(Rejection::WrongPhase));
        assert_eq!(poll.insert_song(song("C", "u3", 42)), Err(Rejection::WrongPhase));

        assert_eq!(poll, frozen);
        assert_eq!(poll.results.as_ref().unwrap().votes_count[&a], 1);
    }

    #[test]
    fn test_tally_counts_and_ranks() {
        let mut poll = voting_poll(&[song("A", "u1", 1), song("B", "u2", 2)]);
        poll.cast_vote("u1", &TrackId::from("A"), t(31)).unwrap();
        poll.cast_vote("u2", &TrackId::from("A"), t(32)).unwrap();
        poll.cast_vote("u3", &TrackId::from("B"), t(33)).unwrap();

        let results = poll.tally(t(40));
        assert_eq!(results.top_songs, vec![TrackId::from("A"), TrackId::from("B")]);
        assert_eq!(results.votes_count[&TrackId::from("A")], 2);
        assert_eq!(results.votes_count[&TrackId::from("B")], 1);
        assert_eq!(results.votes_count.len(), 2);
    }

    #[test]
    fn test_tally_empty() {
        let poll = voting_poll(&[song("A", "u1", 1)]);
        let results = poll.tally(t(40));
        assert!(results.top_songs.is_empty());
        assert!(results.votes_count.is_empty());
    }

    #[test]
    fn test_tally_tie_break_and_top_three() {
        let mut poll = voting_poll(&[
            song("D", "u1", 1),
            song("C", "u2", 2),
            song("B", "u3", 3),
            song("A", "u4", 3),
        ]);
        for (voter, track) in [("v1", "A"), ("v2", "B"), ("v3", "C"), ("v4", "D")] {
            poll.cast_vote(voter, &TrackId::from(track), t(31)).unwrap();
        }

        let results = poll.tally(t(40));
        // All tied on one vote: earliest submission first, then track id.
        assert_eq!(
            results.top_songs,
            vec![TrackId::from("D"), TrackId::from("C"), TrackId::from("A")]
        );
        assert_eq!(results.votes_count.len(), 4);
    }

    #[test]
    fn test_close_caches_results() {
        let mut poll = voting_poll(&[song("A", "u1", 1)]);
        poll.cast_vote("u2", &TrackId::from("A"), t(31)).unwrap();
        poll.advance(true, t(40)).unwrap();

        let results = poll.results.clone().unwrap();
        assert_eq!(results.top_songs, vec![TrackId::from("A")]);
        assert_eq!(results.created_at, t(40));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(PollStatus::VotingOpen).unwrap();
        assert_eq!(json, "voting_open");
        assert_eq!(PollStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn test_legacy_document_decodes() {
        let legacy = serde_json::json!({
            "poll_id": "2024-03-10",
            "category": "general",
            "created_at": "2024-03-10T09:00:00Z",
            "status": "voting_open",
            "songs": {
                "A": {
                    "id": "A",
                    "link": "https://open.spotify.com/track/A",
                    "title": "t",
                    "artist": "a",
                    "album": "b",
                    "submitted_by": "u1"
                }
            },
            "votes": {},
            "results": null,
            "vote_counts": { "A": 5 }
        });

        let poll: WeeklyPoll = serde_json::from_value(legacy).unwrap();
        assert_eq!(poll.schema_version, 0);
        assert_eq!(poll.status, PollStatus::VotingOpen);
        assert_eq!(poll.songs.len(), 1);

        let mut poll = poll;
        poll.upgrade_schema();
        assert_eq!(poll.schema_version, POLL_SCHEMA_VERSION);

        let reencoded = serde_json::to_value(&poll).unwrap();
        assert!(reencoded.get("vote_counts").is_none());
    }
}
