//! Weekly poll service.
//!
//! Every action resolves the team's current poll, checks it against the
//! acting user, and writes the poll back with a revision check. Rejections
//! leave both the poll and the user untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use tunepoll_common::config::PollConfig;
use tunepoll_common::{AppError, AppResult, Rejection};

use super::user::UserService;
use crate::clients::MusicCatalog;
use crate::models::{AppUser, PollStatus, SongInfo, TrackId, WeeklyPoll, current_period_id};
use crate::projector::{DisplayItem, project};
use crate::store::{Aggregate, AggregateStore, Collection};

impl Aggregate for WeeklyPoll {
    const COLLECTION: Collection = Collection::WeeklyPolls;

    fn upgrade(&mut self) {
        self.upgrade_schema();
    }
}

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a user's home tab shows.
#[derive(Debug, Clone)]
pub struct Home {
    pub poll: WeeklyPoll,
    pub user: AppUser,
    pub items: Vec<DisplayItem>,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    polls: AggregateStore<WeeklyPoll>,
    users: UserService,
    catalog: Arc<dyn MusicCatalog>,
    category: String,
    tz: Tz,
    clock: Clock,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(
        polls: AggregateStore<WeeklyPoll>,
        users: UserService,
        catalog: Arc<dyn MusicCatalog>,
        config: &PollConfig,
        tz: Tz,
    ) -> Self {
        Self {
            polls,
            users,
            catalog,
            category: config.default_category.clone(),
            tz,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock (tests drive period changes with this).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    #[must_use]
    pub const fn users(&self) -> &UserService {
        &self.users
    }

    /// Identifier of the poll for the current period.
    #[must_use]
    pub fn current_poll_id(&self) -> String {
        current_period_id(self.now(), self.tz)
    }

    /// The team's poll for the current period, created if this is the first
    /// access in the period.
    pub async fn current_poll(&self, team_id: &str) -> AppResult<WeeklyPoll> {
        let now = self.now();
        let poll_id = current_period_id(now, self.tz);
        self.polls
            .get_or_create(team_id, &poll_id, || {
                debug!(team_id = %team_id, poll_id = %poll_id, "Starting new poll");
                WeeklyPoll::new(poll_id.clone(), self.category.clone(), now)
            })
            .await
    }

    /// Poll and user state for `user_id`'s home tab.
    pub async fn home(&self, team_id: &str, user_id: &str) -> AppResult<Home> {
        let user = self.users.get_or_create(team_id, user_id).await?;
        let poll = self.current_poll(team_id).await?;
        let items = project(&poll, &user);
        Ok(Home { poll, user, items })
    }

    /// Submit a track link.
    ///
    /// The user's claim is written first, then the song. If the song cannot
    /// be added the claim is released again.
    pub async fn submit(&self, team_id: &str, user_id: &str, raw_link: &str) -> AppResult<WeeklyPoll> {
        let track = TrackId::parse_link(raw_link)?;
        let poll = self.current_poll(team_id).await?;
        poll.ensure_submissions_open()?;

        let user = self.users.get_or_create(team_id, user_id).await?;
        if user.has_submitted(&poll.poll_id) {
            return Err(Rejection::AlreadySubmitted.into());
        }

        let metadata = self.catalog.track(team_id, &track).await?;
        let song = SongInfo {
            link: track.link(),
            id: track.clone(),
            title: metadata.title,
            artist: metadata.artist,
            album: metadata.album,
            image_url: metadata.image_url,
            submitted_by: user_id.to_string(),
            submitted_at: self.now(),
        };

        let poll_id = poll.poll_id;
        self.users
            .update(team_id, user_id, |u| {
                u.claim_submission(&poll_id, track.clone())
                    .map_err(AppError::from)
            })
            .await?;

        let inserted = self
            .polls
            .update(team_id, &poll_id, |p| {
                p.insert_song(song.clone()).map_err(AppError::from)
            })
            .await;

        match inserted {
            Ok((poll, ())) => {
                info!(
                    team_id = %team_id,
                    user_id = %user_id,
                    poll_id = %poll_id,
                    track_id = %track,
                    "Song submitted"
                );
                Ok(poll)
            }
            Err(e) => {
                let rollback = self
                    .users
                    .update(team_id, user_id, |u| {
                        u.revert_submission(&poll_id, &track);
                        Ok(())
                    })
                    .await;
                if let Err(rollback_err) = rollback {
                    warn!(
                        team_id = %team_id,
                        user_id = %user_id,
                        poll_id = %poll_id,
                        error = %rollback_err,
                        "Failed to release submission claim"
                    );
                }
                Err(e)
            }
        }
    }

    /// Withdraw the user's submission. The song stays in the poll.
    pub async fn unsubmit(&self, team_id: &str, user_id: &str) -> AppResult<WeeklyPoll> {
        let poll = self.current_poll(team_id).await?;
        poll.ensure_submissions_open()?;

        self.users.get_or_create(team_id, user_id).await?;
        self.users
            .update(team_id, user_id, |u| {
                u.release_submission(&poll.poll_id).map_err(AppError::from)
            })
            .await?;

        info!(team_id = %team_id, user_id = %user_id, poll_id = %poll.poll_id, "Submission withdrawn");
        Ok(poll)
    }

    /// Vote for a song in the current poll.
    pub async fn vote(&self, team_id: &str, user_id: &str, track_id: &str) -> AppResult<WeeklyPoll> {
        let track = TrackId::from(track_id);
        let poll_id = self.current_poll(team_id).await?.poll_id;
        self.users.get_or_create(team_id, user_id).await?;

        let now = self.now();
        let cast = self
            .polls
            .update(team_id, &poll_id, |p| {
                p.cast_vote(user_id, &track, now).map_err(AppError::from)
            })
            .await;

        match cast {
            Ok((poll, ())) => {
                self.sync_voted_flag(team_id, user_id, &poll_id, true).await?;
                info!(
                    team_id = %team_id,
                    user_id = %user_id,
                    poll_id = %poll_id,
                    track_id = %track,
                    "Vote cast"
                );
                Ok(poll)
            }
            Err(e) => {
                if e.rejection() == Some(Rejection::AlreadyVoted) {
                    self.sync_voted_flag(team_id, user_id, &poll_id, true).await?;
                }
                Err(e)
            }
        }
    }

    /// Remove the user's vote.
    pub async fn unvote(&self, team_id: &str, user_id: &str) -> AppResult<WeeklyPoll> {
        let poll_id = self.current_poll(team_id).await?.poll_id;
        self.users.get_or_create(team_id, user_id).await?;

        let retracted = self
            .polls
            .update(team_id, &poll_id, |p| p.retract_vote(user_id).map_err(AppError::from))
            .await;

        match retracted {
            Ok((poll, vote)) => {
                self.sync_voted_flag(team_id, user_id, &poll_id, false).await?;
                info!(
                    team_id = %team_id,
                    user_id = %user_id,
                    poll_id = %poll_id,
                    track_id = %vote.voted_for,
                    "Vote removed"
                );
                Ok(poll)
            }
            Err(e) => {
                if e.rejection() == Some(Rejection::NotVoted) {
                    self.sync_voted_flag(team_id, user_id, &poll_id, false).await?;
                }
                Err(e)
            }
        }
    }

    /// Move the current poll to its next phase. Admins only.
    pub async fn advance(&self, team_id: &str, user_id: &str) -> AppResult<WeeklyPoll> {
        let user = self.users.get_or_create(team_id, user_id).await?;
        let poll_id = self.current_poll(team_id).await?.poll_id;

        let now = self.now();
        let (poll, status) = self
            .polls
            .update(team_id, &poll_id, |p| p.advance(user.is_admin, now).map_err(AppError::from))
            .await?;

        info!(
            team_id = %team_id,
            user_id = %user_id,
            poll_id = %poll_id,
            status = status.as_str(),
            "Poll advanced"
        );
        if status == PollStatus::Closed
            && let Some(results) = &poll.results
        {
            debug!(poll_id = %poll_id, top_songs = ?results.top_songs, "Results computed");
        }
        Ok(poll)
    }

    /// The poll's vote map is authoritative; the user's flag follows it.
    async fn sync_voted_flag(&self, team_id: &str, user_id: &str, poll_id: &str, voted: bool) -> AppResult<()> {
        self.users
            .update(team_id, user_id, |u| {
                u.set_voted(poll_id, voted);
                Ok(())
            })
            .await?;
        Ok(())
    }
}
