//! App users and their poll participation.

use serde::{Deserialize, Serialize};
use tunepoll_common::Rejection;

use super::track::TrackId;

/// Current user document layout.
pub const USER_SCHEMA_VERSION: u32 = 1;

/// What a user has done in one poll.
///
/// A record whose `poll_id` is not the poll being looked at counts as empty,
/// so nothing carries over into the next period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub poll_id: String,
    pub submitted: bool,
    /// Tracks submitted in this poll; the last one is active while `submitted`.
    pub submissions: Vec<TrackId>,
    pub voted: bool,
}

impl Participation {
    fn for_poll(poll_id: &str) -> Self {
        Self {
            poll_id: poll_id.to_string(),
            ..Self::default()
        }
    }
}

/// A Slack user known to the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: String,
    pub team_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub participation: Participation,
    #[serde(default)]
    pub schema_version: u32,
}

impl AppUser {
    /// Display name, falling back to the handle.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.real_name.is_empty() {
            &self.name
        } else {
            &self.real_name
        }
    }

    /// Participation in `poll_id`, empty if the stored record is for another poll.
    #[must_use]
    pub fn participation_in(&self, poll_id: &str) -> Participation {
        if self.participation.poll_id == poll_id {
            self.participation.clone()
        } else {
            Participation::for_poll(poll_id)
        }
    }

    fn participation_mut(&mut self, poll_id: &str) -> &mut Participation {
        if self.participation.poll_id != poll_id {
            self.participation = Participation::for_poll(poll_id);
        }
        &mut self.participation
    }

    #[must_use]
    pub fn has_submitted(&self, poll_id: &str) -> bool {
        self.participation.poll_id == poll_id && self.participation.submitted
    }

    #[must_use]
    pub fn has_voted(&self, poll_id: &str) -> bool {
        self.participation.poll_id == poll_id && self.participation.voted
    }

    /// The track this user currently has submitted in `poll_id`.
    #[must_use]
    pub fn active_submission(&self, poll_id: &str) -> Option<&TrackId> {
        if self.has_submitted(poll_id) {
            self.participation.submissions.last()
        } else {
            None
        }
    }

    /// Claim the user's one submission slot for `poll_id`.
    pub fn claim_submission(&mut self, poll_id: &str, track: TrackId) -> Result<(), Rejection> {
        let participation = self.participation_mut(poll_id);
        if participation.submitted {
            return Err(Rejection::AlreadySubmitted);
        }
        participation.submitted = true;
        participation.submissions.push(track);
        Ok(())
    }

    /// Undo a [`claim_submission`](Self::claim_submission) whose poll write failed.
    pub fn revert_submission(&mut self, poll_id: &str, track: &TrackId) {
        if self.participation.poll_id != poll_id {
            return;
        }
        let participation = &mut self.participation;
        if participation.submissions.last() == Some(track) {
            participation.submissions.pop();
        }
        participation.submitted = false;
    }

    /// Free the submission slot. The song itself stays in the poll.
    pub fn release_submission(&mut self, poll_id: &str) -> Result<(), Rejection> {
        if !self.has_submitted(poll_id) {
            return Err(Rejection::NotSubmitted);
        }
        self.participation.submitted = false;
        Ok(())
    }

    pub fn set_voted(&mut self, poll_id: &str, voted: bool) {
        self.participation_mut(poll_id).voted = voted;
    }

    /// Bring a document written by an older version up to date.
    pub fn upgrade_schema(&mut self) {
        if self.schema_version < USER_SCHEMA_VERSION {
            // Older records tracked participation without a poll id.
            self.participation = Participation::default();
            self.schema_version = USER_SCHEMA_VERSION;
        }
    }
}
