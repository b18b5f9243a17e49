//! Domain models.

#![allow(missing_docs)]

pub mod period;
pub mod poll;
pub mod track;
pub mod user;

pub use period::current_period_id;
pub use poll::{PollResults, PollStatus, SongInfo, VoteInfo, WeeklyPoll};
pub use track::TrackId;
pub use user::{AppUser, Participation};
