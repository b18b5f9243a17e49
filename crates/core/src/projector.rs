//! Home tab projection.
//!
//! [`project`] turns a poll and the viewing user into an ordered list of
//! [`DisplayItem`]s. It depends only on the poll phase and the user's
//! submitted/voted/admin flags; rendering to Block Kit happens in the API
//! layer.

use crate::models::{AppUser, PollStatus, SongInfo, TrackId, WeeklyPoll};

/// Action identifiers carried by interactive elements.
pub mod actions {
    /// Opens the submission modal.
    pub const SUBMIT_SONG: &str = "submit_song";
    /// Withdraws the user's active submission.
    pub const UNSUBMIT_SONG: &str = "unsubmit_song";
    /// Votes for the song in the button's value.
    pub const VOTE_SONG: &str = "vote_song";
    /// Removes the user's vote.
    pub const UNVOTE_SONG: &str = "unvote_song";
    /// Moves the poll to its next phase (admins only).
    pub const ADVANCE_POLL: &str = "advance_poll";
    /// Callback id of the submission modal.
    pub const SUBMIT_SONG_MODAL: &str = "submit_song_modal";
    /// Block id of the link input in the submission modal.
    pub const SONG_LINK_BLOCK: &str = "song_link";
    /// Action id of the link input in the submission modal.
    pub const SONG_LINK_INPUT: &str = "song_link_input";
}

/// Visual weight of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Danger,
}

/// A clickable button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub action_id: &'static str,
    pub label: String,
    pub value: Option<String>,
    pub style: Option<ButtonStyle>,
}

impl ActionButton {
    fn new(action_id: &'static str, label: impl Into<String>) -> Self {
        Self {
            action_id,
            label: label.into(),
            value: None,
            style: None,
        }
    }

    const fn styled(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// A song in the submission or voting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongCard {
    pub song: SongInfo,
    /// Shown once voting has started.
    pub votes: Option<u32>,
    /// Whether to offer a vote button for this song.
    pub can_vote: bool,
    /// The viewer voted for this song.
    pub your_pick: bool,
}

/// One ranked line of the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub rank: usize,
    pub song: SongInfo,
    pub votes: u32,
}

/// One element of the home tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayItem {
    Header(String),
    Context(String),
    Divider,
    Text(String),
    Song(SongCard),
    Actions(Vec<ActionButton>),
    Result(ResultRow),
}

const fn phase_label(status: PollStatus) -> &'static str {
    match status {
        PollStatus::SubmissionsOpen => "Submissions open",
        PollStatus::VotingOpen => "Voting open",
        PollStatus::Closed => "Closed",
    }
}

const fn advance_label(status: PollStatus) -> &'static str {
    match status {
        PollStatus::SubmissionsOpen => "Open voting",
        PollStatus::VotingOpen => "Close poll",
        PollStatus::Closed => "Start new round",
    }
}

/// Songs in submission order.
fn songs_in_order(poll: &WeeklyPoll) -> Vec<&SongInfo> {
    let mut songs: Vec<&SongInfo> = poll.songs.values().collect();
    songs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
    songs
}

/// Build the home tab for `user` looking at `poll`.
#[must_use]
pub fn project(poll: &WeeklyPoll, user: &AppUser) -> Vec<DisplayItem> {
    let mut items = vec![
        DisplayItem::Header("Weekly music poll".to_string()),
        DisplayItem::Context(format!(
            "Week {} · Category: {} · {}",
            poll.poll_id,
            poll.category,
            phase_label(poll.status)
        )),
        DisplayItem::Divider,
    ];

    match poll.status {
        PollStatus::SubmissionsOpen => project_submissions(poll, user, &mut items),
        PollStatus::VotingOpen => project_voting(poll, user, &mut items),
        PollStatus::Closed => project_results(poll, &mut items),
    }

    if user.is_admin {
        items.push(DisplayItem::Divider);
        items.push(DisplayItem::Context("Admin".to_string()));
        items.push(DisplayItem::Actions(vec![
            ActionButton::new(actions::ADVANCE_POLL, advance_label(poll.status))
                .styled(ButtonStyle::Primary),
        ]));
    }

    items
}

fn project_submissions(poll: &WeeklyPoll, user: &AppUser, items: &mut Vec<DisplayItem>) {
    let active = user
        .active_submission(&poll.poll_id)
        .and_then(|id| poll.songs.get(id));

    match active {
        Some(song) => {
            items.push(DisplayItem::Text(format!(
                "You submitted *{}* by {}. Withdraw it to pick a different track.",
                song.title, song.artist
            )));
            items.push(DisplayItem::Actions(vec![
                ActionButton::new(actions::UNSUBMIT_SONG, "Withdraw submission")
                    .styled(ButtonStyle::Danger),
            ]));
        }
        None if user.has_submitted(&poll.poll_id) => {
            items.push(DisplayItem::Text("You already submitted a track.".to_string()));
            items.push(DisplayItem::Actions(vec![
                ActionButton::new(actions::UNSUBMIT_SONG, "Withdraw submission")
                    .styled(ButtonStyle::Danger),
            ]));
        }
        None => {
            items.push(DisplayItem::Text(
                "Share a Spotify track for this week's poll.".to_string(),
            ));
            items.push(DisplayItem::Actions(vec![
                ActionButton::new(actions::SUBMIT_SONG, "Submit a song").styled(ButtonStyle::Primary),
            ]));
        }
    }

    items.push(DisplayItem::Divider);
    items.push(DisplayItem::Text(format!(
        "*Submissions so far* ({})",
        poll.songs.len()
    )));
    if poll.songs.is_empty() {
        items.push(DisplayItem::Text("No songs yet. Be the first!".to_string()));
    }
    for song in songs_in_order(poll) {
        items.push(DisplayItem::Song(SongCard {
            song: song.clone(),
            votes: None,
            can_vote: false,
            your_pick: false,
        }));
    }
}

fn project_voting(poll: &WeeklyPoll, user: &AppUser, items: &mut Vec<DisplayItem>) {
    let pick: Option<&TrackId> = poll.vote_of(&user.id).map(|v| &v.voted_for);
    let voted = pick.is_some() || user.has_voted(&poll.poll_id);

    match pick.and_then(|id| poll.songs.get(id)) {
        Some(song) => {
            items.push(DisplayItem::Text(format!("You voted for *{}*.", song.title)));
            items.push(DisplayItem::Actions(vec![ActionButton::new(
                actions::UNVOTE_SONG,
                "Remove my vote",
            )]));
        }
        None if voted => {
            items.push(DisplayItem::Text("You already voted.".to_string()));
            items.push(DisplayItem::Actions(vec![ActionButton::new(
                actions::UNVOTE_SONG,
                "Remove my vote",
            )]));
        }
        None => items.push(DisplayItem::Text(
            "Voting is open. Pick your favourite track.".to_string(),
        )),
    }

    items.push(DisplayItem::Divider);
    if poll.songs.is_empty() {
        items.push(DisplayItem::Text(
            "No songs were submitted this week.".to_string(),
        ));
    }
    for song in songs_in_order(poll) {
        items.push(DisplayItem::Song(SongCard {
            song: song.clone(),
            votes: Some(poll.votes_for(&song.id)),
            can_vote: !voted,
            your_pick: pick == Some(&song.id),
        }));
    }
}

fn project_results(poll: &WeeklyPoll, items: &mut Vec<DisplayItem>) {
    let results = poll
        .results
        .clone()
        .unwrap_or_else(|| poll.tally(poll.created_at));

    if results.top_songs.is_empty() {
        items.push(DisplayItem::Text(
            "The poll is closed. No votes were cast this week.".to_string(),
        ));
        return;
    }

    items.push(DisplayItem::Text(
        "The poll is closed. Here are this week's favourites.".to_string(),
    ));
    for (index, id) in results.top_songs.iter().enumerate() {
        if let Some(song) = poll.songs.get(id) {
            items.push(DisplayItem::Result(ResultRow {
                rank: index + 1,
                song: song.clone(),
                votes: results.votes_count.get(id).copied().unwrap_or_default(),
            }));
        }
    }
}
