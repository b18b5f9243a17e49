//! Block Kit rendering.
//!
//! The home tab is built from the projector's display items; the functions
//! here only translate them into Slack's JSON layout.

use serde_json::{Value, json};
use tunepoll_core::models::SongInfo;
use tunepoll_core::projector::{
    ActionButton, ButtonStyle, DisplayItem, ResultRow, SongCard, actions,
};

/// Action id of the link button that starts the Spotify connect flow.
pub const CONNECT_SPOTIFY: &str = "connect_spotify";

const APP_TITLE: &str = "Weekly music poll";

fn plain(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text, "emoji": true })
}

fn mrkdwn(text: &str) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": mrkdwn(text) })
}

fn button(b: &ActionButton) -> Value {
    let mut value = json!({
        "type": "button",
        "action_id": b.action_id,
        "text": plain(&b.label),
    });
    if let Some(v) = &b.value {
        value["value"] = json!(v);
    }
    match b.style {
        Some(ButtonStyle::Primary) => value["style"] = json!("primary"),
        Some(ButtonStyle::Danger) => value["style"] = json!("danger"),
        None => {}
    }
    value
}

fn song_title(song: &SongInfo) -> String {
    format!("*<{}|{}>*", song.link, song.title)
}

fn cover(song: &SongInfo) -> Option<Value> {
    song.image_url.as_ref().map(|url| {
        json!({ "type": "image", "image_url": url, "alt_text": song.album })
    })
}

fn song_card(card: &SongCard) -> Value {
    let song = &card.song;
    let mut lines = vec![
        song_title(song),
        format!("{} · {}", song.artist, song.album),
    ];
    let mut meta = format!("Submitted by <@{}>", song.submitted_by);
    if let Some(votes) = card.votes {
        meta.push_str(&format!(" · {votes} {}", if votes == 1 { "vote" } else { "votes" }));
    }
    if card.your_pick {
        meta.push_str(" · :white_check_mark: your pick");
    }
    lines.push(meta);

    let mut block = section(&lines.join("\n"));
    if card.can_vote {
        block["accessory"] = json!({
            "type": "button",
            "action_id": actions::VOTE_SONG,
            "text": plain("Vote"),
            "value": song.id.as_str(),
        });
    } else if let Some(image) = cover(song) {
        block["accessory"] = image;
    }
    block
}

fn result_row(row: &ResultRow) -> Value {
    let song = &row.song;
    let votes = if row.votes == 1 { "vote" } else { "votes" };
    let mut block = section(&format!(
        "*{}.* {} by {}\n{} {votes}",
        row.rank,
        song_title(song),
        song.artist,
        row.votes
    ));
    if let Some(image) = cover(song) {
        block["accessory"] = image;
    }
    block
}

/// Render one display item.
#[must_use]
pub fn block(item: &DisplayItem) -> Value {
    match item {
        DisplayItem::Header(text) => json!({ "type": "header", "text": plain(text) }),
        DisplayItem::Context(text) => json!({ "type": "context", "elements": [mrkdwn(text)] }),
        DisplayItem::Divider => json!({ "type": "divider" }),
        DisplayItem::Text(text) => section(text),
        DisplayItem::Song(card) => song_card(card),
        DisplayItem::Actions(buttons) => json!({
            "type": "actions",
            "elements": buttons.iter().map(button).collect::<Vec<_>>(),
        }),
        DisplayItem::Result(row) => result_row(row),
    }
}

/// The home tab view.
///
/// `spotify_connect_url` is set for admins of teams that have not connected
/// Spotify yet.
#[must_use]
pub fn home(items: &[DisplayItem], spotify_connect_url: Option<&str>) -> Value {
    let mut blocks: Vec<Value> = items.iter().map(block).collect();

    if let Some(url) = spotify_connect_url {
        blocks.push(json!({ "type": "divider" }));
        let mut prompt = section("Connect a Spotify account so submitted links can be looked up.");
        prompt["accessory"] = json!({
            "type": "button",
            "action_id": CONNECT_SPOTIFY,
            "text": plain("Connect Spotify"),
            "url": url,
        });
        blocks.push(prompt);
    }

    json!({ "type": "home", "blocks": blocks })
}

/// The modal asking for a track link.
#[must_use]
pub fn submit_modal() -> Value {
    json!({
        "type": "modal",
        "callback_id": actions::SUBMIT_SONG_MODAL,
        "title": plain("Submit a song"),
        "submit": plain("Submit"),
        "close": plain("Cancel"),
        "blocks": [{
            "type": "input",
            "block_id": actions::SONG_LINK_BLOCK,
            "label": plain("Spotify track link"),
            "element": {
                "type": "plain_text_input",
                "action_id": actions::SONG_LINK_INPUT,
                "placeholder": plain("https://open.spotify.com/track/..."),
            },
        }],
    })
}

/// A modal that only shows `message`.
#[must_use]
pub fn info_modal(message: &str) -> Value {
    json!({
        "type": "modal",
        "title": plain(APP_TITLE),
        "close": plain("OK"),
        "blocks": [section(message)],
    })
}
