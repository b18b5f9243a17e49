//! API integration tests.
//!
//! These drive the full router with signed Slack requests against the
//! in-memory document store and a recording chat client.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;
use tunepoll_api::{AppState, router};
use tunepoll_common::config::{
    CacheConfig, Config, PollConfig, ServerConfig, SlackConfig, SpotifyConfig,
};
use tunepoll_common::{AppResult, MemoryCache, NoCache, slack_signature};
use tunepoll_core::clients::{
    ChatClient, MusicCatalog, SlackClient, SlackProfile, SlackUser, SpotifyClient, TrackMetadata,
};
use tunepoll_core::models::TrackId;
use tunepoll_core::store::{AggregateStore, DocumentStore, MemoryDocumentStore};
use tunepoll_core::{
    InstallationService, PollService, SpotifyInstallationService, UserService,
};

const SIGNING_SECRET: &str = "test-signing-secret";
const TEAM: &str = "T1";
const ADMIN: &str = "UADMIN";
const TRACK: &str = "4uLU6hMCjMI75M1A2tKUQC";

#[derive(Debug, Clone)]
enum ChatCall {
    Publish { user_id: String, view: Value },
    Modal { view: Value },
}

/// Records views instead of calling Slack.
#[derive(Default)]
struct RecordingChat {
    calls: Mutex<Vec<ChatCall>>,
}

impl RecordingChat {
    fn take(&self) -> Vec<ChatCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn users_info(&self, team_id: &str, user_id: &str) -> AppResult<SlackUser> {
        Ok(SlackUser {
            id: user_id.to_string(),
            team_id: team_id.to_string(),
            name: user_id.to_lowercase(),
            real_name: String::new(),
            is_admin: user_id == ADMIN,
            is_owner: false,
            is_bot: false,
            tz: None,
            profile: SlackProfile::default(),
        })
    }

    async fn publish_view(&self, _team_id: &str, user_id: &str, view: Value) -> AppResult<()> {
        self.calls.lock().unwrap().push(ChatCall::Publish {
            user_id: user_id.to_string(),
            view,
        });
        Ok(())
    }

    async fn open_modal(&self, _team_id: &str, _trigger_id: &str, view: Value) -> AppResult<()> {
        self.calls.lock().unwrap().push(ChatCall::Modal { view });
        Ok(())
    }

    async fn post_message(&self, _: &str, _: &str, _: &str) -> AppResult<()> {
        Ok(())
    }
}

struct FixedCatalog;

#[async_trait]
impl MusicCatalog for FixedCatalog {
    async fn track(&self, _team_id: &str, _track_id: &TrackId) -> AppResult<TrackMetadata> {
        Ok(TrackMetadata {
            title: "Never Gonna Give You Up".to_string(),
            artist: "Rick Astley".to_string(),
            album: "Whenever You Need Somebody".to_string(),
            image_url: None,
        })
    }
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            url: "https://tunes.example.com".to_string(),
        },
        database: None,
        redis: None,
        cache: CacheConfig::default(),
        slack: SlackConfig {
            client_id: "123.456".to_string(),
            client_secret: "slack-secret".to_string(),
            signing_secret: SIGNING_SECRET.to_string(),
            scopes: vec!["chat:write".to_string(), "users:read".to_string()],
            api_base: "https://slack.invalid/api".to_string(),
        },
        spotify: SpotifyConfig {
            client_id: "spotify-id".to_string(),
            client_secret: "spotify-secret".to_string(),
            redirect_uri: None,
            accounts_base: "https://accounts.spotify.com".to_string(),
            api_base: "https://api.spotify.invalid/v1".to_string(),
        },
        poll: PollConfig::default(),
    }
}

struct Harness {
    app: Router,
    state: AppState,
    chat: Arc<RecordingChat>,
}

fn harness() -> Harness {
    let config = test_config();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let chat = Arc::new(RecordingChat::default());

    let installations =
        InstallationService::new(AggregateStore::new(store.clone(), Arc::new(NoCache), 3));
    let spotify_installations =
        SpotifyInstallationService::new(AggregateStore::new(store.clone(), Arc::new(NoCache), 3));
    let users = UserService::new(
        AggregateStore::new(store.clone(), Arc::new(MemoryCache::default()), 8),
        chat.clone(),
    );
    let poll_service = PollService::new(
        AggregateStore::new(store, Arc::new(MemoryCache::default()), 8),
        users,
        Arc::new(FixedCatalog),
        &config.poll,
        config.poll.tz().unwrap(),
    );

    let state = AppState {
        slack: SlackClient::new(config.slack.clone(), installations.clone()),
        spotify: SpotifyClient::new(
            config.spotify.clone(),
            config.spotify_redirect_uri(),
            spotify_installations.clone(),
        ),
        config: Arc::new(config),
        poll_service,
        installations,
        spotify_installations,
        chat: chat.clone(),
    };

    Harness {
        app: router(state.clone()),
        state,
        chat,
    }
}

fn signed(uri: &str, content_type: &str, body: String) -> Request<Body> {
    let timestamp = Utc::now().timestamp().to_string();
    let signature = slack_signature(SIGNING_SECRET, &timestamp, body.as_bytes()).unwrap();
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Slack-Request-Timestamp", timestamp)
        .header("X-Slack-Signature", signature)
        .body(Body::from(body))
        .unwrap()
}

fn interaction(payload: &Value) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("payload", &payload.to_string())
        .finish();
    signed(
        "/slack/interactions",
        "application/x-www-form-urlencoded",
        body,
    )
}

fn block_action(user_id: &str, action_id: &str, value: Option<&str>) -> Value {
    let mut action = json!({ "action_id": action_id, "block_id": "b1", "type": "button" });
    if let Some(value) = value {
        action["value"] = json!(value);
    }
    json!({
        "type": "block_actions",
        "user": { "id": user_id, "team_id": TEAM },
        "team": { "id": TEAM },
        "trigger_id": "trigger-1",
        "actions": [action],
    })
}

fn submission(user_id: &str, link: &str) -> Value {
    json!({
        "type": "view_submission",
        "user": { "id": user_id, "team_id": TEAM },
        "team": { "id": TEAM },
        "view": {
            "callback_id": "submit_song_modal",
            "state": { "values": { "song_link": { "song_link_input": {
                "type": "plain_text_input",
                "value": link,
            } } } },
        },
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn block_texts(view: &Value) -> Vec<String> {
    view["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["text"]["text"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_healthz() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_unsigned_event_is_rejected() {
    let h = harness();
    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/slack/events")
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"type":"url_verification","challenge":"abc"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stale_signature_is_rejected() {
    let h = harness();
    let body = r#"{"type":"url_verification","challenge":"abc"}"#;
    let timestamp = (Utc::now().timestamp() - 600).to_string();
    let signature = slack_signature(SIGNING_SECRET, &timestamp, body.as_bytes()).unwrap();

    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/slack/events")
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Slack-Request-Timestamp", timestamp)
                .header("X-Slack-Signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_url_verification_echoes_challenge() {
    let h = harness();
    let body = json!({ "type": "url_verification", "token": "t", "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P" });
    let response = h
        .app
        .oneshot(signed("/slack/events", "application/json", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["challenge"],
        "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
    );
}

#[tokio::test]
async fn test_app_home_opened_publishes_home() {
    let h = harness();
    let body = json!({
        "type": "event_callback",
        "team_id": TEAM,
        "event": { "type": "app_home_opened", "user": "U1", "tab": "home" },
    });
    let response = h
        .app
        .oneshot(signed("/slack/events", "application/json", body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = h.chat.take();
    assert_eq!(calls.len(), 1);
    let ChatCall::Publish { user_id, view } = &calls[0] else {
        panic!("expected a published view, got {calls:?}");
    };
    assert_eq!(user_id, "U1");
    assert_eq!(view["type"], "home");
    assert_eq!(view["blocks"][0]["text"]["text"], "Weekly music poll");
}

#[tokio::test]
async fn test_admin_home_offers_spotify_connect() {
    let h = harness();
    let body = json!({
        "type": "event_callback",
        "team_id": TEAM,
        "event": { "type": "app_home_opened", "user": ADMIN, "tab": "home" },
    });
    h.app
        .clone()
        .oneshot(signed("/slack/events", "application/json", body.to_string()))
        .await
        .unwrap();

    let calls = h.chat.take();
    let ChatCall::Publish { view, .. } = &calls[0] else {
        panic!("expected a published view");
    };
    let connect = view["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["accessory"]["action_id"] == "connect_spotify")
        .expect("connect prompt");
    assert_eq!(
        connect["accessory"]["url"],
        "https://tunes.example.com/spotify/authorize?team_id=T1&user_id=UADMIN"
    );

    h.state
        .spotify_installations
        .save(TEAM, ADMIN, "access", "refresh", Utc::now().timestamp() + 3600)
        .await
        .unwrap();
    h.app
        .oneshot(signed("/slack/events", "application/json", body.to_string()))
        .await
        .unwrap();

    let calls = h.chat.take();
    let ChatCall::Publish { view, .. } = &calls[0] else {
        panic!("expected a published view");
    };
    assert!(
        view["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .all(|b| b["accessory"]["action_id"] != "connect_spotify")
    );
}

#[tokio::test]
async fn test_submit_button_opens_modal() {
    let h = harness();
    let response = h
        .app
        .oneshot(interaction(&block_action("U1", "submit_song", None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = h.chat.take();
    assert_eq!(calls.len(), 1);
    let ChatCall::Modal { view } = &calls[0] else {
        panic!("expected a modal, got {calls:?}");
    };
    assert_eq!(view["callback_id"], "submit_song_modal");
}

#[tokio::test]
async fn test_invalid_link_is_reported_inline() {
    let h = harness();
    let response = h
        .app
        .oneshot(interaction(&submission("U1", "https://example.com/not-a-track")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["response_action"], "errors");
    assert_eq!(
        body["errors"]["song_link"],
        "That doesn't look like a Spotify track link"
    );
    assert!(h.chat.take().is_empty());
}

#[tokio::test]
async fn test_valid_submission_adds_song() {
    let h = harness();
    let link = format!("https://open.spotify.com/track/{TRACK}?si=abc");
    let response = h
        .app
        .clone()
        .oneshot(interaction(&submission("U1", &link)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let poll = h.state.poll_service.current_poll(TEAM).await.unwrap();
    let song = poll.songs.get(&TrackId::from(TRACK)).unwrap();
    assert_eq!(song.submitted_by, "U1");
    assert_eq!(song.title, "Never Gonna Give You Up");

    let calls = h.chat.take();
    let ChatCall::Publish { view, .. } = calls.last().unwrap() else {
        panic!("expected the home tab to be republished");
    };
    assert!(
        block_texts(view)
            .iter()
            .any(|t| t.starts_with("You submitted *Never Gonna Give You Up*"))
    );

    let again = h
        .app
        .oneshot(interaction(&submission("U1", &link)))
        .await
        .unwrap();
    let body = json_body(again).await;
    assert_eq!(body["response_action"], "update");
    assert_eq!(
        block_texts(&body["view"]),
        vec!["You already submitted a song for this poll"]
    );
}

#[tokio::test]
async fn test_vote_before_voting_opens_shows_info_modal() {
    let h = harness();
    let response = h
        .app
        .oneshot(interaction(&block_action("U1", "vote_song", Some(TRACK))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = h.chat.take();
    let ChatCall::Modal { view } = &calls[0] else {
        panic!("expected an info modal, got {calls:?}");
    };
    assert_eq!(
        block_texts(view),
        vec!["The poll is not accepting that right now"]
    );
    assert!(matches!(calls.last(), Some(ChatCall::Publish { .. })));
}

#[tokio::test]
async fn test_full_round_through_buttons() {
    let h = harness();
    let link = format!("https://open.spotify.com/track/{TRACK}");
    h.app
        .clone()
        .oneshot(interaction(&submission("U1", &link)))
        .await
        .unwrap();

    h.app
        .clone()
        .oneshot(interaction(&block_action(ADMIN, "advance_poll", None)))
        .await
        .unwrap();
    h.app
        .clone()
        .oneshot(interaction(&block_action("U2", "vote_song", Some(TRACK))))
        .await
        .unwrap();
    h.app
        .clone()
        .oneshot(interaction(&block_action(ADMIN, "advance_poll", None)))
        .await
        .unwrap();

    let poll = h.state.poll_service.current_poll(TEAM).await.unwrap();
    let results = poll.results.unwrap();
    assert_eq!(results.top_songs, vec![TrackId::from(TRACK)]);
    assert_eq!(results.votes_count.get(&TrackId::from(TRACK)), Some(&1));
    assert!(
        h.chat
            .take()
            .iter()
            .all(|call| matches!(call, ChatCall::Publish { .. }))
    );
}

#[tokio::test]
async fn test_non_admin_cannot_advance() {
    let h = harness();
    h.app
        .oneshot(interaction(&block_action("U1", "advance_poll", None)))
        .await
        .unwrap();

    let calls = h.chat.take();
    let ChatCall::Modal { view } = &calls[0] else {
        panic!("expected an info modal, got {calls:?}");
    };
    assert_eq!(
        block_texts(view),
        vec!["Only workspace admins can change the poll phase"]
    );
}

#[tokio::test]
async fn test_spotify_authorize_redirects_with_state() {
    let h = harness();
    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/spotify/authorize?team_id=T1&user_id=UADMIN")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    assert_eq!(url.host_str(), Some("accounts.spotify.com"));
    assert_eq!(url.path(), "/authorize");

    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let identity = tunepoll_common::OAuthState::open(&state, "spotify-secret").unwrap();
    assert_eq!(identity.team_id, "T1");
    assert_eq!(identity.user_id, "UADMIN");
}

#[tokio::test]
async fn test_spotify_callback_rejects_forged_state() {
    let h = harness();
    let forged = tunepoll_common::OAuthState::new("T1", "UADMIN")
        .seal("not-the-secret")
        .unwrap();
    let uri = format!(
        "/spotify/callback?code=abc&state={}",
        url::form_urlencoded::byte_serialize(forged.as_bytes()).collect::<String>()
    );

    let response = h
        .app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slack_install_redirects_to_slack() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::builder().uri("/slack/install").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://slack.com/oauth/v2/authorize?client_id=123.456"));
    assert!(location.contains("redirect_uri=https%3A%2F%2Ftunes.example.com%2Fslack%2Foauth_redirect"));
}
