//! Slack Events API endpoint.

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::refresh_home;
use crate::middleware::AppState;

/// Outer envelope of an Events API request.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        team_id: String,
        event: Event,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    tab: Option<String>,
}

async fn handle_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Response {
    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventEnvelope::EventCallback { team_id, event } => {
            match (event.kind.as_str(), event.user.as_deref()) {
                ("app_home_opened", Some(user_id))
                    if event.tab.as_deref().is_none_or(|tab| tab == "home") =>
                {
                    debug!(team_id = %team_id, user_id = %user_id, "Home tab opened");
                    refresh_home(&state, &team_id, user_id).await;
                }
                (kind, _) => debug!(team_id = %team_id, kind, "Ignoring event"),
            }
            ().into_response()
        }
        EventEnvelope::Other => ().into_response(),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/slack/events", post(handle_event))
}
