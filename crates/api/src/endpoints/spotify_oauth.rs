//! Spotify connect flow.
//!
//! The Slack identity of whoever starts the flow travels through Spotify's
//! redirect in a sealed `state` parameter.

use axum::{
    Router,
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
};
use serde::Deserialize;
use tracing::info;
use tunepoll_common::{AppError, AppResult, OAuthState};

use super::refresh_home;
use crate::middleware::AppState;

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    team_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn state_secret(state: &AppState) -> &str {
    &state.config.spotify.client_secret
}

async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> AppResult<Redirect> {
    let sealed = OAuthState::new(params.team_id, params.user_id).seal(state_secret(&state))?;
    let url = state.spotify.authorize_url(&sealed)?;
    Ok(Redirect::to(&url))
}

async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AppResult<Html<&'static str>> {
    if let Some(error) = params.error {
        return Err(AppError::BadRequest(format!("Spotify authorization failed: {error}")));
    }
    let (Some(code), Some(sealed)) = (params.code, params.state) else {
        return Err(AppError::BadRequest("Missing code or state".to_string()));
    };

    let identity = OAuthState::open(&sealed, state_secret(&state))?;
    state
        .spotify
        .connect(&identity.team_id, &identity.user_id, &code)
        .await?;

    info!(team_id = %identity.team_id, user_id = %identity.user_id, "Spotify connected");
    refresh_home(&state, &identity.team_id, &identity.user_id).await;

    Ok(Html(
        "<h1>Spotify connected</h1><p>You can close this window and return to Slack.</p>",
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/spotify/authorize", get(authorize))
        .route("/spotify/callback", get(callback))
}
