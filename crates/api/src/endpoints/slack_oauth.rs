//! Slack OAuth v2 install flow.

use axum::{
    Router,
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
};
use serde::Deserialize;
use tracing::info;
use tunepoll_common::{AppError, AppResult};

use crate::middleware::AppState;

#[derive(Debug, Deserialize)]
struct OAuthRedirect {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Send the installer to Slack's consent page.
async fn install(State(state): State<AppState>) -> AppResult<Redirect> {
    let url = state.slack.install_url(&state.config.slack_redirect_uri())?;
    Ok(Redirect::to(&url))
}

/// Finish the install and store the workspace's tokens.
async fn oauth_redirect(
    State(state): State<AppState>,
    Query(params): Query<OAuthRedirect>,
) -> AppResult<Html<&'static str>> {
    if let Some(error) = params.error {
        return Err(AppError::BadRequest(format!("Slack install was cancelled: {error}")));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing code".to_string()))?;

    let installation = state
        .slack
        .oauth_v2_access(&code, &state.config.slack_redirect_uri())
        .await?;
    state.installations.save(&installation).await?;

    info!(
        team_id = %installation.team_id,
        user_id = %installation.user_id,
        "Slack app installed"
    );
    Ok(Html(
        "<h1>tunepoll is installed</h1><p>Open the app's Home tab in Slack to get started.</p>",
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slack/install", get(install))
        .route("/slack/oauth_redirect", get(oauth_redirect))
}
