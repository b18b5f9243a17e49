//! HTTP endpoints.

mod events;
mod health;
mod interactions;
mod slack_oauth;
mod spotify_oauth;

use axum::{Router, middleware};
use tracing::warn;
use tunepoll_common::{AppError, AppResult};

use crate::middleware::{AppState, verify_slack_request};
use crate::views;

/// Create the app router.
///
/// Events and interactions must carry a valid Slack signature; the OAuth
/// redirects and health check are public.
pub fn router(state: AppState) -> Router {
    let signed = Router::new()
        .merge(events::router())
        .merge(interactions::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_slack_request,
        ));

    Router::new()
        .merge(signed)
        .merge(slack_oauth::router())
        .merge(spotify_oauth::router())
        .merge(health::router())
        .with_state(state)
}

/// Link that starts the Spotify connect flow for `user_id`.
fn spotify_connect_url(state: &AppState, team_id: &str, user_id: &str) -> AppResult<String> {
    let base = format!(
        "{}/spotify/authorize",
        state.config.server.url.trim_end_matches('/')
    );
    let mut url = url::Url::parse(&base).map_err(|e| AppError::Config(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("team_id", team_id)
        .append_pair("user_id", user_id);
    Ok(url.into())
}

/// Render and publish `user_id`'s home tab.
pub(crate) async fn publish_home(state: &AppState, team_id: &str, user_id: &str) -> AppResult<()> {
    let home = state.poll_service.home(team_id, user_id).await?;

    let connect_url = if home.user.is_admin
        && state.spotify_installations.get(team_id).await?.is_none()
    {
        Some(spotify_connect_url(state, team_id, user_id)?)
    } else {
        None
    };

    let view = views::home(&home.items, connect_url.as_deref());
    state.chat.publish_view(team_id, user_id, view).await
}

/// Publish the home tab, logging instead of failing.
pub(crate) async fn refresh_home(state: &AppState, team_id: &str, user_id: &str) {
    if let Err(e) = publish_home(state, team_id, user_id).await {
        warn!(team_id = %team_id, user_id = %user_id, error = %e, "Failed to publish home tab");
    }
}
